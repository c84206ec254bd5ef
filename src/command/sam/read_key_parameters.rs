//! Read Key Parameters
//!
//! Reads the parameter record of a system key addressed by KIF/KVC
//! into the SAM image.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table().with(
        0x6A83,
        "Key not found.",
        Some(ProtocolErrorKind::DataAccess),
    );
}

/// Read Key Parameters command
#[derive(Clone, Debug)]
pub struct ReadKeyParametersCommand {
    kif: u8,
    kvc: u8,
}

impl ReadKeyParametersCommand {
    /// Read the parameters of the key addressed by KIF/KVC
    pub fn new(kif: u8, kvc: u8) -> Self {
        Self { kif, kvc }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::ReadKeyParameters.instruction(),
            0x00,
            0xF0,
            Some(&[self.kif, self.kvc]),
            Some(0),
        )?
        .with_info("SAM Read Key Parameters"))
    }

    /// Validate the response and extract the raw key parameters
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::ReadKeyParameters.name(), response, None)?;
        ensure!(
            !response.data().is_empty(),
            ProtocolErrorKind::UnexpectedResponseLength,
            "empty key parameters"
        );
        Ok(response.data().to_vec())
    }

    /// KIF of the addressed key
    pub fn kif(&self) -> u8 {
        self.kif
    }

    /// KVC of the addressed key
    pub fn kvc(&self) -> u8 {
        self.kvc
    }
}
