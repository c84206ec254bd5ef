//! Give Random
//!
//! Hands the card's challenge to the SAM ahead of an operation that
//! ciphers against it (PIN presentation, key generation) outside a
//! secure session.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table();
}

/// Give Random command
#[derive(Clone, Debug)]
pub struct GiveRandomCommand {
    random: Vec<u8>,
}

impl GiveRandomCommand {
    /// Provide the card challenge (8 bytes)
    pub fn new(random: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            random.len() == 4 || random.len() == 8,
            ProtocolErrorKind::IllegalArgument,
            "random is {} bytes (expected 4 or 8)",
            random.len()
        );
        Ok(Self {
            random: random.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::GiveRandom.instruction(),
            0x00,
            0x00,
            Some(&self.random),
            None,
        )?
        .with_info("SAM Give Random"))
    }

    /// Validate the response
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::GiveRandom.name(), response, None)
    }
}
