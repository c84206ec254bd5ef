//! Select Diversifier
//!
//! Seeds subsequent key diversifications with the serial number of the
//! card the SAM is working for.

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

/// Select Diversifier command
#[derive(Clone, Debug)]
pub struct SelectDiversifierCommand {
    diversifier: Vec<u8>,
}

impl SelectDiversifierCommand {
    /// Diversify with a card serial number or an explicit diversifier
    /// (4 or 8 bytes)
    pub fn new(diversifier: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            diversifier.len() == 4 || diversifier.len() == 8,
            ProtocolErrorKind::IllegalArgument,
            "diversifier is {} bytes (expected 4 or 8)",
            diversifier.len()
        );
        Ok(Self {
            diversifier: diversifier.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::SelectDiversifier.instruction(),
            0x00,
            0x00,
            Some(&self.diversifier),
            None,
        )?
        .with_info("SAM Select Diversifier"))
    }

    /// Validate the response
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::SelectDiversifier.name(), response, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn request_carries_the_diversifier() {
        let command = SelectDiversifierCommand::new(&[0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(
            command.request(SAM_CLA).unwrap().bytes(),
            &[0x80, 0x14, 0x00, 0x00, 0x04, 0x11, 0x22, 0x33, 0x44]
        );
    }

    #[test]
    fn diversifier_length_is_checked() {
        assert!(SelectDiversifierCommand::new(&[0x11; 5]).is_err());
    }
}
