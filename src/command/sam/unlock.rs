//! Unlock
//!
//! Unlocks a locked SAM with the secret configured on the selector.
//! A SAM that is already unlocked answers `6985`, which is tolerated.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table()
        .with(
            0x6988,
            "Incorrect unlock data.",
            Some(ProtocolErrorKind::SecurityData),
        )
        .with(
            0x6983,
            "Unlock blocked.",
            Some(ProtocolErrorKind::Terminated),
        );
}

/// Unlock command
#[derive(Clone, Debug)]
pub struct UnlockCommand {
    unlock_data: Vec<u8>,
}

impl UnlockCommand {
    /// Unlock with an 8 or 16-byte secret
    pub fn new(unlock_data: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            unlock_data.len() == 8 || unlock_data.len() == 16,
            ProtocolErrorKind::IllegalArgument,
            "unlock data is {} bytes (expected 8 or 16)",
            unlock_data.len()
        );
        Ok(Self {
            unlock_data: unlock_data.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::Unlock.instruction(),
            0x00,
            0x00,
            Some(&self.unlock_data),
            None,
        )?
        .with_info("SAM Unlock")
        .accept_status(0x6985))
    }

    /// Validate the response, tolerating an already-unlocked SAM
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        if response.status_word() == 0x6985 {
            warn!("SAM already unlocked");
            return Ok(());
        }
        STATUS_TABLE.check(SamCommandRef::Unlock.name(), response, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn unlock_data_length_is_checked() {
        assert!(UnlockCommand::new(&[0x00; 8]).is_ok());
        assert!(UnlockCommand::new(&[0x00; 16]).is_ok());
        assert!(UnlockCommand::new(&[0x00; 12]).is_err());
    }

    #[test]
    fn already_unlocked_is_a_soft_success() {
        let command = UnlockCommand::new(&[0x00; 8]).unwrap();
        let response = ApduResponse::new(vec![0x69, 0x85]).unwrap();
        assert!(command.check(&response).is_ok());
    }

    #[test]
    fn wrong_secret_is_an_error() {
        let command = UnlockCommand::new(&[0x00; 8]).unwrap();
        let response = ApduResponse::new(vec![0x69, 0x88]).unwrap();
        assert!(command.check(&response).is_err());
        let _ = command.request(SAM_CLA).unwrap();
    }
}
