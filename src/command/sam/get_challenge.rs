//! Get Challenge
//!
//! Returns 4 or 8 pseudo-random bytes used as terminal challenge for
//! session opening or PIN ciphering.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table();
}

/// Get Challenge command
#[derive(Clone, Debug)]
pub struct GetChallengeCommand {
    length: u8,
}

impl GetChallengeCommand {
    /// Request a challenge of 4 or 8 bytes
    pub fn new(length: u8) -> Result<Self, ProtocolError> {
        ensure!(
            length == 4 || length == 8,
            ProtocolErrorKind::IllegalArgument,
            "challenge length {} out of range (expected 4 or 8)",
            length
        );
        Ok(Self { length })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::GetChallenge.instruction(),
            0x00,
            0x00,
            None,
            Some(self.length),
        )?
        .with_info("SAM Get Challenge"))
    }

    /// Validate the response and extract the challenge
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::GetChallenge.name(), response, Some(self.length))?;
        Ok(response.data().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn request_is_case_2() {
        let command = GetChallengeCommand::new(4).unwrap();
        assert_eq!(
            command.request(SAM_CLA).unwrap().bytes(),
            &[0x80, 0x84, 0x00, 0x00, 0x04]
        );
    }

    #[test]
    fn length_is_checked() {
        assert!(GetChallengeCommand::new(5).is_err());
    }

    #[test]
    fn challenge_is_extracted() {
        let command = GetChallengeCommand::new(4).unwrap();
        let response = ApduResponse::new(vec![0xA1, 0xA2, 0xA3, 0xA4, 0x90, 0x00]).unwrap();
        assert_eq!(command.parse(&response).unwrap(), vec![0xA1, 0xA2, 0xA3, 0xA4]);
    }
}
