//! Card Generate Key
//!
//! Produces the enciphered key payload sent to the card by Change Key:
//! the target key (addressed by its KIF/KVC) ciphered under the issuer
//! key against the card challenge.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table().with(
        0x6A83,
        "Source or ciphering key not found.",
        Some(ProtocolErrorKind::DataAccess),
    );
}

/// Card Generate Key command
#[derive(Clone, Debug)]
pub struct CardGenerateKeyCommand {
    card_challenge: Vec<u8>,
    issuer_kif: u8,
    issuer_kvc: u8,
    target_kif: u8,
    target_kvc: u8,
}

impl CardGenerateKeyCommand {
    /// Cipher the target key under the issuer key
    pub fn new(
        card_challenge: &[u8],
        issuer_kif: u8,
        issuer_kvc: u8,
        target_kif: u8,
        target_kvc: u8,
    ) -> Self {
        Self {
            card_challenge: card_challenge.to_vec(),
            issuer_kif,
            issuer_kvc,
            target_kif,
            target_kvc,
        }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(4 + self.card_challenge.len());
        data.push(self.issuer_kif);
        data.push(self.issuer_kvc);
        data.push(self.target_kif);
        data.push(self.target_kvc);
        data.extend_from_slice(&self.card_challenge);
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::CardGenerateKey.instruction(),
            0xFF,
            0x00,
            Some(&data),
            Some(0),
        )?
        .with_info("SAM Card Generate Key"))
    }

    /// Validate the response and extract the enciphered key payload
    /// (24 or 32 bytes)
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::CardGenerateKey.name(), response, None)?;
        ensure!(
            response.data().len() == 24 || response.data().len() == 32,
            ProtocolErrorKind::UnexpectedResponseLength,
            "enciphered key payload is {} bytes (expected 24 or 32)",
            response.data().len()
        );
        Ok(response.data().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn request_carries_key_identifiers_then_challenge() {
        let command = CardGenerateKeyCommand::new(&[0xC1; 8], 0x21, 0x79, 0x27, 0x30);
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(&request.bytes()[4..9], &[0x0C, 0x21, 0x79, 0x27, 0x30]);
    }

    #[test]
    fn payload_length_is_checked() {
        let command = CardGenerateKeyCommand::new(&[0xC1; 8], 0x21, 0x79, 0x27, 0x30);
        let mut bytes = vec![0xAB; 24];
        bytes.extend_from_slice(&[0x90, 0x00]);
        assert!(command.parse(&ApduResponse::new(bytes).unwrap()).is_ok());
        let short = ApduResponse::new(vec![0xAB, 0xAB, 0x90, 0x00]).unwrap();
        assert!(command.parse(&short).is_err());
    }
}
