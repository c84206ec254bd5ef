//! Card Cipher PIN
//!
//! Produces the enciphered PIN block presented to the card by Verify
//! PIN (8 bytes) or Change PIN (8 or 16 bytes).

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table().with(
        0x6A83,
        "Ciphering key not found.",
        Some(ProtocolErrorKind::DataAccess),
    );
}

/// What the PIN block is ciphered for
#[derive(Clone, Debug)]
pub enum PinCipheringMode {
    /// Presentation of the current PIN (Verify PIN)
    Presentation {
        /// The PIN to present (4 bytes)
        pin: Vec<u8>,
    },

    /// Modification of the PIN (Change PIN)
    Modification {
        /// The current PIN (4 bytes)
        current_pin: Vec<u8>,
        /// The new PIN (4 bytes)
        new_pin: Vec<u8>,
    },
}

/// Card Cipher PIN command
#[derive(Clone, Debug)]
pub struct CardCipherPinCommand {
    mode: PinCipheringMode,
    card_challenge: Vec<u8>,
    kif: u8,
    kvc: u8,
}

impl CardCipherPinCommand {
    /// Cipher a PIN block against the card challenge with the key
    /// addressed by KIF/KVC
    pub fn new(
        mode: PinCipheringMode,
        card_challenge: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<Self, ProtocolError> {
        match mode {
            PinCipheringMode::Presentation { ref pin } => {
                ensure!(
                    pin.len() == 4,
                    ProtocolErrorKind::IllegalArgument,
                    "PIN is {} bytes (expected 4)",
                    pin.len()
                );
            }
            PinCipheringMode::Modification {
                ref current_pin,
                ref new_pin,
            } => {
                ensure!(
                    current_pin.len() == 4 && new_pin.len() == 4,
                    ProtocolErrorKind::IllegalArgument,
                    "PINs must be 4 bytes"
                );
            }
        }
        Ok(Self {
            mode,
            card_challenge: card_challenge.to_vec(),
            kif,
            kvc,
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(2 + self.card_challenge.len() + 8);
        data.push(self.kif);
        data.push(self.kvc);
        data.extend_from_slice(&self.card_challenge);
        let p2 = match self.mode {
            PinCipheringMode::Presentation { ref pin } => {
                data.extend_from_slice(pin);
                0xFF
            }
            PinCipheringMode::Modification {
                ref current_pin,
                ref new_pin,
            } => {
                data.extend_from_slice(current_pin);
                data.extend_from_slice(new_pin);
                0x40
            }
        };
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::CardCipherPin.instruction(),
            0x80,
            p2,
            Some(&data),
            Some(0),
        )?
        .with_info("SAM Card Cipher PIN"))
    }

    /// Validate the response and extract the cipher block
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::CardCipherPin.name(), response, None)?;
        let expected = match self.mode {
            PinCipheringMode::Presentation { .. } => response.data().len() == 8,
            PinCipheringMode::Modification { .. } => {
                response.data().len() == 8 || response.data().len() == 16
            }
        };
        ensure!(
            expected,
            ProtocolErrorKind::UnexpectedResponseLength,
            "cipher block is {} bytes",
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
    fn presentation_block_is_8_bytes() {
        let command = CardCipherPinCommand::new(
            PinCipheringMode::Presentation {
                pin: vec![0x31, 0x32, 0x33, 0x34],
            },
            &[0xC1, 0xC2, 0xC3, 0xC4],
            0x30,
            0x79,
        )
        .unwrap();
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(request.bytes()[1], 0x12);
        assert_eq!(request.bytes()[3], 0xFF);

        let response =
            ApduResponse::new(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x90, 0x00])
                .unwrap();
        assert_eq!(command.parse(&response).unwrap().len(), 8);
    }

    #[test]
    fn pin_length_is_checked() {
        assert!(CardCipherPinCommand::new(
            PinCipheringMode::Presentation { pin: vec![0x31; 5] },
            &[0xC1, 0xC2, 0xC3, 0xC4],
            0x30,
            0x79,
        )
        .is_err());
    }
}
