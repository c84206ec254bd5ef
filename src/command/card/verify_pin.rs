//! Verify PIN
//!
//! Presents the PIN, plain (4 bytes) or enciphered against the card
//! challenge (8 bytes). With an empty data field the command only
//! reads the presentation counter. The status word encodes the
//! attempts remaining: `9000` resets to 3, `63C2` and `63C1` count
//! down, `6983` means blocked.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};
use zeroize::Zeroize;

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6900,
            "PIN function disabled.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
        .with(
            0x63C2,
            "Incorrect PIN, 2 attempts left.",
            Some(ProtocolErrorKind::Pin { blocked: false }),
        )
        .with(
            0x63C1,
            "Incorrect PIN, 1 attempt left.",
            Some(ProtocolErrorKind::Pin { blocked: false }),
        )
        .with(
            0x6983,
            "PIN blocked.",
            Some(ProtocolErrorKind::Pin { blocked: true }),
        );
}

/// Verify PIN command
pub struct VerifyPinCommand {
    pin: Vec<u8>,
    encrypted: bool,
    read_counter_only: bool,
    kif: u8,
    kvc: u8,
}

impl VerifyPinCommand {
    /// Present `pin` (4 bytes); with `encrypted` the PIN is ciphered
    /// against the card challenge using the key addressed by
    /// `kif`/`kvc`
    pub fn new(pin: &[u8], encrypted: bool, kif: u8, kvc: u8) -> Result<Self, TransactionError> {
        if pin.len() != 4 {
            fail!(
                TransactionErrorKind::IllegalArgument,
                "PIN is {} bytes (expected 4)",
                pin.len()
            );
        }
        Ok(Self {
            pin: pin.to_vec(),
            encrypted,
            read_counter_only: false,
            kif,
            kvc,
        })
    }

    /// Only read the presentation counter, presenting nothing
    pub fn read_counter() -> Self {
        Self {
            pin: Vec::new(),
            encrypted: false,
            read_counter_only: true,
            kif: 0,
            kvc: 0,
        }
    }

    /// Attempts remaining encoded in a Verify PIN status word
    pub(crate) fn attempts_from_status_word(sw: u16) -> Option<u8> {
        match sw {
            0x9000 => Some(3),
            0x63C2 => Some(2),
            0x63C1 => Some(1),
            0x6983 => Some(0),
            _ => None,
        }
    }
}

impl CardCommand for VerifyPinCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::VerifyPin
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn requires_crypto_to_finalize(&self) -> bool {
        self.encrypted
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();

        let data = if self.read_counter_only {
            None
        } else if self.encrypted {
            let challenge = match ctx.card.challenge() {
                Some(challenge) => challenge.to_vec(),
                None => fail!(
                    TransactionErrorKind::IllegalState,
                    "no card challenge available for enciphered PIN presentation"
                ),
            };
            let kif = self.kif;
            let kvc = self.kvc;
            let pin = self.pin.clone();
            Some(
                ctx.crypto()?
                    .cipher_pin_for_presentation(&challenge, &pin, kif, kvc)?,
            )
        } else {
            Some(self.pin.clone())
        };

        let request = ApduRequest::new(
            cla,
            CardCommandRef::VerifyPin.instruction(),
            0x00,
            0x00,
            data.as_ref().map(Vec::as_slice),
            None,
        )?
        .with_info("Verify PIN")
        .accept_status(0x63C1)
        .accept_status(0x63C2)
        .accept_status(0x6983);
        Ok(request)
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        let sw = response.status_word();
        if let Some(attempts) = Self::attempts_from_status_word(sw) {
            ctx.card.set_pin_attempts(attempts);
            if self.read_counter_only {
                return Ok(());
            }
        }
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        Ok(())
    }
}

impl Drop for VerifyPinCommand {
    fn drop(&mut self) {
        self.pin.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_words_encode_the_attempt_counter() {
        assert_eq!(VerifyPinCommand::attempts_from_status_word(0x9000), Some(3));
        assert_eq!(VerifyPinCommand::attempts_from_status_word(0x63C2), Some(2));
        assert_eq!(VerifyPinCommand::attempts_from_status_word(0x63C1), Some(1));
        assert_eq!(VerifyPinCommand::attempts_from_status_word(0x6983), Some(0));
        assert_eq!(VerifyPinCommand::attempts_from_status_word(0x6700), None);
    }

    #[test]
    fn pin_length_is_checked() {
        assert!(VerifyPinCommand::new(&[0x31, 0x32, 0x33], false, 0, 0).is_err());
        assert!(VerifyPinCommand::new(&[0x31, 0x32, 0x33, 0x34], false, 0, 0).is_ok());
    }
}
