//! Change PIN
//!
//! Replaces the card PIN, plain (4 bytes) or as a cipher block over
//! the current and new PIN (8 or 16 bytes) produced by the crypto
//! provider against the card challenge. A successful change resets
//! the presentation counter.

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
            0x6983,
            "PIN blocked.",
            Some(ProtocolErrorKind::Pin { blocked: true }),
        )
        .with(
            0x6988,
            "Incorrect cipher block.",
            Some(ProtocolErrorKind::SecurityData),
        );
}

/// Change PIN command
pub struct ChangePinCommand {
    current_pin: Vec<u8>,
    new_pin: Vec<u8>,
    encrypted: bool,
    kif: u8,
    kvc: u8,
}

impl ChangePinCommand {
    /// Replace the PIN with `new_pin`; with `encrypted`, a cipher
    /// block over `current_pin` and `new_pin` is presented instead
    pub fn new(
        current_pin: &[u8],
        new_pin: &[u8],
        encrypted: bool,
        kif: u8,
        kvc: u8,
    ) -> Result<Self, TransactionError> {
        if new_pin.len() != 4 || (encrypted && current_pin.len() != 4) {
            fail!(
                TransactionErrorKind::IllegalArgument,
                "PINs must be 4 bytes"
            );
        }
        Ok(Self {
            current_pin: current_pin.to_vec(),
            new_pin: new_pin.to_vec(),
            encrypted,
            kif,
            kvc,
        })
    }
}

impl CardCommand for ChangePinCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ChangePin
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

        let data = if self.encrypted {
            let challenge = match ctx.card.challenge() {
                Some(challenge) => challenge.to_vec(),
                None => fail!(
                    TransactionErrorKind::IllegalState,
                    "no card challenge available for enciphered PIN modification"
                ),
            };
            let kif = self.kif;
            let kvc = self.kvc;
            let current_pin = self.current_pin.clone();
            let new_pin = self.new_pin.clone();
            ctx.crypto()?
                .cipher_pin_for_modification(&challenge, &current_pin, &new_pin, kif, kvc)?
        } else {
            self.new_pin.clone()
        };

        Ok(ApduRequest::new(
            cla,
            CardCommandRef::ChangePin.instruction(),
            0x00,
            0x04,
            Some(&data),
            None,
        )?
        .with_info("Change PIN"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        ctx.card.set_pin_attempts(3);
        Ok(())
    }
}

impl Drop for ChangePinCommand {
    fn drop(&mut self) {
        self.current_pin.zeroize();
        self.new_pin.zeroize();
    }
}
