//! Change Key
//!
//! Replaces one of the three session keys of the current DF with a
//! key enciphered by the crypto provider against the card challenge.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6900,
            "Key function disabled.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
        .with(
            0x6A80,
            "Incorrect key cryptogram.",
            Some(ProtocolErrorKind::SecurityData),
        )
        .with(
            0x6A87,
            "Lc inconsistent with P2.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6988,
            "Incorrect key cryptogram.",
            Some(ProtocolErrorKind::SecurityData),
        );
}

/// Change Key command
pub struct ChangeKeyCommand {
    key_index: u8,
    issuer_kif: u8,
    issuer_kvc: u8,
    target_kif: u8,
    target_kvc: u8,
}

impl ChangeKeyCommand {
    /// Replace the session key at `key_index` (1 to 3) with the key
    /// addressed by `target_kif`/`target_kvc`, ciphered under the
    /// issuer key
    pub fn new(
        key_index: u8,
        issuer_kif: u8,
        issuer_kvc: u8,
        target_kif: u8,
        target_kvc: u8,
    ) -> Result<Self, TransactionError> {
        if key_index < 1 || key_index > 3 {
            fail!(
                TransactionErrorKind::IllegalArgument,
                "key index {} out of range [1, 3]",
                key_index
            );
        }
        Ok(Self {
            key_index,
            issuer_kif,
            issuer_kvc,
            target_kif,
            target_kvc,
        })
    }
}

impl CardCommand for ChangeKeyCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ChangeKey
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn requires_crypto_to_finalize(&self) -> bool {
        true
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let challenge = match ctx.card.challenge() {
            Some(challenge) => challenge.to_vec(),
            None => fail!(
                TransactionErrorKind::IllegalState,
                "no card challenge available for the key change"
            ),
        };
        let (issuer_kif, issuer_kvc) = (self.issuer_kif, self.issuer_kvc);
        let (target_kif, target_kvc) = (self.target_kif, self.target_kvc);
        let payload = ctx.crypto()?.generate_ciphered_card_key(
            &challenge,
            issuer_kif,
            issuer_kvc,
            target_kif,
            target_kvc,
        )?;

        Ok(ApduRequest::new(
            cla,
            CardCommandRef::ChangeKey.instruction(),
            0x00,
            self.key_index,
            Some(&payload),
            None,
        )?
        .with_info("Change Key"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        _ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        Ok(())
    }
}
