//! Get Challenge
//!
//! Asks the card for a fresh challenge, stored in the image for the
//! enciphered PIN and key-change operations that cipher against it.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table();
}

/// Card challenge length requested from the card
const CHALLENGE_LENGTH: u8 = 8;

/// Get Challenge command
pub struct GetChallengeCommand;

impl GetChallengeCommand {
    /// Request a fresh 8-byte card challenge
    pub fn new() -> Self {
        GetChallengeCommand
    }
}

impl CardCommand for GetChallengeCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::GetChallenge
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::GetChallenge.instruction(),
            0x00,
            0x00,
            None,
            Some(CHALLENGE_LENGTH),
        )?
        .with_info("Get Challenge"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, Some(CHALLENGE_LENGTH))?;
        let data = response.data();
        if data.len() != 4 && data.len() != 8 {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::UnexpectedResponseLength,
                },
                "card challenge of {} bytes (expected 4 or 8)",
                data.len()
            );
        }
        ctx.card.set_challenge(data.to_vec());
        Ok(())
    }
}
