//! Ratification
//!
//! A deliberately ill-formed read sent right after Close Secure
//! Session: the card rejects it, but the exchange itself is what makes
//! the card mark the closed session as ratified. Any status word is
//! acceptable.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table();
}

/// Ratification command
pub struct RatificationCommand;

impl RatificationCommand {
    /// Provide the ratification exchange
    pub fn new() -> Self {
        RatificationCommand
    }
}

impl CardCommand for RatificationCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::Ratification
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
            CardCommandRef::Ratification.instruction(),
            0x00,
            0x00,
            None,
            Some(0),
        )?
        .with_info("Ratification")
        .accept_status(0x6B00)
        .accept_status(0x6700)
        .accept_status(0x6A83))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        // The card is expected to reject this read; the exchange alone
        // ratified the session
        debug!(
            "ratification exchange answered SW=0x{:04X}",
            response.status_word()
        );
        ctx.session.mark_closed();
        Ok(())
    }
}
