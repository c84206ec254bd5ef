//! Invalidate / Rehabilitate
//!
//! Toggles the invalidation status of the current DF. Both commands
//! are bare instructions that consume the session modifications
//! buffer.

use apdu::{ApduRequest, ApduResponse};
use card::CalypsoCard;
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

lazy_static! {
    static ref STATUS_TABLE: StatusTable =
        super::session_buffer_overlay(super::base_status_table()).with(
            0x6988,
            "Incorrect signature.",
            Some(ProtocolErrorKind::SecurityData),
        );
}

/// Invalidate / Rehabilitate command
pub struct InvalidateRehabilitateCommand {
    rehabilitate: bool,
}

impl InvalidateRehabilitateCommand {
    /// Invalidate the current DF
    pub fn invalidate() -> Self {
        Self {
            rehabilitate: false,
        }
    }

    /// Rehabilitate the current DF
    pub fn rehabilitate() -> Self {
        Self { rehabilitate: true }
    }
}

impl CardCommand for InvalidateRehabilitateCommand {
    fn command_ref(&self) -> CardCommandRef {
        if self.rehabilitate {
            CardCommandRef::Rehabilitate
        } else {
            CardCommandRef::Invalidate
        }
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn uses_session_buffer(&self) -> bool {
        true
    }

    fn session_buffer_weight(&self) -> usize {
        super::SESSION_BUFFER_OVERHEAD
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        Ok(ApduRequest::new(
            cla,
            self.command_ref().instruction(),
            0x00,
            0x00,
            None,
            None,
        )?
        .with_info(if self.rehabilitate {
            "Rehabilitate"
        } else {
            "Invalidate"
        }))
    }

    fn anticipated_response(&self, _card: &CalypsoCard) -> Option<ApduResponse> {
        Some(anticipated(&[]))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        ctx.card.set_df_invalidated(!self.rehabilitate);
        Ok(())
    }
}
