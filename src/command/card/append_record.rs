//! Append Record
//!
//! Inserts a new record at the head of a cyclic EF: the new content
//! becomes record 1 and the oldest record is dropped. Consumes the
//! session modifications buffer.

use apdu::{ApduRequest, ApduResponse};
use card::CalypsoCard;
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

lazy_static! {
    static ref STATUS_TABLE: StatusTable =
        super::session_buffer_overlay(super::base_status_table())
            .with(
                0x6981,
                "Wrong EF type (not a cyclic EF).",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6986,
                "No current EF.",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6A82,
                "File not found.",
                Some(ProtocolErrorKind::DataAccess),
            );
}

/// Append Record command
pub struct AppendRecordCommand {
    sfi: u8,
    data: Vec<u8>,
}

impl AppendRecordCommand {
    /// Insert `data` at the head of the cyclic EF at `sfi`
    pub fn new(sfi: u8, data: Vec<u8>) -> Self {
        Self { sfi, data }
    }
}

impl CardCommand for AppendRecordCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::AppendRecord
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn uses_session_buffer(&self) -> bool {
        true
    }

    fn session_buffer_weight(&self) -> usize {
        self.data.len() + super::SESSION_BUFFER_OVERHEAD
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::AppendRecord.instruction(),
            0x00,
            self.sfi * 8,
            Some(&self.data),
            None,
        )?
        .with_info("Append Record"))
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
        ctx.card.add_cyclic_content(self.sfi, self.data.clone());
        Ok(())
    }
}
