//! Write Record
//!
//! ORs data on top of the current record content (bits already set on
//! the card stay set). Consumes the session modifications buffer.

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
                "Wrong EF type (not a record EF).",
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
            )
            .with(
                0x6A83,
                "Record not found.",
                Some(ProtocolErrorKind::DataAccess),
            );
}

/// Write Record command
pub struct WriteRecordCommand {
    sfi: u8,
    record: u8,
    data: Vec<u8>,
}

impl WriteRecordCommand {
    /// OR `data` on top of `record` of the EF at `sfi`
    pub fn new(sfi: u8, record: u8, data: Vec<u8>) -> Self {
        Self { sfi, record, data }
    }
}

impl CardCommand for WriteRecordCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::WriteRecord
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
            CardCommandRef::WriteRecord.instruction(),
            self.record,
            self.sfi * 8 + 4,
            Some(&self.data),
            None,
        )?
        .with_info("Write Record"))
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
        ctx.card
            .fill_record_content_at(self.sfi, self.record, &self.data, 0);
        Ok(())
    }
}
