//! Update Binary / Write Binary
//!
//! Writes one window of a transparent EF: Update replaces the bytes,
//! Write ORs them on top of the current content. Consumes the session
//! modifications buffer. The transaction layer splits long writes into
//! windows of at most 250 bytes and handles the offset-addressing
//! restriction the same way as Read Binary.

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
                "Wrong EF type (not a binary EF).",
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

/// Replace or OR the written window
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryWriteMode {
    /// Replace the bytes (Update Binary)
    Update,

    /// OR on top of the current content (Write Binary)
    Write,
}

/// Update Binary / Write Binary command (one window)
pub struct UpdateOrWriteBinaryCommand {
    mode: BinaryWriteMode,
    sfi: u8,
    offset: u16,
    data: Vec<u8>,
}

impl UpdateOrWriteBinaryCommand {
    /// Write `data` at `offset` of the EF at `sfi`
    pub fn new(mode: BinaryWriteMode, sfi: u8, offset: u16, data: Vec<u8>) -> Self {
        Self {
            mode,
            sfi,
            offset,
            data,
        }
    }
}

impl CardCommand for UpdateOrWriteBinaryCommand {
    fn command_ref(&self) -> CardCommandRef {
        match self.mode {
            BinaryWriteMode::Update => CardCommandRef::UpdateBinary,
            BinaryWriteMode::Write => CardCommandRef::WriteBinary,
        }
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
        let (p1, p2) = super::binary_offset_p1_p2(self.sfi, self.offset);
        Ok(ApduRequest::new(
            cla,
            self.command_ref().instruction(),
            p1,
            p2,
            Some(&self.data),
            None,
        )?
        .with_info(match self.mode {
            BinaryWriteMode::Update => "Update Binary",
            BinaryWriteMode::Write => "Write Binary",
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
        match self.mode {
            BinaryWriteMode::Update => ctx.card.set_record_content_at(
                self.sfi,
                1,
                &self.data,
                usize::from(self.offset),
            ),
            BinaryWriteMode::Write => ctx.card.fill_record_content_at(
                self.sfi,
                1,
                &self.data,
                usize::from(self.offset),
            ),
        }
        Ok(())
    }
}
