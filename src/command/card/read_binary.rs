//! Read Binary
//!
//! Reads one window of a transparent EF. The transaction layer splits
//! long reads into successive windows of at most 250 bytes and, when
//! the EF is addressed by SFI with an offset beyond 255, prepends a
//! one-byte read at offset 0 so the EF becomes current before the
//! offset-only addressing is used.

use apdu::{ApduRequest, ApduResponse};
use card::CalypsoCard;
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
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

/// Read Binary command (one window)
pub struct ReadBinaryCommand {
    sfi: u8,
    offset: u16,
    length: u8,
}

impl ReadBinaryCommand {
    /// Read `length` bytes at `offset` of the EF at `sfi` (`sfi` 0
    /// addresses the current EF)
    pub fn new(sfi: u8, offset: u16, length: u8) -> Self {
        Self {
            sfi,
            offset,
            length,
        }
    }
}

impl CardCommand for ReadBinaryCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ReadBinary
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let (p1, p2) = super::binary_offset_p1_p2(self.sfi, self.offset);
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::ReadBinary.instruction(),
            p1,
            p2,
            None,
            Some(self.length),
        )?
        .with_info("Read Binary"))
    }

    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        let offset = usize::from(self.offset);
        let length = usize::from(self.length);
        card.ef_by_sfi(self.sfi)
            .and_then(|ef| ef.data().content(1))
            .and_then(|content| {
                if content.len() >= offset + length {
                    Some(anticipated(&content[offset..offset + length]))
                } else {
                    None
                }
            })
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, Some(self.length))?;
        ctx.card.set_record_content_at(
            self.sfi,
            1,
            response.data(),
            usize::from(self.offset),
        );
        Ok(())
    }
}
