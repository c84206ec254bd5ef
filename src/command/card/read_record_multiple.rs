//! Read Record Multiple
//!
//! Extracts the same `offset`/`length` window from successive records.
//! A card that runs past the last record answers `6A83` with the
//! windows collected so far, which is acceptable.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6981,
            "Wrong EF type (not a linear EF).",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A82,
            "File not found.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A83,
            "Record not found (end of file reached).",
            Some(ProtocolErrorKind::DataAccess),
        );
}

/// Read Record Multiple command
pub struct ReadRecordMultipleCommand {
    sfi: u8,
    first_record: u8,
    offset: u8,
    length: u8,
}

impl ReadRecordMultipleCommand {
    /// Extract `length` bytes at `offset` from every record starting
    /// at `first_record`
    pub fn new(sfi: u8, first_record: u8, offset: u8, length: u8) -> Self {
        Self {
            sfi,
            first_record,
            offset,
            length,
        }
    }
}

impl CardCommand for ReadRecordMultipleCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ReadRecordMultiple
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
            CardCommandRef::ReadRecordMultiple.instruction(),
            self.first_record,
            self.sfi * 8 + 5,
            Some(&[self.offset, self.length]),
            Some(0),
        )?
        .with_info("Read Record Multiple")
        .accept_status(0x6A83))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        // 6A83 marks the end of the file: keep what was returned
        if response.status_word() != 0x6A83 {
            STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        } else {
            debug!("Read Record Multiple stopped at the end of the file");
        }

        let length = usize::from(self.length);
        if length == 0 {
            return Ok(());
        }
        for (i, window) in response.data().chunks(length).enumerate() {
            if window.len() == length {
                ctx.card.set_record_content_at(
                    self.sfi,
                    self.first_record + i as u8,
                    window,
                    usize::from(self.offset),
                );
            }
        }
        Ok(())
    }
}
