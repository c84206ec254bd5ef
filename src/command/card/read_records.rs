//! Read Records
//!
//! Reads one record, or every record from the first one onwards. In
//! multiple mode the response is a concatenation of
//! `recordNumber | length | bytes` chunks.

use apdu::{ApduRequest, ApduResponse};
use card::CalypsoCard;
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
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

/// One record or every record from the first one
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadMode {
    /// Read a single record
    OneRecord,

    /// Read from the first record to the last one that fits
    MultipleRecord,
}

/// Read Records command
pub struct ReadRecordsCommand {
    sfi: u8,
    first_record: u8,
    read_mode: ReadMode,
    expected_length: u8,
}

impl ReadRecordsCommand {
    /// Read record(s) of the EF at `sfi` starting from
    /// `first_record`; `expected_length` sets `Le` (0 lets the card
    /// decide)
    pub fn new(sfi: u8, first_record: u8, read_mode: ReadMode, expected_length: u8) -> Self {
        Self {
            sfi,
            first_record,
            read_mode,
            expected_length,
        }
    }
}

impl CardCommand for ReadRecordsCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ReadRecords
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let p2 = self.sfi * 8
            + match self.read_mode {
                ReadMode::MultipleRecord => 4,
                ReadMode::OneRecord => 5,
            };
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::ReadRecords.instruction(),
            self.first_record,
            p2,
            None,
            Some(self.expected_length),
        )?
        .with_info("Read Records"))
    }

    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        match self.read_mode {
            ReadMode::OneRecord => card
                .ef_by_sfi(self.sfi)
                .and_then(|ef| ef.data().content(self.first_record))
                .map(anticipated),
            // The record count actually returned depends on the card;
            // no reliable anticipation from the image
            ReadMode::MultipleRecord => None,
        }
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(
            self.command_ref().name(),
            response,
            Some(self.expected_length),
        )?;
        let data = response.data();

        match self.read_mode {
            ReadMode::OneRecord => {
                ctx.card
                    .set_record_content(self.sfi, self.first_record, data.to_vec());
            }
            ReadMode::MultipleRecord => {
                let mut pos = 0;
                while pos < data.len() {
                    if pos + 2 > data.len() {
                        fail!(
                            TransactionErrorKind::UnexpectedCommandStatus {
                                kind: ProtocolErrorKind::DataOutOfBounds,
                            },
                            "truncated record chunk in multiple-record response"
                        );
                    }
                    let record = data[pos];
                    let length = usize::from(data[pos + 1]);
                    pos += 2;
                    if pos + length > data.len() {
                        fail!(
                            TransactionErrorKind::UnexpectedCommandStatus {
                                kind: ProtocolErrorKind::DataOutOfBounds,
                            },
                            "record {} chunk overruns the multiple-record response",
                            record
                        );
                    }
                    ctx.card
                        .set_record_content(self.sfi, record, data[pos..pos + length].to_vec());
                    pos += length;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2_distinguishes_the_read_modes() {
        // one record: sfi*8 + 5, multiple: sfi*8 + 4
        assert_eq!(0x07 * 8 + 5, 0x3D);
        assert_eq!(0x07 * 8 + 4, 0x3C);
        let one = ReadRecordsCommand::new(0x07, 1, ReadMode::OneRecord, 0x1D);
        assert_eq!(one.read_mode, ReadMode::OneRecord);
    }
}
