//! Select File
//!
//! Selects a file by LID or by navigation and decodes the proprietary
//! file information (tag 85) into the matching header of the card
//! image.
//!
//! Proprietary information layout (23 bytes): category(1: 02 DF,
//! 04 EF) | EF subtype(1) | SFI(1) | record size(2) | records
//! number(1) | LID(2) | access conditions(4) | key indexes(4) | DF
//! status(1) | KIF list(3) | KVC list(3).

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::{DirectoryHeader, FileHeader, FileType};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use tlv;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6119,
            "Correct execution, more data available.",
            None,
        )
        .with(
            0x6A82,
            "File not found.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6283,
            "Successful execution, file invalidated.",
            None,
        );
}

/// Proprietary file information tag
const TAG_PROPRIETARY_INFORMATION: u16 = 0x85;

/// Expected length of the proprietary information value
const PROPRIETARY_INFORMATION_LENGTH: usize = 23;

/// File category byte: dedicated file
const CATEGORY_DF: u8 = 0x02;

/// File category byte: elementary file
const CATEGORY_EF: u8 = 0x04;

/// What Select File targets
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelectFileTarget {
    /// Select a file by its 2-byte identifier
    Lid(u16),

    /// Select the current DF
    CurrentDf,

    /// Select the first EF of the current DF
    FirstEf,

    /// Select the next EF of the current DF
    NextEf,
}

/// Select File command
pub struct SelectFileCommand {
    target: SelectFileTarget,
}

impl SelectFileCommand {
    /// Select `target` and record its header in the image
    pub fn new(target: SelectFileTarget) -> Self {
        Self { target }
    }

    /// Decode the proprietary information into the image
    fn parse_proprietary_information(
        pi: &[u8],
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        if pi.len() < PROPRIETARY_INFORMATION_LENGTH {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "proprietary information of {} bytes (expected {})",
                pi.len(),
                PROPRIETARY_INFORMATION_LENGTH
            );
        }

        let lid = BigEndian::read_u16(&pi[6..8]);
        let mut access_conditions = [0u8; 4];
        access_conditions.copy_from_slice(&pi[8..12]);
        let mut key_indexes = [0u8; 4];
        key_indexes.copy_from_slice(&pi[12..16]);
        let df_status = pi[16];

        match pi[0] {
            CATEGORY_DF => {
                let mut kif = [0u8; 3];
                kif.copy_from_slice(&pi[17..20]);
                let mut kvc = [0u8; 3];
                kvc.copy_from_slice(&pi[20..23]);
                ctx.card.set_directory_header(DirectoryHeader {
                    lid,
                    access_conditions,
                    key_indexes,
                    df_status,
                    kif,
                    kvc,
                });
                ctx.card.set_df_invalidated(df_status & 0x01 != 0);
            }
            CATEGORY_EF => {
                let file_type = FileType::from_ef_subtype(pi[1])?;
                let sfi = pi[2];
                ctx.card.set_file_header(
                    sfi,
                    FileHeader {
                        lid,
                        file_type,
                        record_size: BigEndian::read_u16(&pi[3..5]),
                        records_number: pi[5],
                        access_conditions,
                        key_indexes,
                        df_status,
                    },
                );
            }
            other => fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "unknown file category 0x{:02X}",
                other
            ),
        }
        Ok(())
    }
}

impl CardCommand for SelectFileCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::SelectFile
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let (p1, p2, data) = match self.target {
            SelectFileTarget::Lid(lid) => {
                let mut bytes = [0u8; 2];
                BigEndian::write_u16(&mut bytes, lid);
                (0x09, 0x00, bytes)
            }
            SelectFileTarget::CurrentDf => (0x09, 0x00, [0x00, 0x00]),
            SelectFileTarget::FirstEf => (0x02, 0x00, [0x00, 0x00]),
            SelectFileTarget::NextEf => (0x02, 0x02, [0x00, 0x00]),
        };
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::SelectFile.instruction(),
            p1,
            p2,
            Some(&data),
            Some(0),
        )?
        .with_info("Select File")
        .accept_status(0x6283))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        if response.status_word() == 0x6A82 {
            fail!(
                TransactionErrorKind::SelectFileError,
                "{:?} not found",
                self.target
            );
        }
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        let pi = tlv::find(response.data(), TAG_PROPRIETARY_INFORMATION)?.ok_or_else(|| {
            err!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "proprietary information (tag 85) not found in select response"
            )
        })?;
        Self::parse_proprietary_information(&pi, ctx)?;

        if response.status_word() == 0x6283 {
            ctx.card.set_df_invalidated(true);
        }
        Ok(())
    }
}
