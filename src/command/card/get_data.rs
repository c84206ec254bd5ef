//! Get Data
//!
//! Reads a BER-TLV data object: the FCI of the current DF, the FCP of
//! the current file, the EF list, or the traceability information.
//! Each is decoded into the matching part of the card image.

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::{FileHeader, FileType};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use tlv;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6A88,
            "Data object not found.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6283,
            "Successful execution, file invalidated.",
            None,
        );
}

/// FCP template tag wrapping the proprietary information
const TAG_FCP_TEMPLATE: u16 = 0x62;

/// Proprietary file information tag
const TAG_PROPRIETARY_INFORMATION: u16 = 0x85;

/// EF descriptor list tag
const TAG_EF_LIST: u16 = 0xC0;

/// Bytes per EF descriptor in the EF list
const EF_DESCRIPTOR_LENGTH: usize = 8;

/// The data objects Get Data can address
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GetDataTag {
    /// FCI of the current DF (refreshes the identification data)
    FciForCurrentDf,

    /// FCP of the current file (refreshes its header)
    FcpForCurrentFile,

    /// Descriptors of every EF under the current DF
    EfList,

    /// Traceability information
    TraceabilityInformation,
}

impl GetDataTag {
    /// The P1/P2 pair addressing this object
    fn p1_p2(self) -> (u8, u8) {
        match self {
            GetDataTag::FciForCurrentDf => (0x00, 0x6F),
            GetDataTag::FcpForCurrentFile => (0x00, 0x62),
            GetDataTag::EfList => (0x00, 0xC0),
            GetDataTag::TraceabilityInformation => (0x01, 0x85),
        }
    }
}

/// Get Data command
pub struct GetDataCommand {
    tag: GetDataTag,
}

impl GetDataCommand {
    /// Read the object addressed by `tag`
    pub fn new(tag: GetDataTag) -> Self {
        Self { tag }
    }
}

impl CardCommand for GetDataCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::GetData
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let (p1, p2) = self.tag.p1_p2();
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::GetData.instruction(),
            p1,
            p2,
            None,
            Some(0),
        )?
        .with_info("Get Data")
        .accept_status(0x6283))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        let data = response.data();

        match self.tag {
            GetDataTag::FciForCurrentDf => {
                ctx.card.apply_fci(data)?;
            }
            GetDataTag::FcpForCurrentFile => {
                let template = tlv::find(data, TAG_FCP_TEMPLATE)?.ok_or_else(|| {
                    err!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "FCP template (tag 62) not found"
                    )
                })?;
                let pi = tlv::find(&template, TAG_PROPRIETARY_INFORMATION)?.ok_or_else(|| {
                    err!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "proprietary information (tag 85) not found in FCP"
                    )
                })?;
                if pi.len() < 16 || pi[0] != 0x04 {
                    fail!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "FCP proprietary information does not describe an EF"
                    );
                }
                let file_type = FileType::from_ef_subtype(pi[1])?;
                let sfi = pi[2];
                let mut access_conditions = [0u8; 4];
                access_conditions.copy_from_slice(&pi[8..12]);
                let mut key_indexes = [0u8; 4];
                key_indexes.copy_from_slice(&pi[12..16]);
                ctx.card.set_file_header(
                    sfi,
                    FileHeader {
                        lid: BigEndian::read_u16(&pi[6..8]),
                        file_type,
                        record_size: BigEndian::read_u16(&pi[3..5]),
                        records_number: pi[5],
                        access_conditions,
                        key_indexes,
                        df_status: if pi.len() > 16 { pi[16] } else { 0 },
                    },
                );
            }
            GetDataTag::EfList => {
                let list = tlv::find(data, TAG_EF_LIST)?.ok_or_else(|| {
                    err!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "EF list (tag C0) not found"
                    )
                })?;
                if list.len() % EF_DESCRIPTOR_LENGTH != 0 {
                    fail!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "EF list of {} bytes is not a sequence of {}-byte descriptors",
                        list.len(),
                        EF_DESCRIPTOR_LENGTH
                    );
                }
                // Descriptor: lid(2) | sfi(1) | subtype(1) |
                // record size(2) | records number(1) | reserved(1)
                for descriptor in list.chunks(EF_DESCRIPTOR_LENGTH) {
                    let file_type = FileType::from_ef_subtype(descriptor[3])?;
                    ctx.card.set_file_header(
                        descriptor[2],
                        FileHeader {
                            lid: BigEndian::read_u16(&descriptor[0..2]),
                            file_type,
                            record_size: BigEndian::read_u16(&descriptor[4..6]),
                            records_number: descriptor[6],
                            access_conditions: [0; 4],
                            key_indexes: [0; 4],
                            df_status: 0,
                        },
                    );
                }
            }
            GetDataTag::TraceabilityInformation => {
                ctx.card.set_traceability_information(data.to_vec());
            }
        }

        if response.status_word() == 0x6283 {
            ctx.card.set_df_invalidated(true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_to_p1_p2() {
        assert_eq!(GetDataTag::FciForCurrentDf.p1_p2(), (0x00, 0x6F));
        assert_eq!(GetDataTag::TraceabilityInformation.p1_p2(), (0x01, 0x85));
    }
}
