//! Search Record Multiple
//!
//! Searches every record from a starting point for a masked pattern.
//! The response lists the matching record numbers and optionally the
//! content of the first match. A card with no match answers `6A83`,
//! which this best-effort command does not treat as an error.

use std::cell::RefCell;
use std::rc::Rc;

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6981,
            "Wrong EF type (not a linear EF).",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A80,
            "Incorrect search data.",
            Some(ProtocolErrorKind::IllegalParameter),
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

/// Input and output of a record search, shared between the caller and
/// the queued command
#[derive(Clone, Debug, Default)]
pub struct SearchCommandData {
    /// SFI of the EF to search
    pub sfi: u8,

    /// First record to search
    pub first_record: u8,

    /// Offset of the search window inside each record
    pub offset: u8,

    /// Pattern to match
    pub search_data: Vec<u8>,

    /// Bit mask applied before matching (empty = full match)
    pub mask: Vec<u8>,

    /// Also fetch the content of the first matching record
    pub fetch_first_matching_result: bool,

    /// Output: matching record numbers
    pub matching_records: Vec<u8>,
}

/// Search Record Multiple command
pub struct SearchRecordMultipleCommand {
    data: Rc<RefCell<SearchCommandData>>,
}

impl SearchRecordMultipleCommand {
    /// Search with the parameters of `data`; results are written back
    /// into it
    pub fn new(data: Rc<RefCell<SearchCommandData>>) -> Result<Self, TransactionError> {
        {
            let input = data.borrow();
            if input.search_data.is_empty() || input.search_data.len() > 250 {
                fail!(
                    TransactionErrorKind::IllegalArgument,
                    "search pattern of {} bytes out of range [1, 250]",
                    input.search_data.len()
                );
            }
            if !input.mask.is_empty() && input.mask.len() != input.search_data.len() {
                fail!(
                    TransactionErrorKind::IllegalArgument,
                    "mask of {} bytes does not cover the {}-byte pattern",
                    input.mask.len(),
                    input.search_data.len()
                );
            }
        }
        Ok(Self { data })
    }
}

impl CardCommand for SearchRecordMultipleCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::SearchRecordMultiple
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let input = self.data.borrow();
        let cla = ctx.card.card_class().to_u8();
        let mut request_data = Vec::with_capacity(2 + input.search_data.len() * 2);
        request_data.push(input.offset);
        request_data.push(input.search_data.len() as u8);
        request_data.extend_from_slice(&input.search_data);
        if input.mask.is_empty() {
            request_data.extend(::std::iter::repeat(0xFF).take(input.search_data.len()));
        } else {
            request_data.extend_from_slice(&input.mask);
        }
        let p2 = input.sfi * 8 + if input.fetch_first_matching_result { 7 } else { 6 };
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::SearchRecordMultiple.instruction(),
            input.first_record,
            p2,
            Some(&request_data),
            Some(0),
        )?
        .with_info("Search Record Multiple")
        .accept_status(0x6A83))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        // Best-effort: no match leaves the outputs empty without
        // aborting the surrounding processing
        if response.status_word() == 0x6A83 {
            debug!("Search Record Multiple found no matching record");
            return Ok(());
        }
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        let data = response.data();
        if data.is_empty() {
            return Ok(());
        }
        let count = usize::from(data[0]);
        if data.len() < 1 + count {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "search response shorter than its {} match entries",
                count
            );
        }

        let mut output = self.data.borrow_mut();
        output.matching_records = data[1..1 + count].to_vec();

        if output.fetch_first_matching_result && count > 0 {
            let first_content = &data[1 + count..];
            if !first_content.is_empty() {
                ctx.card.set_record_content(
                    output.sfi,
                    output.matching_records[0],
                    first_content.to_vec(),
                );
            }
        }
        Ok(())
    }
}
