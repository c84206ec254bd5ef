//! SV Get
//!
//! Opens an SV operation: reads the Stored Value context (KVC,
//! transaction number, previous signature, challenge, balance) and the
//! reload and/or debit log. The raw request header and response are
//! kept in the image for the SAM's SV Prepare.
//!
//! Response layout: `kvc(1) | tnum(2) | previousSignatureLo(3) |
//! challengeOut(2) | balance(3)` followed by a 22-byte load log
//! (reload variant), a 19-byte debit log (debit variant), or both
//! (extended variant, load log first).

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::sv::{SvDebitLogRecord, SvLoadLogRecord, DEBIT_LOG_SIZE, LOAD_LOG_SIZE};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6981,
            "SV command sequence error.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A81,
            "SV function not available.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
        .with(
            0x6A86,
            "P1 or P2 not supported.",
            Some(ProtocolErrorKind::IllegalParameter),
        );
}

/// Header length of every SV Get response
const SV_GET_HEADER_LENGTH: usize = 11;

/// Which SV operation the SV Get opens
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SvOperation {
    /// Followed by SV Reload
    Reload,

    /// Followed by SV Debit or SV Undebit
    Debit,
}

/// SV Get command
pub struct SvGetCommand {
    operation: SvOperation,
    extended_mode: bool,
    request_header: Vec<u8>,
}

impl SvGetCommand {
    /// Open the SV context for `operation`
    pub fn new(operation: SvOperation, extended_mode: bool) -> Self {
        Self {
            operation,
            extended_mode,
            request_header: Vec::new(),
        }
    }
}

impl CardCommand for SvGetCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::SvGet
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.sv_card_class().to_u8();
        let p1 = if self.extended_mode { 0x01 } else { 0x00 };
        let p2 = match self.operation {
            SvOperation::Reload => 0x07,
            SvOperation::Debit => 0x09,
        };
        self.request_header = vec![cla, CardCommandRef::SvGet.instruction(), p1, p2];
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::SvGet.instruction(),
            p1,
            p2,
            None,
            Some(0),
        )?
        .with_info("SV Get"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        let data = response.data();

        let expected_compat = match self.operation {
            SvOperation::Reload => SV_GET_HEADER_LENGTH + LOAD_LOG_SIZE,
            SvOperation::Debit => SV_GET_HEADER_LENGTH + DEBIT_LOG_SIZE,
        };
        let expected_extended = SV_GET_HEADER_LENGTH + LOAD_LOG_SIZE + DEBIT_LOG_SIZE;

        let (load_log, debit_log) = if data.len() == expected_extended {
            let load_end = SV_GET_HEADER_LENGTH + LOAD_LOG_SIZE;
            (
                Some(SvLoadLogRecord::new(&data[SV_GET_HEADER_LENGTH..load_end])?),
                Some(SvDebitLogRecord::new(&data[load_end..])?),
            )
        } else if data.len() == expected_compat {
            match self.operation {
                SvOperation::Reload => (
                    Some(SvLoadLogRecord::new(&data[SV_GET_HEADER_LENGTH..])?),
                    None,
                ),
                SvOperation::Debit => (
                    None,
                    Some(SvDebitLogRecord::new(&data[SV_GET_HEADER_LENGTH..])?),
                ),
            }
        } else {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::UnexpectedResponseLength,
                },
                "SV Get response of {} bytes (expected {} or {})",
                data.len(),
                expected_compat,
                expected_extended
            );
        };

        let kvc = data[0];
        let transaction_number = BigEndian::read_u16(&data[1..3]);
        let balance = BigEndian::read_i24(&data[8..11]);
        ctx.card.set_challenge(data[6..8].to_vec());
        ctx.card.set_sv_data(
            kvc,
            self.request_header.clone(),
            data.to_vec(),
            balance,
            transaction_number,
            load_log,
            debit_log,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_lengths() {
        assert_eq!(SV_GET_HEADER_LENGTH + LOAD_LOG_SIZE, 33);
        assert_eq!(SV_GET_HEADER_LENGTH + DEBIT_LOG_SIZE, 30);
        assert_eq!(SV_GET_HEADER_LENGTH + LOAD_LOG_SIZE + DEBIT_LOG_SIZE, 52);
    }
}
