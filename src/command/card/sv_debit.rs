//! SV Debit / SV Undebit
//!
//! Debits the Stored Value balance, or cancels a debit (undebit).
//! Same three-phase structure as SV Reload with a 2-byte amount: the
//! wire carries the negated amount for a debit and the plain amount
//! for an undebit.
//!
//! dataIn layout: `amount(2) | date(2) | time(2) | kvc(1) | samId(4) |
//! samTNum(3) | terminalSvMac(5|10)`.

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::sv::SvDebitLogRecord;
use command::{CardCommand, CardCommandRef};
use crypto::SvCommandSecurityData;
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable =
        super::session_buffer_overlay(super::base_status_table())
            .with(
                0x6900,
                "Transaction counter at its limit.",
                Some(ProtocolErrorKind::Terminated),
            )
            .with(
                0x6981,
                "SV command sequence error (SV Get required first).",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6988,
                "Incorrect SV security data.",
                Some(ProtocolErrorKind::SecurityData),
            );
}

/// Offset of the SAM serial number in the dataIn skeleton
const SAM_ID_OFFSET: usize = 7;

/// Offset of the SAM transaction number in the dataIn skeleton
const SAM_TNUM_OFFSET: usize = 11;

/// Offset of the terminal SV MAC in the dataIn skeleton
const MAC_OFFSET: usize = 14;

/// Debit or cancel a previous debit
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SvAction {
    /// Subtract the amount (SV Debit)
    Do,

    /// Give the amount back (SV Undebit)
    Undo,
}

/// SV Debit / SV Undebit command
pub struct SvDebitCommand {
    action: SvAction,
    amount: i32,
    date: [u8; 2],
    time: [u8; 2],
    extended_mode: bool,
    security: Option<SvCommandSecurityData>,
}

impl SvDebitCommand {
    /// Debit (or undebit) `amount` units, stamped with the terminal
    /// date/time
    pub fn new(
        action: SvAction,
        amount: i32,
        date: [u8; 2],
        time: [u8; 2],
        extended_mode: bool,
    ) -> Result<Self, TransactionError> {
        if amount < 0 || amount > 32_767 {
            fail!(
                TransactionErrorKind::IllegalArgument,
                "SV debit amount {} out of range [0, 32767]",
                amount
            );
        }
        Ok(Self {
            action,
            amount,
            date,
            time,
            extended_mode,
            security: None,
        })
    }

    fn mac_length(&self) -> usize {
        if self.extended_mode {
            10
        } else {
            5
        }
    }

    fn data_length(&self) -> usize {
        MAC_OFFSET + self.mac_length()
    }

    /// Signed amount as transmitted (negated for a debit)
    fn wire_amount(&self) -> i16 {
        match self.action {
            SvAction::Do => -(self.amount as i16),
            SvAction::Undo => self.amount as i16,
        }
    }

    /// Lay out the dataIn skeleton with zeroed security fields
    fn skeleton(&self, kvc: u8) -> Vec<u8> {
        let mut data = vec![0u8; self.data_length()];
        BigEndian::write_i16(&mut data[0..2], self.wire_amount());
        data[2..4].copy_from_slice(&self.date);
        data[4..6].copy_from_slice(&self.time);
        data[6] = kvc;
        data
    }
}

impl CardCommand for SvDebitCommand {
    fn command_ref(&self) -> CardCommandRef {
        match self.action {
            SvAction::Do => CardCommandRef::SvDebit,
            SvAction::Undo => CardCommandRef::SvUndebit,
        }
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn uses_session_buffer(&self) -> bool {
        true
    }

    fn session_buffer_weight(&self) -> usize {
        self.data_length() + super::SESSION_BUFFER_OVERHEAD
    }

    fn requires_crypto_to_finalize(&self) -> bool {
        true
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        if ctx.card.sv().sv_get_response.is_empty() {
            fail!(
                TransactionErrorKind::IllegalState,
                "{} requires a prior SV Get",
                self.command_ref().name()
            );
        }
        let cla = ctx.card.sv_card_class().to_u8();
        let ins = self.command_ref().instruction();
        let mut data = self.skeleton(ctx.card.sv().kvc);

        let mut security = SvCommandSecurityData::default();
        security.set_sv_get_request(ctx.card.sv().sv_get_request_header.clone());
        security.set_sv_get_response(ctx.card.sv().sv_get_response.clone());
        let mut partial = vec![cla, ins, 0x04, 0x00];
        partial.extend_from_slice(&data);
        security.set_sv_command_partial_request(partial);

        ctx.crypto()?.compute_sv_command_security_data(&mut security)?;

        if security.serial_number().len() != 4
            || security.transaction_number().len() != 3
            || security.terminal_sv_mac().len() != self.mac_length()
        {
            fail!(
                TransactionErrorKind::Crypto,
                "SV security data has inconsistent field lengths"
            );
        }
        data[SAM_ID_OFFSET..SAM_ID_OFFSET + 4].copy_from_slice(security.serial_number());
        data[SAM_TNUM_OFFSET..SAM_TNUM_OFFSET + 3].copy_from_slice(security.transaction_number());
        data[MAC_OFFSET..].copy_from_slice(security.terminal_sv_mac());
        self.security = Some(security);

        if ctx.session.is_open() {
            ctx.session.register_sv_postponed();
        }

        Ok(ApduRequest::new(cla, ins, 0x04, 0x00, Some(&data), Some(0))?
            .with_info(self.command_ref().name()))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        let delta = match self.action {
            SvAction::Do => -self.amount,
            SvAction::Undo => self.amount,
        };
        let new_balance = ctx.card.sv_balance() + delta;
        let new_tnum = ctx.card.sv_transaction_number().wrapping_add(1);
        ctx.card.update_sv_data(new_balance, new_tnum);

        // Synthetic debit log mirroring what the card appends
        if let Some(ref security) = self.security {
            let mut raw = vec![0u8; 19];
            BigEndian::write_i16(&mut raw[0..2], self.wire_amount());
            raw[2..4].copy_from_slice(&self.date);
            raw[4..6].copy_from_slice(&self.time);
            raw[6] = ctx.card.sv().kvc;
            raw[7..11].copy_from_slice(security.serial_number());
            raw[11..14].copy_from_slice(security.transaction_number());
            BigEndian::write_i24(&mut raw[14..17], new_balance);
            BigEndian::write_u16(&mut raw[17..19], new_tnum);
            ctx.card.set_sv_debit_log(SvDebitLogRecord::new(&raw)?);
        }

        let data = response.data();
        if !data.is_empty() {
            if data.len() != 3 && data.len() != 6 {
                fail!(
                    TransactionErrorKind::UnexpectedCommandStatus {
                        kind: ProtocolErrorKind::UnexpectedResponseLength,
                    },
                    "SV signature of {} bytes (expected 3 or 6)",
                    data.len()
                );
            }
            ctx.card.set_sv_operation_signature(data.to_vec());
            if !ctx.session.is_open() && !ctx.crypto()?.is_card_sv_mac_valid(data)? {
                fail!(
                    TransactionErrorKind::InvalidCardMac,
                    "card SV MAC refused by the crypto provider"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_range_is_checked() {
        assert!(SvDebitCommand::new(SvAction::Do, 32_767, [0; 2], [0; 2], false).is_ok());
        assert!(SvDebitCommand::new(SvAction::Do, 32_768, [0; 2], [0; 2], false).is_err());
        assert!(SvDebitCommand::new(SvAction::Do, -1, [0; 2], [0; 2], false).is_err());
    }

    #[test]
    fn debit_negates_the_wire_amount() {
        let debit = SvDebitCommand::new(SvAction::Do, 50, [0; 2], [0; 2], false).unwrap();
        assert_eq!(debit.wire_amount(), -50);
        let undebit = SvDebitCommand::new(SvAction::Undo, 50, [0; 2], [0; 2], false).unwrap();
        assert_eq!(undebit.wire_amount(), 50);
    }

    #[test]
    fn skeleton_is_19_bytes_in_compatibility_mode() {
        let command = SvDebitCommand::new(SvAction::Do, 1, [0; 2], [0; 2], false).unwrap();
        assert_eq!(command.skeleton(0x00).len(), 19);
    }
}
