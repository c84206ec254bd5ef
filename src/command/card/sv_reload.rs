//! SV Reload
//!
//! Credits the Stored Value balance. Three phases: the dataIn skeleton
//! is laid out locally from the operation parameters, the SAM
//! identification and terminal SV MAC are spliced in at finalisation,
//! and the response parse updates the balance, the transaction number
//! and the reload log. Outside a session the response carries the card
//! SV signature, verified immediately; inside a session the signature
//! is postponed to Close Secure Session.
//!
//! dataIn layout: `date(2) | free1(1) | kvc(1) | free2(1) | amount(3)
//! | time(2) | samId(4) | samTNum(3) | terminalSvMac(5|10)`.

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::sv::SvLoadLogRecord;
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
const SAM_ID_OFFSET: usize = 10;

/// Offset of the SAM transaction number in the dataIn skeleton
const SAM_TNUM_OFFSET: usize = 14;

/// Offset of the terminal SV MAC in the dataIn skeleton
const MAC_OFFSET: usize = 17;

/// SV Reload command
pub struct SvReloadCommand {
    amount: i32,
    date: [u8; 2],
    time: [u8; 2],
    free: [u8; 2],
    extended_mode: bool,
    security: Option<SvCommandSecurityData>,
}

impl SvReloadCommand {
    /// Reload `amount` units, stamped with the terminal date/time and
    /// the two free bytes
    pub fn new(
        amount: i32,
        date: [u8; 2],
        time: [u8; 2],
        free: [u8; 2],
        extended_mode: bool,
    ) -> Result<Self, TransactionError> {
        if amount < -8_388_608 || amount > 8_388_607 {
            fail!(
                TransactionErrorKind::IllegalArgument,
                "SV reload amount {} out of range [-8388608, 8388607]",
                amount
            );
        }
        Ok(Self {
            amount,
            date,
            time,
            free,
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

    /// Lay out the dataIn skeleton with zeroed security fields
    fn skeleton(&self, kvc: u8) -> Vec<u8> {
        let mut data = vec![0u8; self.data_length()];
        data[0..2].copy_from_slice(&self.date);
        data[2] = self.free[0];
        data[3] = kvc;
        data[4] = self.free[1];
        BigEndian::write_i24(&mut data[5..8], self.amount);
        data[8..10].copy_from_slice(&self.time);
        data
    }
}

impl CardCommand for SvReloadCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::SvReload
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
                "SV Reload requires a prior SV Get"
            );
        }
        let cla = ctx.card.sv_card_class().to_u8();
        let ins = CardCommandRef::SvReload.instruction();
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

        Ok(ApduRequest::new(cla, ins, 0x04, 0x00, Some(&data), Some(0))?.with_info("SV Reload"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        let new_balance = ctx.card.sv_balance() + self.amount;
        let new_tnum = ctx.card.sv_transaction_number().wrapping_add(1);
        ctx.card.update_sv_data(new_balance, new_tnum);

        // Synthetic reload log mirroring what the card appends
        if let Some(ref security) = self.security {
            let mut raw = vec![0u8; 22];
            raw[0..2].copy_from_slice(&self.date);
            raw[2..4].copy_from_slice(&self.free);
            raw[4] = ctx.card.sv().kvc;
            BigEndian::write_i24(&mut raw[5..8], self.amount);
            BigEndian::write_i24(&mut raw[8..11], new_balance);
            raw[11..13].copy_from_slice(&self.time);
            raw[13..17].copy_from_slice(security.serial_number());
            raw[17..20].copy_from_slice(security.transaction_number());
            BigEndian::write_u16(&mut raw[20..22], new_tnum);
            ctx.card.set_sv_load_log(SvLoadLogRecord::new(&raw)?);
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
