//! Transaction orchestrator
//!
//! A [`CardTransaction`] owns the card image, the (optional) crypto
//! provider and the reader transport for the duration of one
//! transaction. `prepare_*` methods append commands to a queue;
//! [`process_commands`](CardTransaction::process_commands) finalises
//! them in order, groups them into card requests, routes them through
//! the transceiver and dispatches every response to the command that
//! produced the request. Commands that need the crypto provider to
//! build their request are exchanged on their own so that everything
//! before them is already processed and MAC-accumulated.
//!
//! On any error the remaining queue is dropped and, if a session is
//! open, it is aborted and the card image restored.

pub mod error;

pub use self::error::{TransactionError, TransactionErrorKind};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use apdu::{to_hex, ApduRequest, ApduResponse, PAYLOAD_CAPACITY};
use card::{CalypsoCard, WriteAccessLevel};
use command::card::{
    AbortSecureSessionCommand, AppendRecordCommand, BinaryWriteMode, ChangeKeyCommand,
    ChangePinCommand, CloseSecureSessionCommand, GetChallengeCommand, GetDataCommand, GetDataTag,
    IncreaseDecreaseCommand, IncreaseDecreaseMultipleCommand, InvalidateRehabilitateCommand,
    ManageSecureSessionCommand, OpenSecureSessionCommand, RatificationCommand, ReadBinaryCommand,
    ReadMode, ReadRecordMultipleCommand, ReadRecordsCommand, SearchCommandData,
    SearchRecordMultipleCommand, SelectFileCommand, SelectFileTarget, SvAction, SvDebitCommand,
    SvGetCommand, SvOperation, SvReloadCommand, UpdateOrWriteBinaryCommand, UpdateRecordCommand,
    VerifyPinCommand, WriteRecordCommand,
};
use command::{CardCommand, CardCommandRef, CryptoStrategy};
use crypto::SymmetricCryptoProvider;
use error::ProtocolErrorKind;
use session::{SecureSession, SessionState};
use transceiver::{ApduTransceiver, CardRequest, ChannelControl};

/// Highest legal SFI
const MAX_SFI: u8 = 30;

/// Highest legal record number
const MAX_RECORD_NUMBER: u8 = 250;

/// Highest legal counter number (3-byte counters packed in one record)
const MAX_COUNTER_NUMBER: u8 = (PAYLOAD_CAPACITY / 3) as u8;

/// Highest legal binary offset (15 bits)
const MAX_BINARY_OFFSET: usize = 0x7FFF;

/// Highest legal counter value / increment (24 bits)
const MAX_COUNTER_VALUE: u32 = 0x00FF_FFFF;

/// The mutable state a command may touch while it is finalised or
/// parsed: the card image, the session state machine, and the crypto
/// provider when one is configured
pub(crate) struct TransactionContext<'a> {
    /// The card image
    pub card: &'a mut CalypsoCard,

    /// The secure-session state machine
    pub session: &'a mut SecureSession,

    crypto: Option<&'a mut dyn SymmetricCryptoProvider>,
}

impl<'a> TransactionContext<'a> {
    /// The crypto provider, or `IllegalState` when none is configured
    pub fn crypto(&mut self) -> Result<&mut dyn SymmetricCryptoProvider, TransactionError> {
        match self.crypto {
            Some(ref mut crypto) => Ok(&mut **crypto),
            None => fail!(
                TransactionErrorKind::IllegalState,
                "no crypto provider configured on this transaction"
            ),
        }
    }

}

/// A finalised command waiting in the current card request
struct BatchEntry {
    command: Box<dyn CardCommand>,
    request: ApduRequest,
    anticipated: Option<ApduResponse>,
    mac_pending: bool,
}

/// A transaction with one Calypso card
pub struct CardTransaction {
    transceiver: Box<dyn ApduTransceiver>,
    card: CalypsoCard,
    crypto: Option<Box<dyn SymmetricCryptoProvider>>,
    session: SecureSession,
    queue: Vec<Box<dyn CardCommand>>,
    session_planned: bool,
}

impl CardTransaction {
    /// Start a transaction with the card reachable through
    /// `transceiver`, mirrored by `card`
    pub fn new(transceiver: Box<dyn ApduTransceiver>, card: CalypsoCard) -> Self {
        Self {
            transceiver,
            card,
            crypto: None,
            session: SecureSession::default(),
            queue: Vec::new(),
            session_planned: false,
        }
    }

    /// Attach the symmetric-crypto provider enabling secure sessions,
    /// SV operations and enciphered PIN handling
    pub fn with_crypto_provider(mut self, crypto: Box<dyn SymmetricCryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// The card image
    pub fn card(&self) -> &CalypsoCard {
        &self.card
    }

    /// End the transaction, yielding the card image
    pub fn into_card(self) -> CalypsoCard {
        self.card
    }

    /// The session state machine (observable state only)
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    fn context<'a>(
        card: &'a mut CalypsoCard,
        session: &'a mut SecureSession,
        crypto: &'a mut Option<Box<dyn SymmetricCryptoProvider>>,
    ) -> TransactionContext<'a> {
        TransactionContext {
            card,
            session,
            crypto: crypto
                .as_mut()
                .map(|c| -> &mut dyn SymmetricCryptoProvider { &mut **c }),
        }
    }

    //
    // Prepare: argument validation and queueing
    //

    fn check_sfi(sfi: u8) -> Result<(), TransactionError> {
        ensure!(
            sfi <= MAX_SFI,
            TransactionErrorKind::IllegalArgument,
            "SFI {} out of range [0, {}]",
            sfi,
            MAX_SFI
        );
        Ok(())
    }

    fn check_record(record: u8) -> Result<(), TransactionError> {
        ensure!(
            record >= 1 && record <= MAX_RECORD_NUMBER,
            TransactionErrorKind::IllegalArgument,
            "record number {} out of range [1, {}]",
            record,
            MAX_RECORD_NUMBER
        );
        Ok(())
    }

    fn check_payload(data: &[u8]) -> Result<(), TransactionError> {
        ensure!(
            !data.is_empty() && data.len() <= PAYLOAD_CAPACITY,
            TransactionErrorKind::IllegalArgument,
            "payload of {} bytes out of range [1, {}]",
            data.len(),
            PAYLOAD_CAPACITY
        );
        Ok(())
    }

    /// Enforce the prepare-time session rules for a command, including
    /// the modifications-buffer budget
    fn enqueue(&mut self, command: Box<dyn CardCommand>) -> Result<(), TransactionError> {
        let in_session = self.session_planned || self.session.is_open();
        if command.uses_session_buffer() {
            if !in_session && self.crypto.is_some() {
                fail!(
                    TransactionErrorKind::IllegalState,
                    "{} modifies the card outside a planned secure session",
                    command.command_ref().name()
                );
            }
            if in_session && !self.session.try_consume_buffer(command.session_buffer_weight()) {
                fail!(
                    TransactionErrorKind::UnexpectedCommandStatus {
                        kind: ProtocolErrorKind::SessionBufferOverflow,
                    },
                    "{} would overflow the session modifications buffer",
                    command.command_ref().name()
                );
            }
        }
        self.queue.push(command);
        Ok(())
    }

    /// Plan the opening of a secure session at `write_access_level`
    pub fn prepare_open_secure_session(
        &mut self,
        write_access_level: WriteAccessLevel,
    ) -> Result<(), TransactionError> {
        self.prepare_open_secure_session_reading(write_access_level, 0, 0)
    }

    /// Plan the opening of a secure session, atomically reading
    /// `record` of the EF at `sfi` (0/0 to read nothing)
    pub fn prepare_open_secure_session_reading(
        &mut self,
        write_access_level: WriteAccessLevel,
        sfi: u8,
        record: u8,
    ) -> Result<(), TransactionError> {
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "a secure session requires a crypto provider"
        );
        ensure!(
            !self.session_planned && !self.session.is_open(),
            TransactionErrorKind::IllegalState,
            "a secure session is already open or planned"
        );
        Self::check_sfi(sfi)?;
        if record > 0 {
            Self::check_record(record)?;
        }

        let pre_open_mode = self.card.pre_open_write_access_level() == Some(write_access_level);
        let command = OpenSecureSessionCommand::new(
            write_access_level,
            sfi,
            record,
            self.card.is_extended_mode_supported(),
            pre_open_mode,
        );
        self.session.reset();
        self.session.plan_buffer(
            self.card.modifications_counter(),
            self.card.is_modifications_counter_in_bytes(),
        );
        self.session_planned = true;
        self.queue.push(Box::new(command));
        Ok(())
    }

    /// Plan the closing of the session; with `ratify`, a ratification
    /// exchange follows the close
    pub fn prepare_close_secure_session(&mut self, ratify: bool) -> Result<(), TransactionError> {
        ensure!(
            self.session_planned || self.session.is_open(),
            TransactionErrorKind::IllegalState,
            "no secure session open or planned"
        );
        self.queue
            .push(Box::new(CloseSecureSessionCommand::new(ratify)));
        if ratify {
            self.queue.push(Box::new(RatificationCommand::new()));
        }
        self.session_planned = false;
        Ok(())
    }

    /// Plan the cancellation of the session: the card image is
    /// reverted and the card session is aborted without authentication
    pub fn prepare_cancel_secure_session(&mut self) -> Result<(), TransactionError> {
        ensure!(
            self.session_planned || self.session.is_open(),
            TransactionErrorKind::IllegalState,
            "no secure session open or planned"
        );
        self.queue.push(Box::new(AbortSecureSessionCommand::new()));
        self.session_planned = false;
        Ok(())
    }

    /// Read one record
    pub fn prepare_read_record(&mut self, sfi: u8, record: u8) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_record(record)?;
        self.enqueue(Box::new(ReadRecordsCommand::new(
            sfi,
            record,
            ReadMode::OneRecord,
            0,
        )))
    }

    /// Read every record from `first_record` onwards;
    /// `expected_length` sizes the response (`0` lets the card decide)
    pub fn prepare_read_records(
        &mut self,
        sfi: u8,
        first_record: u8,
        expected_length: u8,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_record(first_record)?;
        self.enqueue(Box::new(ReadRecordsCommand::new(
            sfi,
            first_record,
            ReadMode::MultipleRecord,
            expected_length,
        )))
    }

    /// Read the same `offset`/`length` window from successive records
    pub fn prepare_read_record_multiple(
        &mut self,
        sfi: u8,
        first_record: u8,
        offset: u8,
        length: u8,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_record(first_record)?;
        self.enqueue(Box::new(ReadRecordMultipleCommand::new(
            sfi,
            first_record,
            offset,
            length,
        )))
    }

    /// Read `length` bytes at `offset` of a binary EF, splitting into
    /// as many exchanges as needed
    pub fn prepare_read_binary(
        &mut self,
        sfi: u8,
        offset: usize,
        length: usize,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        ensure!(
            length > 0,
            TransactionErrorKind::IllegalArgument,
            "nothing to read"
        );
        ensure!(
            offset + length - 1 <= MAX_BINARY_OFFSET,
            TransactionErrorKind::IllegalArgument,
            "binary read [{}, {}) beyond offset {}",
            offset,
            offset + length,
            MAX_BINARY_OFFSET
        );

        // Selection restriction: addressing by SFI only carries an
        // 8-bit offset, so make the EF current with a 1-byte read
        // first
        if sfi > 0 && offset > 255 {
            self.enqueue(Box::new(ReadBinaryCommand::new(sfi, 0, 1)))?;
        }

        let mut remaining = length;
        let mut position = offset;
        while remaining > 0 {
            let slice = if remaining > PAYLOAD_CAPACITY {
                PAYLOAD_CAPACITY
            } else {
                remaining
            };
            self.enqueue(Box::new(ReadBinaryCommand::new(
                sfi,
                position as u16,
                slice as u8,
            )))?;
            position += slice;
            remaining -= slice;
        }
        Ok(())
    }

    /// Replace the content of one record
    pub fn prepare_update_record(
        &mut self,
        sfi: u8,
        record: u8,
        data: &[u8],
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_record(record)?;
        Self::check_payload(data)?;
        self.enqueue(Box::new(UpdateRecordCommand::new(sfi, record, data.to_vec())))
    }

    /// OR data on top of one record
    pub fn prepare_write_record(
        &mut self,
        sfi: u8,
        record: u8,
        data: &[u8],
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_record(record)?;
        Self::check_payload(data)?;
        self.enqueue(Box::new(WriteRecordCommand::new(sfi, record, data.to_vec())))
    }

    /// Insert a record at the head of a cyclic EF
    pub fn prepare_append_record(&mut self, sfi: u8, data: &[u8]) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        Self::check_payload(data)?;
        self.enqueue(Box::new(AppendRecordCommand::new(sfi, data.to_vec())))
    }

    /// Write `data` at `offset` of a binary EF, splitting into as many
    /// exchanges as needed
    pub fn prepare_update_binary(
        &mut self,
        sfi: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<(), TransactionError> {
        self.prepare_binary_write(BinaryWriteMode::Update, sfi, offset, data)
    }

    /// OR `data` at `offset` of a binary EF
    pub fn prepare_write_binary(
        &mut self,
        sfi: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<(), TransactionError> {
        self.prepare_binary_write(BinaryWriteMode::Write, sfi, offset, data)
    }

    fn prepare_binary_write(
        &mut self,
        mode: BinaryWriteMode,
        sfi: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        ensure!(
            !data.is_empty(),
            TransactionErrorKind::IllegalArgument,
            "nothing to write"
        );
        ensure!(
            offset + data.len() - 1 <= MAX_BINARY_OFFSET,
            TransactionErrorKind::IllegalArgument,
            "binary write [{}, {}) beyond offset {}",
            offset,
            offset + data.len(),
            MAX_BINARY_OFFSET
        );

        if sfi > 0 && offset > 255 {
            self.enqueue(Box::new(ReadBinaryCommand::new(sfi, 0, 1)))?;
        }

        let mut position = offset;
        for slice in data.chunks(PAYLOAD_CAPACITY) {
            self.enqueue(Box::new(UpdateOrWriteBinaryCommand::new(
                mode,
                sfi,
                position as u16,
                slice.to_vec(),
            )))?;
            position += slice.len();
        }
        Ok(())
    }

    /// Add `increment` to a counter
    pub fn prepare_increase_counter(
        &mut self,
        sfi: u8,
        counter: u8,
        increment: u32,
    ) -> Result<(), TransactionError> {
        self.prepare_counter_step(false, sfi, counter, increment)
    }

    /// Subtract `decrement` from a counter
    pub fn prepare_decrease_counter(
        &mut self,
        sfi: u8,
        counter: u8,
        decrement: u32,
    ) -> Result<(), TransactionError> {
        self.prepare_counter_step(true, sfi, counter, decrement)
    }

    fn prepare_counter_step(
        &mut self,
        decrease: bool,
        sfi: u8,
        counter: u8,
        value: u32,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        ensure!(
            counter >= 1 && counter <= MAX_COUNTER_NUMBER,
            TransactionErrorKind::IllegalArgument,
            "counter number {} out of range [1, {}]",
            counter,
            MAX_COUNTER_NUMBER
        );
        ensure!(
            value <= MAX_COUNTER_VALUE,
            TransactionErrorKind::IllegalArgument,
            "counter delta {} beyond 24 bits",
            value
        );
        self.enqueue(Box::new(IncreaseDecreaseCommand::new(
            decrease, sfi, counter, value,
        )))
    }

    /// Add one delta per counter in a single command
    pub fn prepare_increase_counters(
        &mut self,
        sfi: u8,
        deltas: &BTreeMap<u8, u32>,
    ) -> Result<(), TransactionError> {
        self.prepare_counter_steps(false, sfi, deltas)
    }

    /// Subtract one delta per counter in a single command
    pub fn prepare_decrease_counters(
        &mut self,
        sfi: u8,
        deltas: &BTreeMap<u8, u32>,
    ) -> Result<(), TransactionError> {
        self.prepare_counter_steps(true, sfi, deltas)
    }

    fn prepare_counter_steps(
        &mut self,
        decrease: bool,
        sfi: u8,
        deltas: &BTreeMap<u8, u32>,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(sfi)?;
        ensure!(
            !deltas.is_empty() && deltas.len() * 4 <= PAYLOAD_CAPACITY,
            TransactionErrorKind::IllegalArgument,
            "{} counters do not fit one command",
            deltas.len()
        );
        for (&counter, &value) in deltas {
            ensure!(
                counter >= 1 && counter <= MAX_COUNTER_NUMBER,
                TransactionErrorKind::IllegalArgument,
                "counter number {} out of range [1, {}]",
                counter,
                MAX_COUNTER_NUMBER
            );
            ensure!(
                value <= MAX_COUNTER_VALUE,
                TransactionErrorKind::IllegalArgument,
                "counter delta {} beyond 24 bits",
                value
            );
        }
        self.enqueue(Box::new(IncreaseDecreaseMultipleCommand::new(
            decrease,
            sfi,
            deltas.clone(),
        )))
    }

    /// Search records for a masked pattern; results are written back
    /// into `data`
    pub fn prepare_search_record_multiple(
        &mut self,
        data: &Rc<RefCell<SearchCommandData>>,
    ) -> Result<(), TransactionError> {
        Self::check_sfi(data.borrow().sfi)?;
        Self::check_record(data.borrow().first_record)?;
        let command = SearchRecordMultipleCommand::new(Rc::clone(data))?;
        self.enqueue(Box::new(command))
    }

    /// Select a file and record its header in the image
    pub fn prepare_select_file(&mut self, target: SelectFileTarget) -> Result<(), TransactionError> {
        self.enqueue(Box::new(SelectFileCommand::new(target)))
    }

    /// Read a Get Data object into the image
    pub fn prepare_get_data(&mut self, tag: GetDataTag) -> Result<(), TransactionError> {
        self.enqueue(Box::new(GetDataCommand::new(tag)))
    }

    /// Ask the card for a fresh challenge (enciphered PIN / key change)
    pub fn prepare_get_challenge(&mut self) -> Result<(), TransactionError> {
        self.enqueue(Box::new(GetChallengeCommand::new()))
    }

    /// Present the PIN in plain
    pub fn prepare_verify_pin_plain(&mut self, pin: &[u8]) -> Result<(), TransactionError> {
        self.check_pin_feature()?;
        let command = VerifyPinCommand::new(pin, false, 0, 0)?;
        self.enqueue(Box::new(command))
    }

    /// Present the PIN enciphered against the card challenge (a Get
    /// Challenge must have been processed first)
    pub fn prepare_verify_pin_encrypted(
        &mut self,
        pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<(), TransactionError> {
        self.check_pin_feature()?;
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "enciphered PIN presentation requires a crypto provider"
        );
        let command = VerifyPinCommand::new(pin, true, kif, kvc)?;
        self.enqueue(Box::new(command))
    }

    /// Read the PIN presentation counter without presenting anything
    pub fn prepare_read_pin_counter(&mut self) -> Result<(), TransactionError> {
        self.check_pin_feature()?;
        self.enqueue(Box::new(VerifyPinCommand::read_counter()))
    }

    /// Replace the PIN, transmitted in plain
    pub fn prepare_change_pin_plain(&mut self, new_pin: &[u8]) -> Result<(), TransactionError> {
        self.check_pin_feature()?;
        let command = ChangePinCommand::new(&[], new_pin, false, 0, 0)?;
        self.enqueue(Box::new(command))
    }

    /// Replace the PIN, transmitted as a cipher block over the current
    /// and new PIN
    pub fn prepare_change_pin_encrypted(
        &mut self,
        current_pin: &[u8],
        new_pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<(), TransactionError> {
        self.check_pin_feature()?;
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "enciphered PIN modification requires a crypto provider"
        );
        let command = ChangePinCommand::new(current_pin, new_pin, true, kif, kvc)?;
        self.enqueue(Box::new(command))
    }

    fn check_pin_feature(&self) -> Result<(), TransactionError> {
        ensure!(
            self.card.is_pin_feature_available(),
            TransactionErrorKind::UnsupportedOperation,
            "the card has no PIN"
        );
        Ok(())
    }

    /// Replace one of the DF session keys (a Get Challenge must have
    /// been processed first)
    pub fn prepare_change_key(
        &mut self,
        key_index: u8,
        issuer_kif: u8,
        issuer_kvc: u8,
        target_kif: u8,
        target_kvc: u8,
    ) -> Result<(), TransactionError> {
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "a key change requires a crypto provider"
        );
        let command =
            ChangeKeyCommand::new(key_index, issuer_kif, issuer_kvc, target_kif, target_kvc)?;
        self.enqueue(Box::new(command))
    }

    /// Switch session encryption on (extended mode only)
    pub fn prepare_activate_encryption(&mut self) -> Result<(), TransactionError> {
        self.check_manage_session()?;
        self.enqueue(Box::new(ManageSecureSessionCommand::new(Some(true), false)))
    }

    /// Switch session encryption off (extended mode only)
    pub fn prepare_deactivate_encryption(&mut self) -> Result<(), TransactionError> {
        self.check_manage_session()?;
        self.enqueue(Box::new(ManageSecureSessionCommand::new(
            Some(false),
            false,
        )))
    }

    /// Authenticate both sides over the session digest so far
    /// (extended mode only)
    pub fn prepare_early_mutual_authentication(&mut self) -> Result<(), TransactionError> {
        self.check_manage_session()?;
        self.enqueue(Box::new(ManageSecureSessionCommand::new(None, true)))
    }

    fn check_manage_session(&self) -> Result<(), TransactionError> {
        ensure!(
            self.card.is_extended_mode_supported(),
            TransactionErrorKind::UnsupportedOperation,
            "Manage Secure Session requires the extended mode"
        );
        ensure!(
            self.session_planned || self.session.is_open(),
            TransactionErrorKind::IllegalState,
            "no secure session open or planned"
        );
        Ok(())
    }

    /// Read the Stored Value context ahead of `operation`
    pub fn prepare_sv_get(&mut self, operation: SvOperation) -> Result<(), TransactionError> {
        self.check_sv_feature()?;
        self.enqueue(Box::new(SvGetCommand::new(
            operation,
            self.card.is_extended_mode_supported(),
        )))
    }

    /// Credit the Stored Value balance
    pub fn prepare_sv_reload(
        &mut self,
        amount: i32,
        date: [u8; 2],
        time: [u8; 2],
        free: [u8; 2],
    ) -> Result<(), TransactionError> {
        self.check_sv_feature()?;
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "SV operations require a crypto provider"
        );
        let command = SvReloadCommand::new(
            amount,
            date,
            time,
            free,
            self.card.is_extended_mode_supported(),
        )?;
        self.enqueue(Box::new(command))
    }

    /// Debit the Stored Value balance (`SvAction::Do`) or cancel a
    /// debit (`SvAction::Undo`)
    pub fn prepare_sv_debit(
        &mut self,
        action: SvAction,
        amount: i32,
        date: [u8; 2],
        time: [u8; 2],
    ) -> Result<(), TransactionError> {
        self.check_sv_feature()?;
        ensure!(
            self.crypto.is_some(),
            TransactionErrorKind::IllegalState,
            "SV operations require a crypto provider"
        );
        let command = SvDebitCommand::new(
            action,
            amount,
            date,
            time,
            self.card.is_extended_mode_supported(),
        )?;
        self.enqueue(Box::new(command))
    }

    fn check_sv_feature(&self) -> Result<(), TransactionError> {
        ensure!(
            self.card.is_sv_feature_available(),
            TransactionErrorKind::UnsupportedOperation,
            "the card has no Stored Value application"
        );
        Ok(())
    }

    /// Invalidate the current DF
    pub fn prepare_invalidate(&mut self) -> Result<(), TransactionError> {
        self.enqueue(Box::new(InvalidateRehabilitateCommand::invalidate()))
    }

    /// Rehabilitate the current DF
    pub fn prepare_rehabilitate(&mut self) -> Result<(), TransactionError> {
        self.enqueue(Box::new(InvalidateRehabilitateCommand::rehabilitate()))
    }

    //
    // Process
    //

    /// Finalise, transmit and parse every queued command, in order.
    ///
    /// On error the remaining queue is dropped and an open session is
    /// aborted with the card image restored.
    pub fn process_commands(
        &mut self,
        channel_control: ChannelControl,
    ) -> Result<(), TransactionError> {
        let queue = mem::replace(&mut self.queue, Vec::new());
        let result = self.process_queue(queue, channel_control);
        if result.is_err() {
            self.queue.clear();
            self.session_planned = false;
            if self.session.is_open() {
                self.abort_session_after_error();
            }
        }
        result
    }

    fn process_queue(
        &mut self,
        queue: Vec<Box<dyn CardCommand>>,
        channel_control: ChannelControl,
    ) -> Result<(), TransactionError> {
        let total = queue.len();
        let mut batch: Vec<BatchEntry> = Vec::new();

        for (index, mut command) in queue.into_iter().enumerate() {
            let is_last = index + 1 == total;
            let strategy = ::command::crypto_strategy(
                &*command,
                self.session.is_open(),
                self.session.is_advance_synchronized(),
                &self.card,
            );
            let encrypted = self.session.is_open() && self.session.is_encryption_active();

            // A command whose finalisation needs the crypto provider
            // requires everything before it to be fully processed
            if (strategy == CryptoStrategy::NeedsCryptoNow || encrypted) && !batch.is_empty() {
                self.flush_batch(&mut batch, ChannelControl::KeepOpen)?;
            }

            let request = {
                let mut ctx =
                    Self::context(&mut self.card, &mut self.session, &mut self.crypto);
                command.finalize_request(&mut ctx)?
            };
            debug!(
                "[{}] > uuid={} apdu={}",
                command.command_ref().name(),
                request.uuid(),
                to_hex(request.bytes())
            );

            if self.session.is_open() && self.session.is_encryption_active() {
                let channel = if is_last {
                    channel_control
                } else {
                    ChannelControl::KeepOpen
                };
                self.process_encrypted(command, request, channel)?;
                continue;
            }

            let in_session = self.session.is_open()
                && command.command_ref() != CardCommandRef::AbortSecureSession;

            let mut anticipated = None;
            if in_session {
                if strategy == CryptoStrategy::SynchronizeWithAnticipated {
                    match command.anticipated_response(&self.card) {
                        Some(response) => {
                            self.update_session_mac(request.bytes())?;
                            self.update_session_mac(response.bytes())?;
                            anticipated = Some(response);
                        }
                        None => self.session.degrade_synchronization(),
                    }
                } else {
                    // Anything whose response cannot be anticipated
                    // latches the session to post-response feeding
                    self.session.degrade_synchronization();
                }
            }

            let mac_pending = in_session && anticipated.is_none();
            let needs_own_exchange = strategy == CryptoStrategy::NeedsCryptoNow;
            batch.push(BatchEntry {
                command,
                request,
                anticipated,
                mac_pending,
            });

            // Exchange crypto-finalised commands on their own so that
            // anything queued after them sees their effects
            if needs_own_exchange {
                let channel = if is_last {
                    channel_control
                } else {
                    ChannelControl::KeepOpen
                };
                self.flush_batch(&mut batch, channel)?;
            }
        }

        if !batch.is_empty() {
            self.flush_batch(&mut batch, channel_control)?;
        }
        Ok(())
    }

    /// Exchange and parse one command under active session encryption
    fn process_encrypted(
        &mut self,
        mut command: Box<dyn CardCommand>,
        mut request: ApduRequest,
        channel_control: ChannelControl,
    ) -> Result<(), TransactionError> {
        let ciphered = self.update_session_mac(request.bytes())?;
        match ciphered {
            Some(bytes) => request.set_bytes(bytes),
            None => fail!(
                TransactionErrorKind::Crypto,
                "the crypto provider returned no ciphered APDU with encryption active"
            ),
        }

        let card_request = CardRequest::new(vec![request], true);
        let mut responses = self
            .transceiver
            .exchange(&card_request, channel_control)?
            .into_apdus();
        let response = match responses.pop() {
            Some(response) if responses.is_empty() => response,
            _ => fail!(
                TransactionErrorKind::InconsistentData,
                "one encrypted request, {} responses",
                responses.len() + 1
            ),
        };

        let deciphered = self.update_session_mac(response.bytes())?;
        let effective = match deciphered {
            Some(bytes) => ApduResponse::new(bytes)?,
            None => fail!(
                TransactionErrorKind::Crypto,
                "the crypto provider returned no deciphered APDU with encryption active"
            ),
        };

        debug!(
            "[{}] < apdu={}",
            command.command_ref().name(),
            to_hex(effective.bytes())
        );
        let mut ctx = Self::context(&mut self.card, &mut self.session, &mut self.crypto);
        command.parse_response(&effective, &mut ctx)
    }

    /// Transmit the pending batch as one card request and dispatch the
    /// responses
    fn flush_batch(
        &mut self,
        batch: &mut Vec<BatchEntry>,
        channel_control: ChannelControl,
    ) -> Result<(), TransactionError> {
        if batch.is_empty() {
            return Ok(());
        }

        let requests: Vec<ApduRequest> = batch.iter().map(|entry| entry.request.clone()).collect();
        let card_request = CardRequest::new(requests, true);
        let responses = self
            .transceiver
            .exchange(&card_request, channel_control)?
            .into_apdus();

        if responses.len() > batch.len() {
            fail!(
                TransactionErrorKind::InconsistentData,
                "{} responses for {} requests",
                responses.len(),
                batch.len()
            );
        }

        let expected = batch.len();
        let received = responses.len();
        let mut responses = responses.into_iter();

        for entry in batch.drain(..) {
            let BatchEntry {
                mut command,
                request,
                anticipated,
                mac_pending,
            } = entry;

            let response = match responses.next() {
                Some(response) => response,
                None => fail!(
                    TransactionErrorKind::InconsistentData,
                    "{} responses for {} requests",
                    received,
                    expected
                ),
            };
            debug!(
                "[{}] < apdu={}",
                command.command_ref().name(),
                to_hex(response.bytes())
            );

            if let Some(anticipated) = anticipated {
                // The session MAC already consumed the anticipated
                // response; the card must have produced the same bytes
                if response.bytes() != anticipated.bytes() {
                    fail!(
                        TransactionErrorKind::SessionContextViolation,
                        "{} answered {} where {} was anticipated",
                        command.command_ref().name(),
                        to_hex(response.bytes()),
                        to_hex(anticipated.bytes())
                    );
                }
            } else if mac_pending {
                self.update_session_mac(request.bytes())?;
                self.update_session_mac(response.bytes())?;
            }

            let mut ctx = Self::context(&mut self.card, &mut self.session, &mut self.crypto);
            command.parse_response(&response, &mut ctx)?;
        }
        Ok(())
    }

    fn update_session_mac(&mut self, apdu: &[u8]) -> Result<Option<Vec<u8>>, TransactionError> {
        match self.crypto {
            Some(ref mut crypto) => Ok(crypto.update_terminal_session_mac(apdu)?),
            None => fail!(
                TransactionErrorKind::IllegalState,
                "session MAC update without a crypto provider"
            ),
        }
    }

    /// Best-effort abort after a processing error: tell the card, then
    /// revert the image no matter what
    fn abort_session_after_error(&mut self) {
        warn!("aborting the secure session after a processing error");
        let mut command = AbortSecureSessionCommand::new();
        let request = {
            let mut ctx = Self::context(&mut self.card, &mut self.session, &mut self.crypto);
            command.finalize_request(&mut ctx)
        };
        if let Ok(request) = request {
            let card_request = CardRequest::new(vec![request], false);
            match self
                .transceiver
                .exchange(&card_request, ChannelControl::KeepOpen)
            {
                Ok(response) => {
                    if let Some(apdu) = response.apdus().first() {
                        let mut ctx =
                            Self::context(&mut self.card, &mut self.session, &mut self.crypto);
                        let _ = command.parse_response(apdu, &mut ctx);
                    }
                }
                Err(err) => warn!("abort exchange failed: {}", err),
            }
        }
        self.card.restore_files();
        self.session.abort();
    }
}
