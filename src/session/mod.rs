//! Secure-session state machine
//!
//! Tracks the session lifecycle, the ordering contract of the session
//! MAC, the encryption toggles, and the modifications-buffer budget.
//! The MAC itself lives in the crypto provider; this module decides
//! when each exchanged APDU is fed to it and in which form.
//!
//! ```text
//!     IDLE ──open──▶ OPEN ──(any command)──▶ OPEN
//!                     │ ▲                     │
//!          MSS(enc on)│ │MSS(enc off)         │
//!                     ▼ │                     │
//!                  OPEN+ENC                   │
//!                     │                       ▼
//!                     ├──────close──▶ CLOSING ──ratification──▶ CLOSED
//!                     └──────abort──▶ ABORTED (image restored)
//! ```

use card::WriteAccessLevel;

/// Lifecycle states of a secure session
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// No session open
    Idle,

    /// Session open, session MAC accumulating
    Open,

    /// Close Secure Session sent, ratification pending
    Closing,

    /// Session closed and mutually authenticated
    Closed,

    /// Session aborted, card image restored
    Aborted,
}

/// State machine of the (at most one) secure session of a transaction
#[derive(Clone, Debug)]
pub struct SecureSession {
    state: SessionState,
    encryption_active: bool,
    extended_mode: bool,
    write_access_level: Option<WriteAccessLevel>,
    pre_open_mode: bool,
    advance_synchronized: bool,
    modifications_used: usize,
    modifications_limit: usize,
    counter_in_bytes: bool,
    postponed_count: usize,
    sv_postponed_index: Option<usize>,
}

impl Default for SecureSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            encryption_active: false,
            extended_mode: false,
            write_access_level: None,
            pre_open_mode: false,
            advance_synchronized: false,
            modifications_used: 0,
            modifications_limit: 0,
            counter_in_bytes: true,
            postponed_count: 0,
            sv_postponed_index: None,
        }
    }
}

impl SecureSession {
    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Is the session open (MAC accumulating)?
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Is session encryption currently active?
    pub fn is_encryption_active(&self) -> bool {
        self.encryption_active
    }

    /// Does the open session run in extended mode?
    pub fn is_extended_mode(&self) -> bool {
        self.extended_mode
    }

    /// Write access level of the open session
    pub fn write_access_level(&self) -> Option<WriteAccessLevel> {
        self.write_access_level
    }

    /// Session MAC length: 4 bytes in compatibility mode, 8 in
    /// extended mode
    pub fn mac_length(&self) -> usize {
        if self.extended_mode {
            8
        } else {
            4
        }
    }

    /// Was the session opened against a pre-open context?
    pub fn is_pre_open_mode(&self) -> bool {
        self.pre_open_mode
    }

    /// Is the crypto service still synchronised in advance (every
    /// response so far anticipated)?
    pub fn is_advance_synchronized(&self) -> bool {
        self.advance_synchronized
    }

    /// Latch off advance synchronisation: from now on every response
    /// is fed to the MAC after it arrives. Never re-enabled within a
    /// session, so the digest stays linear.
    pub(crate) fn degrade_synchronization(&mut self) {
        self.advance_synchronized = false;
    }

    /// Configure the modifications-buffer budget ahead of the session
    /// opening, so that `prepare` calls can be accounted before the
    /// Open Secure Session command is actually processed
    pub(crate) fn plan_buffer(&mut self, modifications_limit: usize, counter_in_bytes: bool) {
        self.modifications_used = 0;
        self.modifications_limit = modifications_limit;
        self.counter_in_bytes = counter_in_bytes;
    }

    /// Enter the OPEN state
    pub(crate) fn open(
        &mut self,
        extended_mode: bool,
        write_access_level: WriteAccessLevel,
        pre_open_mode: bool,
    ) {
        debug!(
            "session open (extended: {}, pre-open: {}, buffer: {})",
            extended_mode, pre_open_mode, self.modifications_limit
        );
        self.state = SessionState::Open;
        self.encryption_active = false;
        self.extended_mode = extended_mode;
        self.write_access_level = Some(write_access_level);
        self.pre_open_mode = pre_open_mode;
        self.advance_synchronized = pre_open_mode;
        self.postponed_count = 0;
        self.sv_postponed_index = None;
    }

    /// Enter the CLOSING state (Close Secure Session transmitted)
    pub(crate) fn mark_closing(&mut self) {
        debug!("session closing");
        self.state = SessionState::Closing;
        self.encryption_active = false;
    }

    /// Enter the CLOSED state (card MAC verified, ratification done or
    /// left to deselect)
    pub(crate) fn mark_closed(&mut self) {
        debug!("session closed");
        self.state = SessionState::Closed;
    }

    /// Enter the ABORTED state; the caller restores the card image
    pub(crate) fn abort(&mut self) {
        debug!("session aborted");
        self.state = SessionState::Aborted;
        self.encryption_active = false;
    }

    /// Reset to IDLE so that a new session may be opened by the same
    /// transaction
    pub(crate) fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.encryption_active = false;
        self.extended_mode = false;
        self.write_access_level = None;
        self.pre_open_mode = false;
        self.advance_synchronized = false;
        self.modifications_used = 0;
        self.postponed_count = 0;
        self.sv_postponed_index = None;
    }

    pub(crate) fn set_encryption_active(&mut self, active: bool) {
        debug!("session encryption {}", if active { "on" } else { "off" });
        self.encryption_active = active;
    }

    /// Account for a session-buffer-using command. Returns `false`
    /// when the card's buffer quota would be exceeded.
    pub(crate) fn try_consume_buffer(&mut self, weight_bytes: usize) -> bool {
        let cost = if self.counter_in_bytes { weight_bytes } else { 1 };
        if self.modifications_used + cost > self.modifications_limit {
            return false;
        }
        self.modifications_used += cost;
        if self.modifications_limit - self.modifications_used < cost {
            debug!(
                "session buffer nearly full: {} of {} used",
                self.modifications_used, self.modifications_limit
            );
        }
        true
    }

    /// Register a postponed-data block produced by an SV operation;
    /// returns its index among the postponed blocks of the close
    /// response
    pub(crate) fn register_sv_postponed(&mut self) -> usize {
        let index = self.postponed_count;
        self.postponed_count += 1;
        self.sv_postponed_index = Some(index);
        index
    }

    /// Index of the postponed block carrying the SV signature, if an
    /// SV operation ran within the session
    pub fn sv_postponed_index(&self) -> Option<usize> {
        self.sv_postponed_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let mut session = SecureSession::default();
        assert_eq!(session.state(), SessionState::Idle);
        session.plan_buffer(430, true);
        session.open(false, WriteAccessLevel::Debit, false);
        assert!(session.is_open());
        assert_eq!(session.mac_length(), 4);
        session.mark_closing();
        assert_eq!(session.state(), SessionState::Closing);
        session.mark_closed();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn abort_deactivates_encryption() {
        let mut session = SecureSession::default();
        session.plan_buffer(430, true);
        session.open(true, WriteAccessLevel::Load, false);
        session.set_encryption_active(true);
        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(!session.is_encryption_active());
    }

    #[test]
    fn extended_mode_doubles_the_mac() {
        let mut session = SecureSession::default();
        session.plan_buffer(430, true);
        session.open(true, WriteAccessLevel::Debit, false);
        assert_eq!(session.mac_length(), 8);
    }

    #[test]
    fn buffer_accounting_in_bytes() {
        let mut session = SecureSession::default();
        session.plan_buffer(20, true);
        assert!(session.try_consume_buffer(10));
        assert!(session.try_consume_buffer(10));
        assert!(!session.try_consume_buffer(1));
    }

    #[test]
    fn buffer_accounting_in_commands() {
        let mut session = SecureSession::default();
        session.plan_buffer(2, false);
        assert!(session.try_consume_buffer(100));
        assert!(session.try_consume_buffer(200));
        assert!(!session.try_consume_buffer(1));
    }

    #[test]
    fn pre_open_session_starts_advance_synchronized() {
        let mut session = SecureSession::default();
        session.plan_buffer(430, true);
        session.open(false, WriteAccessLevel::Debit, true);
        assert!(session.is_advance_synchronized());
        session.degrade_synchronization();
        assert!(!session.is_advance_synchronized());
    }

    #[test]
    fn sv_postponed_registration() {
        let mut session = SecureSession::default();
        session.plan_buffer(430, true);
        session.open(false, WriteAccessLevel::Debit, false);
        assert_eq!(session.register_sv_postponed(), 0);
        assert_eq!(session.sv_postponed_index(), Some(0));
    }
}
