//! Symmetric-crypto provider contract
//!
//! The core never computes a MAC or a cipher itself: every cryptogram
//! of the secure session and of the Stored Value protocol is produced
//! and verified by an implementation of [`SymmetricCryptoProvider`].
//! The default implementation drives a SAM through the command library
//! of [`command::sam`](::command::sam); a software implementation can
//! be substituted for tests.
//!
//! The provider is stateful and exclusively owned by one transaction:
//! the session protocol is `init -> update* -> finalize` (or
//! `init -> computeSv -> verifySv`), never interleaved across
//! transactions.

pub mod sam;

pub use self::sam::SamCryptoProvider;

use error::{Error, ProtocolError};
use transceiver::TransceiverError;

/// Crypto provider errors
pub type CryptoError = Error<CryptoErrorKind>;

/// Kinds of crypto provider errors
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum CryptoErrorKind {
    /// The card session MAC does not verify
    #[fail(display = "invalid card MAC")]
    InvalidCardMac,

    /// The data needed to verify the card MAC is missing
    #[fail(display = "card MAC not verifiable")]
    CardMacNotVerifiable,

    /// Logic error in the provider (bad sequence, refused data)
    #[fail(display = "crypto error")]
    Crypto,

    /// Transport error on the way to the backing SAM
    #[fail(display = "crypto I/O error")]
    CryptoIo,
}

impl From<ProtocolError> for CryptoError {
    fn from(err: ProtocolError) -> Self {
        err!(CryptoErrorKind::Crypto, "{}", err)
    }
}

impl From<TransceiverError> for CryptoError {
    fn from(err: TransceiverError) -> Self {
        err!(CryptoErrorKind::CryptoIo, "{}", err)
    }
}

/// Data carrier for the security part of an SV Reload / Debit /
/// Undebit command.
///
/// The card command fills the request fields, the provider fills the
/// output fields (SAM serial number, SAM transaction number, terminal
/// SV MAC) which the command then splices into its APDU.
#[derive(Clone, Debug, Default)]
pub struct SvCommandSecurityData {
    sv_get_request: Vec<u8>,
    sv_get_response: Vec<u8>,
    sv_command_partial_request: Vec<u8>,
    serial_number: Vec<u8>,
    transaction_number: Vec<u8>,
    terminal_challenge: Vec<u8>,
    terminal_sv_mac: Vec<u8>,
}

impl SvCommandSecurityData {
    /// Set the header of the SV Get request this operation follows
    pub fn set_sv_get_request(&mut self, data: Vec<u8>) {
        self.sv_get_request = data;
    }

    /// Set the full SV Get response data
    pub fn set_sv_get_response(&mut self, data: Vec<u8>) {
        self.sv_get_response = data;
    }

    /// Set the SV operation request assembled so far (MAC-covered part)
    pub fn set_sv_command_partial_request(&mut self, data: Vec<u8>) {
        self.sv_command_partial_request = data;
    }

    /// SV Get request header
    pub fn sv_get_request(&self) -> &[u8] {
        &self.sv_get_request
    }

    /// SV Get response data
    pub fn sv_get_response(&self) -> &[u8] {
        &self.sv_get_response
    }

    /// Partial SV operation request
    pub fn sv_command_partial_request(&self) -> &[u8] {
        &self.sv_command_partial_request
    }

    /// Set by the provider: serial number of the SAM
    pub fn set_serial_number(&mut self, data: Vec<u8>) {
        self.serial_number = data;
    }

    /// Set by the provider: SAM transaction number (3 bytes)
    pub fn set_transaction_number(&mut self, data: Vec<u8>) {
        self.transaction_number = data;
    }

    /// Set by the provider: terminal challenge, when one is used
    pub fn set_terminal_challenge(&mut self, data: Vec<u8>) {
        self.terminal_challenge = data;
    }

    /// Set by the provider: terminal SV MAC (5 or 10 bytes)
    pub fn set_terminal_sv_mac(&mut self, data: Vec<u8>) {
        self.terminal_sv_mac = data;
    }

    /// SAM serial number (4 bytes)
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    /// SAM transaction number (3 bytes)
    pub fn transaction_number(&self) -> &[u8] {
        &self.transaction_number
    }

    /// Terminal challenge
    pub fn terminal_challenge(&self) -> &[u8] {
        &self.terminal_challenge
    }

    /// Terminal SV MAC (5 or 10 bytes)
    pub fn terminal_sv_mac(&self) -> &[u8] {
        &self.terminal_sv_mac
    }
}

/// The symmetric-crypto contract consumed by the transaction.
///
/// Methods returning `Option<Vec<u8>>` yield the transformed APDU when
/// session encryption is active and `None` otherwise.
pub trait SymmetricCryptoProvider {
    /// Prepare the provider for a new secure session and return the
    /// terminal challenge (4 or 8 bytes) placed in Open Secure Session
    fn init_terminal_secure_session_context(&mut self) -> Result<Vec<u8>, CryptoError>;

    /// Prime the session digest with the Open Secure Session response
    /// data and the session key identifiers
    fn init_terminal_session_mac(
        &mut self,
        open_data_out: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<(), CryptoError>;

    /// Feed one exchanged APDU (alternately command and response) to
    /// the session digest. With encryption active, returns the
    /// ciphered command (resp. deciphered response).
    fn update_terminal_session_mac(&mut self, apdu: &[u8]) -> Result<Option<Vec<u8>>, CryptoError>;

    /// Close the digest and produce the terminal session MAC
    fn finalize_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError>;

    /// Produce an intermediate terminal session MAC for early mutual
    /// authentication (Manage Secure Session), without closing the
    /// digest
    fn generate_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError>;

    /// Turn session encryption on
    fn activate_encryption(&mut self) -> Result<(), CryptoError>;

    /// Turn session encryption off
    fn deactivate_encryption(&mut self) -> Result<(), CryptoError>;

    /// Verify the card's closing session MAC
    fn is_card_session_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError>;

    /// Fill the SAM identification and terminal SV MAC fields of an SV
    /// operation
    fn compute_sv_command_security_data(
        &mut self,
        data: &mut SvCommandSecurityData,
    ) -> Result<(), CryptoError>;

    /// Verify the card's SV operation MAC
    fn is_card_sv_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError>;

    /// Produce the 8-byte cipher block presented by Verify PIN in
    /// encrypted mode
    fn cipher_pin_for_presentation(
        &mut self,
        card_challenge: &[u8],
        pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Produce the cipher block (8 or 16 bytes) sent by Change PIN
    fn cipher_pin_for_modification(
        &mut self,
        card_challenge: &[u8],
        current_pin: &[u8],
        new_pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Produce the enciphered key payload (24 or 32 bytes) sent by
    /// Change Key
    fn generate_ciphered_card_key(
        &mut self,
        card_challenge: &[u8],
        issuer_kif: u8,
        issuer_kvc: u8,
        target_kif: u8,
        target_kvc: u8,
    ) -> Result<Vec<u8>, CryptoError>;
}
