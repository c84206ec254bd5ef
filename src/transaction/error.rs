//! Errors raised while orchestrating a transaction

use crypto::{CryptoError, CryptoErrorKind};
use error::{Error, ProtocolError, ProtocolErrorKind};
use transceiver::{TransceiverError, TransceiverErrorKind};

/// Transaction errors
pub type TransactionError = Error<TransactionErrorKind>;

/// Transaction error kinds
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum TransactionErrorKind {
    /// The number of responses does not match the number of requests
    #[fail(display = "inconsistent request/response count")]
    InconsistentData,

    /// Select File did not find the requested file
    #[fail(display = "file not found")]
    SelectFileError,

    /// A card response diverged from the anticipated response fed to
    /// the session MAC
    #[fail(display = "session context violation")]
    SessionContextViolation,

    /// The card or the SAM refused a command
    #[fail(display = "unexpected command status: {}", kind)]
    UnexpectedCommandStatus {
        /// The protocol-level error kind
        kind: ProtocolErrorKind,
    },

    /// Reader transport failure
    #[fail(display = "reader error: {}", kind)]
    ReaderIo {
        /// The transport error kind
        kind: TransceiverErrorKind,
    },

    /// The card's closing session MAC does not verify
    #[fail(display = "invalid card MAC")]
    InvalidCardMac,

    /// The data needed to verify a card MAC is missing
    #[fail(display = "card MAC not verifiable")]
    CardMacNotVerifiable,

    /// Logic error in the crypto provider
    #[fail(display = "crypto error")]
    Crypto,

    /// Transport failure between the provider and its SAM
    #[fail(display = "crypto I/O error")]
    CryptoIo,

    /// The operation is not allowed in the current transaction state
    #[fail(display = "illegal state")]
    IllegalState,

    /// The operation is not supported by the card or the session mode
    #[fail(display = "unsupported operation")]
    UnsupportedOperation,

    /// An argument is outside its legal range
    #[fail(display = "illegal argument")]
    IllegalArgument,
}

impl From<ProtocolError> for TransactionError {
    fn from(err: ProtocolError) -> Self {
        let kind = match err.kind() {
            ProtocolErrorKind::IllegalArgument => TransactionErrorKind::IllegalArgument,
            kind => TransactionErrorKind::UnexpectedCommandStatus { kind },
        };
        err!(kind, "{}", err)
    }
}

impl From<TransceiverError> for TransactionError {
    fn from(err: TransceiverError) -> Self {
        err!(TransactionErrorKind::ReaderIo { kind: err.kind() }, "{}", err)
    }
}

impl From<CryptoError> for TransactionError {
    fn from(err: CryptoError) -> Self {
        let kind = match err.kind() {
            CryptoErrorKind::InvalidCardMac => TransactionErrorKind::InvalidCardMac,
            CryptoErrorKind::CardMacNotVerifiable => TransactionErrorKind::CardMacNotVerifiable,
            CryptoErrorKind::Crypto => TransactionErrorKind::Crypto,
            CryptoErrorKind::CryptoIo => TransactionErrorKind::CryptoIo,
        };
        err!(kind, "{}", err)
    }
}
