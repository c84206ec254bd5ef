//! **calypso**: pure Rust terminal-side client for Calypso contactless
//! smart cards
//!
//! This crate drives transactions with Calypso cards, optionally
//! authenticated by a companion SAM (Secure Application Module). It
//! covers the APDU codec of the card and SAM command sets, the secure
//! session protocol (running session MAC over every exchanged APDU,
//! optional mid-session encryption, mutual authentication at close),
//! and a transaction orchestrator with a prepare/process lifecycle.
//!
//! Physical reader access and the symmetric cryptography itself are
//! out of scope: the crate consumes an [`ApduTransceiver`] for I/O and
//! a [`SymmetricCryptoProvider`] for every MAC and cipher (the bundled
//! [`SamCryptoProvider`] drives a real SAM through a transceiver).
//!
//! # Example
//!
//! The following reads a record inside a secure session:
//!
//! ```no_build
//! extern crate calypso;
//! use calypso::{CalypsoCard, CardTransaction, ChannelControl, WriteAccessLevel};
//!
//! // `reader` and `sam_provider` implement the two external contracts
//! let card = CalypsoCard::from_fci(&fci_from_selection)?;
//! let mut transaction = CardTransaction::new(reader, card)
//!     .with_crypto_provider(sam_provider);
//!
//! transaction.prepare_open_secure_session(WriteAccessLevel::Debit)?;
//! transaction.prepare_read_record(0x07, 1)?;
//! transaction.prepare_close_secure_session(true)?;
//! transaction.process_commands(ChannelControl::CloseAfter)?;
//!
//! let record = transaction.card().ef_by_sfi(0x07).unwrap().data().content(1);
//! ```

#![crate_name = "calypso"]
#![crate_type = "rlib"]
#![deny(unsafe_code)]
#![warn(missing_docs, trivial_casts, trivial_numeric_casts)]
#![warn(unused_import_braces, unused_qualifications)]
#![doc(html_root_url = "https://docs.rs/calypso/0.3.0")]

#[macro_use]
extern crate bitflags;
extern crate byteorder;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate uuid;
extern crate zeroize;

/// Error types
#[macro_use]
pub mod error;

/// ISO 7816-4 APDU assembly and response splitting
pub mod apdu;

/// Status-word tables shared by the command sets
pub mod status;

/// Simple BER-TLV parsing for the FCI and file information
mod tlv;

/// Reader transport contract (the only I/O seam of the crate)
pub mod transceiver;

/// Thin selection filters for cards and SAMs
pub mod selection;

/// In-memory image of the selected card
pub mod card;

/// In-memory image of the companion SAM
pub mod sam;

/// Symmetric-crypto provider contract and its SAM-backed default
pub mod crypto;

/// Card and SAM command libraries
pub mod command;

/// Secure-session state machine
pub mod session;

/// Transaction orchestrator: prepare/process lifecycle
pub mod transaction;

pub use apdu::{ApduRequest, ApduResponse, CardClass};
pub use card::{
    CalypsoCard, DirectoryHeader, ElementaryFile, FileData, FileHeader, FileType, ProductType,
    StartupInfo, SvData, SvDebitLogRecord, SvLoadLogRecord, WriteAccessLevel,
};
pub use command::card::{
    GetDataTag, SearchCommandData, SelectFileTarget, SvAction, SvOperation,
};
pub use crypto::{
    CryptoError, CryptoErrorKind, SamCryptoProvider, SvCommandSecurityData,
    SymmetricCryptoProvider,
};
pub use error::{ProtocolError, ProtocolErrorKind};
pub use sam::LegacySam;
pub use selection::{CardSelector, SamProductType, SamSelector};
pub use session::SessionState;
pub use status::{StatusProperties, StatusTable};
pub use transaction::{CardTransaction, TransactionError, TransactionErrorKind};
pub use transceiver::{
    ApduTransceiver, CardRequest, CardResponse, ChannelControl, TransceiverError,
    TransceiverErrorKind,
};
