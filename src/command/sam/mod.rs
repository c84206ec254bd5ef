//! SAM command set
//!
//! These commands back the default symmetric-crypto provider: session
//! digest accumulation, SV cryptogram preparation and verification,
//! PIN and key ciphering, plus the administrative reads of the SAM
//! image. They all share the base status table extended per command.

pub mod card_cipher_pin;
pub mod card_generate_key;
pub mod digest;
pub mod get_challenge;
pub mod give_random;
pub mod pso_signature;
pub mod read_ceilings;
pub mod read_event_counter;
pub mod read_key_parameters;
pub mod select_diversifier;
pub mod sv_check;
pub mod sv_prepare;
pub mod unlock;
pub mod write_key;

pub use self::card_cipher_pin::{CardCipherPinCommand, PinCipheringMode};
pub use self::card_generate_key::CardGenerateKeyCommand;
pub use self::digest::{
    DigestAuthenticateCommand, DigestCloseCommand, DigestInitCommand,
    DigestInternalAuthenticateCommand, DigestUpdateCommand, DigestUpdateMultipleCommand,
};
pub use self::get_challenge::GetChallengeCommand;
pub use self::give_random::GiveRandomCommand;
pub use self::pso_signature::{PsoComputeSignatureCommand, PsoVerifySignatureCommand};
pub use self::read_ceilings::ReadCeilingsCommand;
pub use self::read_event_counter::ReadEventCounterCommand;
pub use self::read_key_parameters::ReadKeyParametersCommand;
pub use self::select_diversifier::SelectDiversifierCommand;
pub use self::sv_check::SvCheckCommand;
pub use self::sv_prepare::{SvPrepareCommand, SvPrepareOperation};
pub use self::unlock::UnlockCommand;
pub use self::write_key::WriteKeyCommand;

use error::ProtocolErrorKind;
use status::StatusTable;

/// Class byte of a SAM-C1 / S1Dx command APDU
pub const SAM_CLA: u8 = 0x80;

/// Identification of every SAM command
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamCommandRef {
    /// Select Diversifier
    SelectDiversifier,
    /// Get Challenge
    GetChallenge,
    /// Give Random
    GiveRandom,
    /// Digest Init
    DigestInit,
    /// Digest Update
    DigestUpdate,
    /// Digest Update Multiple
    DigestUpdateMultiple,
    /// Digest Close
    DigestClose,
    /// Digest Authenticate
    DigestAuthenticate,
    /// Digest Internal Authenticate
    DigestInternalAuthenticate,
    /// Unlock
    Unlock,
    /// Write Key
    WriteKey,
    /// Read Key Parameters
    ReadKeyParameters,
    /// Read Event Counter
    ReadEventCounter,
    /// Read Ceilings
    ReadCeilings,
    /// SV Check
    SvCheck,
    /// SV Prepare Load
    SvPrepareLoad,
    /// SV Prepare Debit
    SvPrepareDebit,
    /// SV Prepare Undebit
    SvPrepareUndebit,
    /// Card Cipher PIN
    CardCipherPin,
    /// Card Generate Key
    CardGenerateKey,
    /// PSO Compute Signature
    PsoComputeSignature,
    /// PSO Verify Signature
    PsoVerifySignature,
}

impl SamCommandRef {
    /// Human-readable command name for traces and errors
    pub fn name(self) -> &'static str {
        match self {
            SamCommandRef::SelectDiversifier => "Select Diversifier",
            SamCommandRef::GetChallenge => "Get Challenge",
            SamCommandRef::GiveRandom => "Give Random",
            SamCommandRef::DigestInit => "Digest Init",
            SamCommandRef::DigestUpdate => "Digest Update",
            SamCommandRef::DigestUpdateMultiple => "Digest Update Multiple",
            SamCommandRef::DigestClose => "Digest Close",
            SamCommandRef::DigestAuthenticate => "Digest Authenticate",
            SamCommandRef::DigestInternalAuthenticate => "Digest Internal Authenticate",
            SamCommandRef::Unlock => "Unlock",
            SamCommandRef::WriteKey => "Write Key",
            SamCommandRef::ReadKeyParameters => "Read Key Parameters",
            SamCommandRef::ReadEventCounter => "Read Event Counter",
            SamCommandRef::ReadCeilings => "Read Ceilings",
            SamCommandRef::SvCheck => "SV Check",
            SamCommandRef::SvPrepareLoad => "SV Prepare Load",
            SamCommandRef::SvPrepareDebit => "SV Prepare Debit",
            SamCommandRef::SvPrepareUndebit => "SV Prepare Undebit",
            SamCommandRef::CardCipherPin => "Card Cipher PIN",
            SamCommandRef::CardGenerateKey => "Card Generate Key",
            SamCommandRef::PsoComputeSignature => "PSO Compute Signature",
            SamCommandRef::PsoVerifySignature => "PSO Verify Signature",
        }
    }

    /// Instruction byte
    pub fn instruction(self) -> u8 {
        match self {
            SamCommandRef::SelectDiversifier => 0x14,
            SamCommandRef::GetChallenge => 0x84,
            SamCommandRef::GiveRandom => 0x86,
            SamCommandRef::DigestInit => 0x8A,
            SamCommandRef::DigestUpdate => 0x8C,
            SamCommandRef::DigestUpdateMultiple => 0x8C,
            SamCommandRef::DigestClose => 0x8E,
            SamCommandRef::DigestAuthenticate => 0x82,
            SamCommandRef::DigestInternalAuthenticate => 0x88,
            SamCommandRef::Unlock => 0x20,
            SamCommandRef::WriteKey => 0x1A,
            SamCommandRef::ReadKeyParameters => 0xBC,
            SamCommandRef::ReadEventCounter => 0xBE,
            SamCommandRef::ReadCeilings => 0xB8,
            SamCommandRef::SvCheck => 0x58,
            SamCommandRef::SvPrepareLoad => 0x56,
            SamCommandRef::SvPrepareDebit => 0x54,
            SamCommandRef::SvPrepareUndebit => 0x5C,
            SamCommandRef::CardCipherPin => 0x12,
            SamCommandRef::CardGenerateKey => 0x12,
            SamCommandRef::PsoComputeSignature => 0x2A,
            SamCommandRef::PsoVerifySignature => 0x2A,
        }
    }
}

/// Base table shared by the SAM commands, on top of the global default
pub(crate) fn base_status_table() -> StatusTable {
    StatusTable::base()
        .with(
            0x6700,
            "Incorrect Lc.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6985,
            "Preconditions not satisfied.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
        .with(
            0x6A00,
            "Incorrect P1 or P2.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6A80,
            "Incorrect incoming data.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6A83,
            "Record not found.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6B00,
            "Incorrect P1 or P2.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
}
