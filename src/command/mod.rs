//! Command libraries
//!
//! One module per Calypso operation, for the card ([`card`]) and for
//! the SAM ([`sam`]). A command owns its request encoding, its
//! status-word table, the synthesis of its anticipated response when
//! one can be computed from the card image, and the decoding of its
//! response into the image.

pub mod card;
pub mod sam;

use apdu::{ApduRequest, ApduResponse};
use card::CalypsoCard;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError};

/// Identification of every card command
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CardCommandRef {
    /// Open Secure Session
    OpenSecureSession,
    /// Close Secure Session
    CloseSecureSession,
    /// Abort Secure Session
    AbortSecureSession,
    /// Manage Secure Session
    ManageSecureSession,
    /// Ratification (fake read)
    Ratification,
    /// Read Records
    ReadRecords,
    /// Read Record Multiple
    ReadRecordMultiple,
    /// Search Record Multiple
    SearchRecordMultiple,
    /// Read Binary
    ReadBinary,
    /// Update Record
    UpdateRecord,
    /// Write Record
    WriteRecord,
    /// Append Record
    AppendRecord,
    /// Update Binary
    UpdateBinary,
    /// Write Binary
    WriteBinary,
    /// Increase
    Increase,
    /// Decrease
    Decrease,
    /// Increase Multiple
    IncreaseMultiple,
    /// Decrease Multiple
    DecreaseMultiple,
    /// Select File
    SelectFile,
    /// Get Data
    GetData,
    /// Get Challenge
    GetChallenge,
    /// Verify PIN
    VerifyPin,
    /// Change PIN
    ChangePin,
    /// Change Key
    ChangeKey,
    /// SV Get
    SvGet,
    /// SV Reload
    SvReload,
    /// SV Debit
    SvDebit,
    /// SV Undebit
    SvUndebit,
    /// Invalidate
    Invalidate,
    /// Rehabilitate
    Rehabilitate,
}

impl CardCommandRef {
    /// Human-readable command name for traces and errors
    pub fn name(self) -> &'static str {
        match self {
            CardCommandRef::OpenSecureSession => "Open Secure Session",
            CardCommandRef::CloseSecureSession => "Close Secure Session",
            CardCommandRef::AbortSecureSession => "Abort Secure Session",
            CardCommandRef::ManageSecureSession => "Manage Secure Session",
            CardCommandRef::Ratification => "Ratification",
            CardCommandRef::ReadRecords => "Read Records",
            CardCommandRef::ReadRecordMultiple => "Read Record Multiple",
            CardCommandRef::SearchRecordMultiple => "Search Record Multiple",
            CardCommandRef::ReadBinary => "Read Binary",
            CardCommandRef::UpdateRecord => "Update Record",
            CardCommandRef::WriteRecord => "Write Record",
            CardCommandRef::AppendRecord => "Append Record",
            CardCommandRef::UpdateBinary => "Update Binary",
            CardCommandRef::WriteBinary => "Write Binary",
            CardCommandRef::Increase => "Increase",
            CardCommandRef::Decrease => "Decrease",
            CardCommandRef::IncreaseMultiple => "Increase Multiple",
            CardCommandRef::DecreaseMultiple => "Decrease Multiple",
            CardCommandRef::SelectFile => "Select File",
            CardCommandRef::GetData => "Get Data",
            CardCommandRef::GetChallenge => "Get Challenge",
            CardCommandRef::VerifyPin => "Verify PIN",
            CardCommandRef::ChangePin => "Change PIN",
            CardCommandRef::ChangeKey => "Change Key",
            CardCommandRef::SvGet => "SV Get",
            CardCommandRef::SvReload => "SV Reload",
            CardCommandRef::SvDebit => "SV Debit",
            CardCommandRef::SvUndebit => "SV Undebit",
            CardCommandRef::Invalidate => "Invalidate",
            CardCommandRef::Rehabilitate => "Rehabilitate",
        }
    }

    /// Instruction byte
    pub fn instruction(self) -> u8 {
        match self {
            CardCommandRef::OpenSecureSession => 0x8A,
            CardCommandRef::CloseSecureSession => 0x8E,
            CardCommandRef::AbortSecureSession => 0xB4,
            CardCommandRef::ManageSecureSession => 0x82,
            CardCommandRef::Ratification => 0xB2,
            CardCommandRef::ReadRecords => 0xB2,
            CardCommandRef::ReadRecordMultiple => 0xB3,
            CardCommandRef::SearchRecordMultiple => 0xA2,
            CardCommandRef::ReadBinary => 0xB0,
            CardCommandRef::UpdateRecord => 0xDC,
            CardCommandRef::WriteRecord => 0xD2,
            CardCommandRef::AppendRecord => 0xE2,
            CardCommandRef::UpdateBinary => 0xD6,
            CardCommandRef::WriteBinary => 0xD0,
            CardCommandRef::Increase => 0x32,
            CardCommandRef::Decrease => 0x30,
            CardCommandRef::IncreaseMultiple => 0x3A,
            CardCommandRef::DecreaseMultiple => 0x38,
            CardCommandRef::SelectFile => 0xA4,
            CardCommandRef::GetData => 0xCA,
            CardCommandRef::GetChallenge => 0x84,
            CardCommandRef::VerifyPin => 0x20,
            CardCommandRef::ChangePin => 0xD8,
            CardCommandRef::ChangeKey => 0xD8,
            CardCommandRef::SvGet => 0x7C,
            CardCommandRef::SvReload => 0xB8,
            CardCommandRef::SvDebit => 0xBA,
            CardCommandRef::SvUndebit => 0xBC,
            CardCommandRef::Invalidate => 0x04,
            CardCommandRef::Rehabilitate => 0x44,
        }
    }
}

/// How a command interacts with the crypto provider around its
/// transmission
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CryptoStrategy {
    /// No crypto provider interaction at all
    NoCrypto,

    /// Finalisation needs the provider (and therefore every earlier
    /// command must have been processed first)
    NeedsCryptoNow,

    /// In-session command whose real response is fed to the session
    /// MAC once it arrives
    SynchronizeLater,

    /// In-session command whose anticipated response is fed to the
    /// session MAC before transmission (pre-authenticated sessions)
    SynchronizeWithAnticipated,
}

/// The contract every card command implements
pub(crate) trait CardCommand {
    /// Which command this is
    fn command_ref(&self) -> CardCommandRef;

    /// The command's status-word table
    fn status_table(&self) -> &StatusTable;

    /// Does this command consume the session modifications buffer?
    fn uses_session_buffer(&self) -> bool {
        false
    }

    /// Session-buffer bytes this command will consume (data length
    /// plus the 6-byte overhead), when it uses the buffer
    fn session_buffer_weight(&self) -> usize {
        0
    }

    /// Does building the request require the crypto provider (terminal
    /// challenge, MAC, cipher block)?
    fn requires_crypto_to_finalize(&self) -> bool {
        false
    }

    /// Build the request APDU. Called exactly once.
    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError>;

    /// Synthesize the response this command is expected to produce,
    /// from the card image alone. `None` when it cannot be computed.
    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        let _ = card;
        None
    }

    /// Validate the status word and decode the response into the card
    /// image. Called exactly once.
    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError>;
}

/// Derive the pre-processing strategy of a queued command from its own
/// requirements and the session context
pub(crate) fn crypto_strategy(
    command: &dyn CardCommand,
    in_session: bool,
    advance_synchronized: bool,
    card: &CalypsoCard,
) -> CryptoStrategy {
    if command.requires_crypto_to_finalize() {
        return CryptoStrategy::NeedsCryptoNow;
    }
    if !in_session {
        return CryptoStrategy::NoCrypto;
    }
    if advance_synchronized && command.anticipated_response(card).is_some() {
        CryptoStrategy::SynchronizeWithAnticipated
    } else {
        CryptoStrategy::SynchronizeLater
    }
}

/// Append a success status word to data, forming an anticipated
/// response APDU
pub(crate) fn anticipated(data: &[u8]) -> ApduResponse {
    let mut bytes = data.to_vec();
    bytes.extend_from_slice(&[0x90, 0x00]);
    ApduResponse::new(bytes).unwrap_or_else(|_| unreachable!())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratification_shares_the_read_records_instruction() {
        assert_eq!(
            CardCommandRef::Ratification.instruction(),
            CardCommandRef::ReadRecords.instruction()
        );
    }

    #[test]
    fn anticipated_appends_success() {
        let response = anticipated(&[0x00, 0x01, 0x02]);
        assert_eq!(response.data(), &[0x00, 0x01, 0x02]);
        assert_eq!(response.status_word(), 0x9000);
    }
}
