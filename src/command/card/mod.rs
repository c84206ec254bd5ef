//! Card command set
//!
//! One module per Calypso card command. Every command implements
//! [`CardCommand`](::command::CardCommand): request encoding,
//! anticipated-response synthesis where the card image allows it,
//! response decoding into the image, and the crypto hooks of the
//! secure session.

pub mod append_record;
pub mod change_key;
pub mod change_pin;
pub mod close_session;
pub mod get_challenge;
pub mod get_data;
pub mod increase_decrease;
pub mod increase_decrease_multiple;
pub mod invalidate_rehabilitate;
pub mod manage_session;
pub mod open_session;
pub mod ratification;
pub mod read_binary;
pub mod read_record_multiple;
pub mod read_records;
pub mod search_record_multiple;
pub mod select_file;
pub mod sv_debit;
pub mod sv_get;
pub mod sv_reload;
pub mod update_binary;
pub mod update_record;
pub mod verify_pin;
pub mod write_record;

pub use self::append_record::AppendRecordCommand;
pub use self::change_key::ChangeKeyCommand;
pub use self::change_pin::ChangePinCommand;
pub use self::close_session::{AbortSecureSessionCommand, CloseSecureSessionCommand};
pub use self::get_challenge::GetChallengeCommand;
pub use self::get_data::{GetDataCommand, GetDataTag};
pub use self::increase_decrease::IncreaseDecreaseCommand;
pub use self::increase_decrease_multiple::IncreaseDecreaseMultipleCommand;
pub use self::invalidate_rehabilitate::InvalidateRehabilitateCommand;
pub use self::manage_session::ManageSecureSessionCommand;
pub use self::open_session::OpenSecureSessionCommand;
pub use self::ratification::RatificationCommand;
pub use self::read_binary::ReadBinaryCommand;
pub use self::read_record_multiple::ReadRecordMultipleCommand;
pub use self::read_records::{ReadMode, ReadRecordsCommand};
pub use self::search_record_multiple::{SearchCommandData, SearchRecordMultipleCommand};
pub use self::select_file::{SelectFileCommand, SelectFileTarget};
pub use self::sv_debit::{SvAction, SvDebitCommand};
pub use self::sv_get::{SvGetCommand, SvOperation};
pub use self::sv_reload::SvReloadCommand;
pub use self::update_binary::{BinaryWriteMode, UpdateOrWriteBinaryCommand};
pub use self::update_record::UpdateRecordCommand;
pub use self::verify_pin::VerifyPinCommand;
pub use self::write_record::WriteRecordCommand;

use error::ProtocolErrorKind;
use status::StatusTable;

/// Byte overhead charged to the session buffer per modifying command,
/// on top of its data field
pub(crate) const SESSION_BUFFER_OVERHEAD: usize = 6;

/// Base table shared by the card commands, on top of the global
/// default
pub(crate) fn base_status_table() -> StatusTable {
    StatusTable::base()
        .with(
            0x6700,
            "Lc value not supported.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6B00,
            "Incorrect P1 or P2.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6982,
            "Security conditions not fulfilled.",
            Some(ProtocolErrorKind::SecurityContext),
        )
        .with(
            0x6985,
            "Access forbidden.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
}

/// Overlay shared by the commands that consume the session buffer
pub(crate) fn session_buffer_overlay(table: StatusTable) -> StatusTable {
    table.with(
        0x6400,
        "Session modifications buffer overflow.",
        Some(ProtocolErrorKind::SessionBufferOverflow),
    )
}

/// Encode the P1/P2 pair addressing an offset in a binary EF: the SFI
/// rides in P1 when the offset fits one byte, otherwise the 15-bit
/// offset spans P1/P2 and the EF must be the current one
pub(crate) fn binary_offset_p1_p2(sfi: u8, offset: u16) -> (u8, u8) {
    if sfi > 0 && offset <= 255 {
        (0x80 | sfi, offset as u8)
    } else {
        (((offset >> 8) & 0x7F) as u8, (offset & 0xFF) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_addressing_by_sfi() {
        assert_eq!(binary_offset_p1_p2(0x07, 0x10), (0x87, 0x10));
    }

    #[test]
    fn binary_addressing_by_offset() {
        assert_eq!(binary_offset_p1_p2(0x00, 0x0123), (0x01, 0x23));
        assert_eq!(binary_offset_p1_p2(0x07, 0x0123), (0x01, 0x23));
    }
}
