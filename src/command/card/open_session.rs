//! Open Secure Session
//!
//! Opens the ratified session: P1 carries the record to read and the
//! key index of the write access level, P2 the SFI and the session
//! mode, the data field the terminal challenge obtained from the
//! crypto provider. The response yields the card challenge, the
//! ratification and Manage Secure Session flags, the session KIF/KVC
//! and optionally the requested record content.

use apdu::{ApduRequest, ApduResponse};
use card::{CalypsoCard, SessionFlags, WriteAccessLevel};
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6900,
            "Transaction counter at its limit.",
            Some(ProtocolErrorKind::Terminated),
        )
        .with(
            0x6981,
            "Wrong EF type.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A81,
            "Card blocked or invalidated.",
            Some(ProtocolErrorKind::Terminated),
        )
        .with(
            0x6A82,
            "File not found.",
            Some(ProtocolErrorKind::DataAccess),
        )
        .with(
            0x6A83,
            "Record not found.",
            Some(ProtocolErrorKind::DataAccess),
        );
}

/// KIF reported when a compatibility-mode card omits it from the
/// open-session response; the SAM resolves it from the KVC
const UNKNOWN_KIF: u8 = 0xFF;

/// Open Secure Session command
pub struct OpenSecureSessionCommand {
    write_access_level: WriteAccessLevel,
    sfi: u8,
    record_number: u8,
    extended_mode: bool,
    pre_open_mode: bool,
}

impl OpenSecureSessionCommand {
    /// Open a session at `write_access_level`, atomically reading
    /// `record_number` of the EF at `sfi` (0/0 to read nothing)
    pub fn new(
        write_access_level: WriteAccessLevel,
        sfi: u8,
        record_number: u8,
        extended_mode: bool,
        pre_open_mode: bool,
    ) -> Self {
        Self {
            write_access_level,
            sfi,
            record_number,
            extended_mode,
            pre_open_mode,
        }
    }

    /// Minimum response length carrying the flags byte and KIF/KVC
    fn full_header_length(&self) -> usize {
        self.challenge_length() + 3
    }

    /// Card challenge length: transaction counter plus random
    fn challenge_length(&self) -> usize {
        if self.extended_mode {
            8
        } else {
            7
        }
    }
}

impl CardCommand for OpenSecureSessionCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::OpenSecureSession
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn requires_crypto_to_finalize(&self) -> bool {
        true
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let challenge = ctx.crypto()?.init_terminal_secure_session_context()?;
        let cla = ctx.card.card_class().to_u8();
        let p1 = self.record_number * 8 + self.write_access_level.key_index();
        let p2 = self.sfi * 8 + if self.extended_mode { 2 } else { 1 };
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::OpenSecureSession.instruction(),
            p1,
            p2,
            Some(&challenge),
            Some(0),
        )?
        .with_info("Open Secure Session"))
    }

    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        if self.pre_open_mode {
            card.pre_open_data().map(anticipated)
        } else {
            None
        }
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        let data = response.data();

        if data.len() < self.challenge_length() {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "open-session response of {} bytes is shorter than the {}-byte card challenge",
                data.len(),
                self.challenge_length()
            );
        }

        let (ratified, manage_authorized, kif, kvc, record_data) =
            if data.len() < self.full_header_length() {
                // Compatibility-mode short form: challenge only
                if self.extended_mode {
                    fail!(
                        TransactionErrorKind::UnexpectedCommandStatus {
                            kind: ProtocolErrorKind::DataOutOfBounds,
                        },
                        "extended-mode open-session response misses the session flags"
                    );
                }
                (true, false, UNKNOWN_KIF, UNKNOWN_KIF, &[] as &[u8])
            } else {
                let offset = self.challenge_length();
                let flags = SessionFlags::from_bits_truncate(data[offset]);
                (
                    flags.contains(SessionFlags::RATIFIED),
                    flags.contains(SessionFlags::MANAGE_SECURE_SESSION),
                    data[offset + 1],
                    data[offset + 2],
                    &data[offset + 3..],
                )
            };

        ctx.card
            .set_open_session_info(ratified, manage_authorized, Some(kif), Some(kvc));

        if self.record_number > 0 && !record_data.is_empty() {
            ctx.card
                .set_record_content(self.sfi, self.record_number, record_data.to_vec());
        }

        ctx.crypto()?.init_terminal_session_mac(data, kif, kvc)?;

        ctx.session
            .open(self.extended_mode, self.write_access_level, self.pre_open_mode);
        ctx.card.backup_files();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1_encodes_record_and_key_index() {
        let command =
            OpenSecureSessionCommand::new(WriteAccessLevel::Debit, 0x07, 1, false, false);
        // p1 = 1 * 8 + 3, p2 = 7 * 8 + 1
        assert_eq!(
            (1 * 8 + WriteAccessLevel::Debit.key_index(), 0x07 * 8 + 1),
            (0x0B, 0x39)
        );
        assert_eq!(command.challenge_length(), 7);
    }

    #[test]
    fn extended_mode_uses_an_8_byte_challenge() {
        let command = OpenSecureSessionCommand::new(WriteAccessLevel::Load, 0, 0, true, false);
        assert_eq!(command.challenge_length(), 8);
        assert_eq!(command.full_header_length(), 11);
    }
}
