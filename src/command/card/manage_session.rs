//! Manage Secure Session
//!
//! Mid-session service command of the extended mode: toggles session
//! encryption and optionally performs an early mutual authentication
//! (the request carries an intermediate terminal MAC, the response the
//! card's, both over the session digest so far).

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6982,
            "Session not open in extended mode.",
            Some(ProtocolErrorKind::SecurityContext),
        )
        .with(
            0x6988,
            "Incorrect terminal session MAC.",
            Some(ProtocolErrorKind::SecurityData),
        );
}

/// Length of the mutual-authentication MACs
const SESSION_MAC_LENGTH: usize = 8;

/// Manage Secure Session command
pub struct ManageSecureSessionCommand {
    activate_encryption: Option<bool>,
    mutual_authentication: bool,
}

impl ManageSecureSessionCommand {
    /// Toggle encryption and/or request an early mutual
    /// authentication
    pub fn new(activate_encryption: Option<bool>, mutual_authentication: bool) -> Self {
        Self {
            activate_encryption,
            mutual_authentication,
        }
    }
}

impl CardCommand for ManageSecureSessionCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::ManageSecureSession
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
        if !ctx.session.is_extended_mode() || !ctx.card.is_manage_secure_session_authorized() {
            fail!(
                TransactionErrorKind::UnsupportedOperation,
                "Manage Secure Session requires an extended-mode session with the operation authorised by the card"
            );
        }
        let cla = ctx.card.card_class().to_u8();
        let mut p2 = 0x00;
        if self.mutual_authentication {
            p2 |= 0x01;
        }
        match self.activate_encryption {
            Some(true) => p2 |= 0x02,
            Some(false) => p2 |= 0x04,
            None => {}
        }

        let (data, le) = if self.mutual_authentication {
            let mac = ctx.crypto()?.generate_terminal_session_mac()?;
            if mac.len() != SESSION_MAC_LENGTH {
                fail!(
                    TransactionErrorKind::Crypto,
                    "intermediate terminal MAC is {} bytes (expected {})",
                    mac.len(),
                    SESSION_MAC_LENGTH
                );
            }
            (Some(mac), Some(0))
        } else {
            (None, None)
        };

        Ok(ApduRequest::new(
            cla,
            CardCommandRef::ManageSecureSession.instruction(),
            0x00,
            p2,
            data.as_ref().map(Vec::as_slice),
            le,
        )?
        .with_info("Manage Secure Session"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        if self.mutual_authentication {
            let data = response.data();
            if data.len() != SESSION_MAC_LENGTH {
                fail!(
                    TransactionErrorKind::UnexpectedCommandStatus {
                        kind: ProtocolErrorKind::UnexpectedResponseLength,
                    },
                    "card session MAC of {} bytes (expected {})",
                    data.len(),
                    SESSION_MAC_LENGTH
                );
            }
            if !ctx.crypto()?.is_card_session_mac_valid(data)? {
                fail!(
                    TransactionErrorKind::InvalidCardMac,
                    "early mutual authentication refused the card MAC"
                );
            }
        }

        match self.activate_encryption {
            Some(true) => {
                ctx.crypto()?.activate_encryption()?;
                ctx.session.set_encryption_active(true);
            }
            Some(false) => {
                ctx.crypto()?.deactivate_encryption()?;
                ctx.session.set_encryption_active(false);
            }
            None => {}
        }
        Ok(())
    }
}
