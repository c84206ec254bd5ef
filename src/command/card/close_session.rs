//! Close Secure Session / Abort Secure Session
//!
//! Close places the terminal session MAC in its data field and gets
//! back the postponed data blocks followed by the card session MAC.
//! Abort is a bare instruction that accepts any status word and
//! unconditionally reverts the card image to the open-session
//! snapshot.

use apdu::{ApduRequest, ApduResponse};
use command::{CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = super::base_status_table()
        .with(
            0x6700,
            "Lc signatureLo not supported.",
            Some(ProtocolErrorKind::IllegalParameter),
        )
        .with(
            0x6985,
            "No session open.",
            Some(ProtocolErrorKind::AccessForbidden),
        )
        .with(
            0x6988,
            "Incorrect signatureLo.",
            Some(ProtocolErrorKind::SecurityData),
        );
}

/// Close Secure Session command
pub struct CloseSecureSessionCommand {
    ratification_asked: bool,
}

impl CloseSecureSessionCommand {
    /// Close the open session; with `ratification_asked` the card
    /// expects one more exchange to ratify
    pub fn new(ratification_asked: bool) -> Self {
        Self { ratification_asked }
    }

    /// Split the close response into postponed blocks (`len | payload`
    /// chunks) and the trailing card MAC
    fn split_postponed_blocks(
        data: &[u8],
        mac_length: usize,
    ) -> Result<(Vec<Vec<u8>>, &[u8]), TransactionError> {
        if data.len() < mac_length {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::DataOutOfBounds,
                },
                "close-session response of {} bytes is shorter than the {}-byte card MAC",
                data.len(),
                mac_length
            );
        }
        let (blocks_data, mac) = data.split_at(data.len() - mac_length);

        let mut blocks = Vec::new();
        let mut pos = 0;
        while pos < blocks_data.len() {
            let len = usize::from(blocks_data[pos]);
            pos += 1;
            if pos + len > blocks_data.len() {
                fail!(
                    TransactionErrorKind::UnexpectedCommandStatus {
                        kind: ProtocolErrorKind::DataOutOfBounds,
                    },
                    "postponed data block overruns the close-session response"
                );
            }
            blocks.push(blocks_data[pos..pos + len].to_vec());
            pos += len;
        }
        Ok((blocks, mac))
    }
}

impl CardCommand for CloseSecureSessionCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::CloseSecureSession
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
        let terminal_mac = ctx.crypto()?.finalize_terminal_session_mac()?;
        if terminal_mac.len() != ctx.session.mac_length() {
            fail!(
                TransactionErrorKind::Crypto,
                "terminal MAC is {} bytes where the session mode requires {}",
                terminal_mac.len(),
                ctx.session.mac_length()
            );
        }
        let cla = ctx.card.card_class().to_u8();
        let p1 = if self.ratification_asked { 0x80 } else { 0x00 };
        ctx.session.mark_closing();
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::CloseSecureSession.instruction(),
            p1,
            0x00,
            Some(&terminal_mac),
            Some(0),
        )?
        .with_info("Close Secure Session"))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;

        let mac_length = ctx.session.mac_length();
        let (blocks, card_mac) = Self::split_postponed_blocks(response.data(), mac_length)?;

        if !ctx.crypto()?.is_card_session_mac_valid(card_mac)? {
            fail!(
                TransactionErrorKind::InvalidCardMac,
                "card session MAC refused by the crypto provider"
            );
        }

        if let Some(index) = ctx.session.sv_postponed_index() {
            let block = match blocks.get(index) {
                Some(block) if !block.is_empty() => block.clone(),
                _ => fail!(
                    TransactionErrorKind::CardMacNotVerifiable,
                    "no postponed data block at index {} for the SV operation",
                    index
                ),
            };
            if !ctx.crypto()?.is_card_sv_mac_valid(&block)? {
                fail!(
                    TransactionErrorKind::InvalidCardMac,
                    "postponed card SV MAC refused by the crypto provider"
                );
            }
            ctx.card.set_sv_operation_signature(block);
        }

        // With a ratification exchange still to come the session stays
        // in the closing state until that exchange happens
        if !self.ratification_asked {
            ctx.session.mark_closed();
        }
        Ok(())
    }
}

/// Abort Secure Session command
pub struct AbortSecureSessionCommand;

impl AbortSecureSessionCommand {
    /// Abort the open session without authentication
    pub fn new() -> Self {
        AbortSecureSessionCommand
    }
}

impl CardCommand for AbortSecureSessionCommand {
    fn command_ref(&self) -> CardCommandRef {
        CardCommandRef::AbortSecureSession
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        Ok(ApduRequest::new(
            cla,
            CardCommandRef::AbortSecureSession.instruction(),
            0x00,
            0x00,
            None,
            Some(0),
        )?
        .with_info("Abort Secure Session")
        .accept_status(0x6985)
        .accept_status(0x6D00))
    }

    fn parse_response(
        &mut self,
        _response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        // Any status word is acceptable: the image is reverted no
        // matter what the card answered
        ctx.card.restore_files();
        ctx.session.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postponed_blocks_are_length_prefixed() {
        let data = [0x03, 0xAA, 0xBB, 0xCC, 0x01, 0xDD, 0x11, 0x22, 0x33, 0x44];
        let (blocks, mac) = CloseSecureSessionCommand::split_postponed_blocks(&data, 4).unwrap();
        assert_eq!(blocks, vec![vec![0xAA, 0xBB, 0xCC], vec![0xDD]]);
        assert_eq!(mac, &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn bare_mac_has_no_blocks() {
        let data = [0x11, 0x22, 0x33, 0x44];
        let (blocks, mac) = CloseSecureSessionCommand::split_postponed_blocks(&data, 4).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(mac, &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn truncated_block_is_refused() {
        let data = [0x05, 0xAA, 0x11, 0x22, 0x33, 0x44];
        assert!(CloseSecureSessionCommand::split_postponed_blocks(&data, 4).is_err());
    }

    #[test]
    fn response_shorter_than_the_mac_is_refused() {
        assert!(CloseSecureSessionCommand::split_postponed_blocks(&[0x11], 4).is_err());
    }
}
