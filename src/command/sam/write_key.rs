//! Write Key
//!
//! Loads an enciphered key (produced by another SAM) into the SAM's
//! key store.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table()
        .with(
            0x6988,
            "Incorrect key cryptogram.",
            Some(ProtocolErrorKind::SecurityData),
        )
        .with(
            0x6A87,
            "Lc inconsistent with P1/P2.",
            Some(ProtocolErrorKind::IllegalParameter),
        );
}

/// Write Key command
#[derive(Clone, Debug)]
pub struct WriteKeyCommand {
    writing_mode: u8,
    key_reference: u8,
    key_data: Vec<u8>,
}

impl WriteKeyCommand {
    /// Load an enciphered key block. `writing_mode` and
    /// `key_reference` address the target slot per the SAM reference
    /// manual.
    pub fn new(writing_mode: u8, key_reference: u8, key_data: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            key_data.len() == 48 || key_data.len() == 80,
            ProtocolErrorKind::IllegalArgument,
            "key data is {} bytes (expected 48 or 80)",
            key_data.len()
        );
        Ok(Self {
            writing_mode,
            key_reference,
            key_data: key_data.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::WriteKey.instruction(),
            self.writing_mode,
            self.key_reference,
            Some(&self.key_data),
            None,
        )?
        .with_info("SAM Write Key"))
    }

    /// Validate the response
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::WriteKey.name(), response, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_data_length_is_checked() {
        assert!(WriteKeyCommand::new(0x80, 0x00, &[0u8; 48]).is_ok());
        assert!(WriteKeyCommand::new(0x80, 0x00, &[0u8; 80]).is_ok());
        assert!(WriteKeyCommand::new(0x80, 0x00, &[0u8; 64]).is_err());
    }
}
