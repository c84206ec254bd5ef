//! Status-word tables
//!
//! Every command owns an immutable table mapping each status word it can
//! receive to a human-readable message and an optional error kind. Tables
//! are composed at construction: the shared base table plus per-command
//! overlay entries (an overlay entry for an already-known SW wins).

use apdu::ApduResponse;
use error::{ProtocolError, ProtocolErrorKind};

/// What a given status word means for the command that received it
#[derive(Copy, Clone, Debug)]
pub struct StatusProperties {
    /// Human-readable message carried into the raised error
    pub info: &'static str,

    /// `None` marks the status as successful; otherwise the error kind
    /// raised for it
    pub error: Option<ProtocolErrorKind>,
}

/// Ordered status word to properties mapping
#[derive(Clone, Debug)]
pub struct StatusTable {
    entries: Vec<(u16, StatusProperties)>,
}

impl StatusTable {
    /// The table shared by every command: success plus the two
    /// instruction-level rejections
    pub fn base() -> Self {
        StatusTable { entries: Vec::new() }
            .with(0x9000, "Success.", None)
            .with(
                0x6D00,
                "Instruction unknown.",
                Some(ProtocolErrorKind::IllegalParameter),
            )
            .with(
                0x6E00,
                "Class not supported.",
                Some(ProtocolErrorKind::IllegalParameter),
            )
    }

    /// Add or override an entry
    pub fn with(mut self, sw: u16, info: &'static str, error: Option<ProtocolErrorKind>) -> Self {
        self.entries.push((sw, StatusProperties { info, error }));
        self
    }

    /// Look up a status word. The most recently added entry wins, so
    /// overlays shadow the base table.
    pub fn lookup(&self, sw: u16) -> Option<&StatusProperties> {
        self.entries
            .iter()
            .rev()
            .find(|&&(entry_sw, _)| entry_sw == sw)
            .map(|&(_, ref props)| props)
    }

    /// Is the given status word known and successful?
    pub fn is_successful(&self, sw: u16) -> bool {
        match self.lookup(sw) {
            Some(props) => props.error.is_none(),
            None => false,
        }
    }

    /// Validate a response against this table.
    ///
    /// An unknown SW raises `UnknownStatus`; a known failing SW raises its
    /// associated kind; a successful SW with a non-zero `Le` whose data
    /// length differs raises `UnexpectedResponseLength`.
    pub fn check(
        &self,
        command: &'static str,
        response: &ApduResponse,
        le: Option<u8>,
    ) -> Result<(), ProtocolError> {
        let sw = response.status_word();

        let props = match self.lookup(sw) {
            Some(props) => props,
            None => fail!(
                ProtocolErrorKind::UnknownStatus { sw },
                "{} returned an unexpected status word",
                command
            ),
        };

        if let Some(kind) = props.error {
            fail!(kind, "{} failed, SW=0x{:04X}: {}", command, sw, props.info);
        }

        if let Some(le) = le {
            if le != 0 && response.data().len() != le as usize {
                fail!(
                    ProtocolErrorKind::UnexpectedResponseLength,
                    "{} returned {} data bytes where Le={}",
                    command,
                    response.data().len(),
                    le
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use error::ProtocolErrorKind;

    fn response(bytes: &[u8]) -> ApduResponse {
        ApduResponse::new(bytes.to_vec()).unwrap()
    }

    #[test]
    fn base_table_accepts_9000() {
        assert!(StatusTable::base()
            .check("TEST", &response(&[0x90, 0x00]), None)
            .is_ok());
    }

    #[test]
    fn unknown_status_word_is_reported() {
        let err = StatusTable::base()
            .check("TEST", &response(&[0x6F, 0x42]), None)
            .unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::UnknownStatus { sw: 0x6F42 });
    }

    #[test]
    fn overlay_shadows_base_entry() {
        let table = StatusTable::base().with(
            0x9000,
            "Successful but suspicious.",
            Some(ProtocolErrorKind::SecurityData),
        );
        let err = table
            .check("TEST", &response(&[0x90, 0x00]), None)
            .unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::SecurityData);
    }

    #[test]
    fn failing_entry_raises_its_kind() {
        let table =
            StatusTable::base().with(0x6400, "Buffer full.", Some(ProtocolErrorKind::SessionBufferOverflow));
        let err = table
            .check("TEST", &response(&[0x64, 0x00]), None)
            .unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::SessionBufferOverflow);
    }

    #[test]
    fn le_mismatch_is_reported() {
        let err = StatusTable::base()
            .check("TEST", &response(&[0xAA, 0xBB, 0x90, 0x00]), Some(3))
            .unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::UnexpectedResponseLength);
    }

    #[test]
    fn le_zero_skips_the_length_check() {
        assert!(StatusTable::base()
            .check("TEST", &response(&[0xAA, 0xBB, 0x90, 0x00]), Some(0))
            .is_ok());
    }
}
