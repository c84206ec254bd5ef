//! ISO 7816-4 Application Protocol Data Units (APDUs)
//!
//! Calypso commands are exchanged as short APDUs:
//! `CLA | INS | P1 | P2 | [Lc | data] | [Le]` for requests and
//! `[data] | SW1 | SW2` for responses.

use byteorder::{BigEndian, ByteOrder};
use uuid::Uuid;

use error::{ProtocolError, ProtocolErrorKind::IllegalArgument};

/// Maximum data field length of a short APDU
pub const MAX_DATA_SIZE: usize = 255;

/// Usable payload capacity of a single Calypso APDU
pub const PAYLOAD_CAPACITY: usize = 250;

/// Class byte of a Calypso command APDU
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CardClass {
    /// ISO class byte, used by every card of the current product lines
    Iso = 0x00,

    /// Proprietary class byte of the legacy product line
    Legacy = 0x94,

    /// Proprietary class byte of legacy cards for Stored Value commands
    LegacyStoredValue = 0xFA,
}

impl CardClass {
    /// Serialize this class byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A single command APDU, assembled once and sent at most once.
///
/// The case (1 to 4) is derived from the presence of the data and `Le`
/// fields, per ISO 7816-4:
///
/// * no data, no `Le`: case 1 — header only
/// * no data, `Le`: case 2 — header and `Le`
/// * data, no `Le`: case 3 — header, `Lc` and data
/// * data and `Le`: case 4 — header, `Lc`, data and `Le`
#[derive(Clone, Debug)]
pub struct ApduRequest {
    /// UUID which uniquely identifies this APDU in traces
    uuid: Uuid,

    /// The assembled APDU bytes
    apdu: Vec<u8>,

    /// Expected response data length, if any (`0` lets the card decide)
    le: Option<u8>,

    /// Status words accepted as successful in addition to `9000`
    successful_statuses: Vec<u16>,

    /// Short human-readable label used in traces
    info: Option<&'static str>,
}

impl ApduRequest {
    /// Assemble an APDU from its fields. Fails when the data field
    /// exceeds 255 bytes.
    pub fn new(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: Option<&[u8]>,
        le: Option<u8>,
    ) -> Result<Self, ProtocolError> {
        let mut apdu = Vec::with_capacity(4 + 1 + data.map(<[u8]>::len).unwrap_or(0) + 1);
        apdu.extend_from_slice(&[cla, ins, p1, p2]);

        if let Some(data) = data {
            ensure!(
                data.len() <= MAX_DATA_SIZE,
                IllegalArgument,
                "APDU data field too long: {} bytes (max {})",
                data.len(),
                MAX_DATA_SIZE
            );
            apdu.push(data.len() as u8);
            apdu.extend_from_slice(data);
        }

        if let Some(le) = le {
            apdu.push(le);
        }

        Ok(Self {
            uuid: Uuid::new_v4(),
            apdu,
            le,
            successful_statuses: vec![0x9000],
            info: None,
        })
    }

    /// Attach a human-readable label for traces
    pub fn with_info(mut self, info: &'static str) -> Self {
        self.info = Some(info);
        self
    }

    /// Accept an additional status word as successful (used by the
    /// transceiver's stop-on-error policy)
    pub fn accept_status(mut self, sw: u16) -> Self {
        self.successful_statuses.push(sw);
        self
    }

    /// UUID identifying this APDU
    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// The assembled APDU bytes
    pub fn bytes(&self) -> &[u8] {
        &self.apdu
    }

    /// Replace the assembled bytes (the in-session cipher substitutes
    /// the plain APDU with its encrypted form)
    pub(crate) fn set_bytes(&mut self, apdu: Vec<u8>) {
        self.apdu = apdu;
    }

    /// Expected response length, if one was specified
    pub fn le(&self) -> Option<u8> {
        self.le
    }

    /// Status words this request considers successful
    pub fn successful_statuses(&self) -> &[u16] {
        &self.successful_statuses
    }

    /// Trace label, if one was attached
    pub fn info(&self) -> Option<&'static str> {
        self.info
    }
}

/// A response APDU: data field plus trailing status word
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApduResponse {
    bytes: Vec<u8>,
}

impl ApduResponse {
    /// Wrap raw response bytes, which must at least hold a status word
    pub fn new(bytes: Vec<u8>) -> Result<Self, ProtocolError> {
        ensure!(
            bytes.len() >= 2,
            IllegalArgument,
            "response APDU too short: {} bytes (expected at least 2)",
            bytes.len()
        );
        Ok(Self { bytes })
    }

    /// The response data field, without the status word
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 2]
    }

    /// The trailing status word `SW1 SW2`
    pub fn status_word(&self) -> u16 {
        BigEndian::read_u16(&self.bytes[self.bytes.len() - 2..])
    }

    /// The complete response including the status word
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the response, yielding the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Render bytes as uppercase hex for trace output
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push_str(&format!("{:02X}", byte));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_1_is_header_only() {
        let apdu = ApduRequest::new(0x00, 0xB4, 0x01, 0x02, None, None).unwrap();
        assert_eq!(apdu.bytes(), &[0x00, 0xB4, 0x01, 0x02]);
    }

    #[test]
    fn case_2_appends_le() {
        let apdu = ApduRequest::new(0x00, 0xB2, 0x01, 0x0C, None, Some(0x1D)).unwrap();
        assert_eq!(apdu.bytes(), &[0x00, 0xB2, 0x01, 0x0C, 0x1D]);
        assert_eq!(apdu.le(), Some(0x1D));
    }

    #[test]
    fn case_3_appends_lc_and_data() {
        let apdu = ApduRequest::new(0x94, 0xDC, 0x01, 0x44, Some(&[0xAA, 0xBB]), None).unwrap();
        assert_eq!(apdu.bytes(), &[0x94, 0xDC, 0x01, 0x44, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn case_4_appends_lc_data_and_le() {
        let apdu =
            ApduRequest::new(0x00, 0x8A, 0x09, 0x31, Some(&[0x11, 0x22, 0x33, 0x44]), Some(0))
                .unwrap();
        assert_eq!(
            apdu.bytes(),
            &[0x00, 0x8A, 0x09, 0x31, 0x04, 0x11, 0x22, 0x33, 0x44, 0x00]
        );
    }

    #[test]
    fn oversized_data_is_refused() {
        let data = [0u8; 256];
        assert!(ApduRequest::new(0x00, 0xDC, 0x01, 0x44, Some(&data), None).is_err());
    }

    #[test]
    fn response_splits_data_and_status_word() {
        let response = ApduResponse::new(vec![0xDE, 0xAD, 0x90, 0x00]).unwrap();
        assert_eq!(response.data(), &[0xDE, 0xAD]);
        assert_eq!(response.status_word(), 0x9000);
    }

    #[test]
    fn truncated_response_is_refused() {
        assert!(ApduResponse::new(vec![0x90]).is_err());
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(to_hex(&[0x01, 0xAB, 0xFF]), "01ABFF");
    }
}
