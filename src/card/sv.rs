//! Stored Value state and logs
//!
//! Amounts and balances are two's-complement big-endian: 3 bytes for
//! balances and load amounts, 2 bytes for debit amounts. Log records
//! are kept as raw bytes with typed accessors.

use byteorder::{BigEndian, ByteOrder};

use error::{ProtocolError, ProtocolErrorKind::DataOutOfBounds};

/// Byte length of an SV load log record
pub const LOAD_LOG_SIZE: usize = 22;

/// Byte length of an SV debit log record
pub const DEBIT_LOG_SIZE: usize = 19;

/// One record of the SV reload log.
///
/// Layout: `date(2) | free(2) | kvc(1) | amount(3) | balance(3) |
/// time(2) | samId(4) | samTNum(3) | svTNum(2)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SvLoadLogRecord {
    raw: Vec<u8>,
}

impl SvLoadLogRecord {
    /// Wrap a 22-byte load log record
    pub fn new(raw: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            raw.len() == LOAD_LOG_SIZE,
            DataOutOfBounds,
            "SV load log record is {} bytes (expected {})",
            raw.len(),
            LOAD_LOG_SIZE
        );
        Ok(Self { raw: raw.to_vec() })
    }

    /// The raw record bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Load date as given by the terminal
    pub fn date(&self) -> u16 {
        BigEndian::read_u16(&self.raw[0..2])
    }

    /// Free data bytes
    pub fn free(&self) -> &[u8] {
        &self.raw[2..4]
    }

    /// KVC of the load key
    pub fn kvc(&self) -> u8 {
        self.raw[4]
    }

    /// Signed reload amount
    pub fn amount(&self) -> i32 {
        BigEndian::read_i24(&self.raw[5..8])
    }

    /// Signed balance after the reload
    pub fn balance(&self) -> i32 {
        BigEndian::read_i24(&self.raw[8..11])
    }

    /// Load time as given by the terminal
    pub fn time(&self) -> u16 {
        BigEndian::read_u16(&self.raw[11..13])
    }

    /// Serial number of the SAM that authorized the reload
    pub fn sam_id(&self) -> &[u8] {
        &self.raw[13..17]
    }

    /// SAM transaction number
    pub fn sam_transaction_number(&self) -> u32 {
        BigEndian::read_u24(&self.raw[17..20])
    }

    /// SV transaction number
    pub fn sv_transaction_number(&self) -> u16 {
        BigEndian::read_u16(&self.raw[20..22])
    }
}

/// One record of the SV debit log.
///
/// Layout: `amount(2) | date(2) | time(2) | kvc(1) | samId(4) |
/// samTNum(3) | balance(3) | svTNum(2)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SvDebitLogRecord {
    raw: Vec<u8>,
}

impl SvDebitLogRecord {
    /// Wrap a 19-byte debit log record
    pub fn new(raw: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            raw.len() == DEBIT_LOG_SIZE,
            DataOutOfBounds,
            "SV debit log record is {} bytes (expected {})",
            raw.len(),
            DEBIT_LOG_SIZE
        );
        Ok(Self { raw: raw.to_vec() })
    }

    /// The raw record bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Signed debit amount
    pub fn amount(&self) -> i16 {
        BigEndian::read_i16(&self.raw[0..2])
    }

    /// Debit date as given by the terminal
    pub fn date(&self) -> u16 {
        BigEndian::read_u16(&self.raw[2..4])
    }

    /// Debit time as given by the terminal
    pub fn time(&self) -> u16 {
        BigEndian::read_u16(&self.raw[4..6])
    }

    /// KVC of the debit key
    pub fn kvc(&self) -> u8 {
        self.raw[6]
    }

    /// Serial number of the SAM that authorized the debit
    pub fn sam_id(&self) -> &[u8] {
        &self.raw[7..11]
    }

    /// SAM transaction number
    pub fn sam_transaction_number(&self) -> u32 {
        BigEndian::read_u24(&self.raw[11..14])
    }

    /// Signed balance after the debit
    pub fn balance(&self) -> i32 {
        BigEndian::read_i24(&self.raw[14..17])
    }

    /// SV transaction number
    pub fn sv_transaction_number(&self) -> u16 {
        BigEndian::read_u16(&self.raw[17..19])
    }
}

/// Stored Value context of the card image
#[derive(Clone, Debug, Default)]
pub struct SvData {
    /// KVC of the current SV key
    pub kvc: u8,

    /// Signed balance, 3-byte two's-complement on the wire
    pub balance: i32,

    /// Last SV transaction number
    pub last_transaction_number: u16,

    /// Signature of the last SV operation (signatureLo)
    pub operation_signature: Vec<u8>,

    /// Header bytes of the SV Get request, kept for the SAM
    pub sv_get_request_header: Vec<u8>,

    /// Full data of the SV Get response, kept for the SAM
    pub sv_get_response: Vec<u8>,

    /// Most recent reload log record
    pub load_log: Option<SvLoadLogRecord>,

    /// Most recent debit log record
    pub debit_log: Option<SvDebitLogRecord>,

    /// An SV operation (reload/debit/undebit) completed since SV Get
    pub operation_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_record() -> Vec<u8> {
        let mut raw = vec![0u8; LOAD_LOG_SIZE];
        raw[0..2].copy_from_slice(&[0x12, 0x34]); // date
        raw[4] = 0xAA; // kvc
        raw[5..8].copy_from_slice(&[0xFF, 0xFF, 0x9C]); // amount -100
        raw[8..11].copy_from_slice(&[0x00, 0x03, 0xE8]); // balance 1000
        raw[11..13].copy_from_slice(&[0x56, 0x78]); // time
        raw[13..17].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]); // sam id
        raw[17..20].copy_from_slice(&[0x00, 0x00, 0x2A]); // sam tnum
        raw[20..22].copy_from_slice(&[0x00, 0x07]); // sv tnum
        raw
    }

    #[test]
    fn load_log_accessors() {
        let record = SvLoadLogRecord::new(&load_record()).unwrap();
        assert_eq!(record.date(), 0x1234);
        assert_eq!(record.kvc(), 0xAA);
        assert_eq!(record.amount(), -100);
        assert_eq!(record.balance(), 1000);
        assert_eq!(record.time(), 0x5678);
        assert_eq!(record.sam_id(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(record.sam_transaction_number(), 42);
        assert_eq!(record.sv_transaction_number(), 7);
    }

    #[test]
    fn debit_log_accessors() {
        let mut raw = vec![0u8; DEBIT_LOG_SIZE];
        raw[0..2].copy_from_slice(&[0xFF, 0xCE]); // amount -50
        raw[14..17].copy_from_slice(&[0x00, 0x01, 0x2C]); // balance 300
        let record = SvDebitLogRecord::new(&raw).unwrap();
        assert_eq!(record.amount(), -50);
        assert_eq!(record.balance(), 300);
    }

    #[test]
    fn wrong_length_is_refused() {
        assert!(SvLoadLogRecord::new(&[0u8; 5]).is_err());
        assert!(SvDebitLogRecord::new(&[0u8; 22]).is_err());
    }
}
