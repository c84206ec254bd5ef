//! Read Event Counter
//!
//! Reads one record of event counters (nine 3-byte counters per
//! record) into the SAM image.

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table();
}

/// Number of counters per record
pub const COUNTERS_PER_RECORD: usize = 9;

/// Read Event Counter command
#[derive(Clone, Debug)]
pub struct ReadEventCounterCommand {
    record: u8,
}

impl ReadEventCounterCommand {
    /// Read one record of event counters (records 1 to 3)
    pub fn new(record: u8) -> Result<Self, ProtocolError> {
        ensure!(
            record >= 1 && record <= 3,
            ProtocolErrorKind::IllegalArgument,
            "event counter record {} out of range [1, 3]",
            record
        );
        Ok(Self { record })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::ReadEventCounter.instruction(),
            0x00,
            0x80 | self.record,
            None,
            Some(0),
        )?
        .with_info("SAM Read Event Counter"))
    }

    /// Record number read by this command
    pub fn record(&self) -> u8 {
        self.record
    }

    /// Validate the response and decode the counters, by counter
    /// number
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<(u8, u32)>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::ReadEventCounter.name(), response, None)?;
        decode_counters(self.record, response.data())
    }
}

/// Decode a record of 3-byte counters into `(number, value)` pairs
pub(crate) fn decode_counters(record: u8, data: &[u8]) -> Result<Vec<(u8, u32)>, ProtocolError> {
    ensure!(
        data.len() >= COUNTERS_PER_RECORD * 3,
        ProtocolErrorKind::UnexpectedResponseLength,
        "counter record is {} bytes (expected at least {})",
        data.len(),
        COUNTERS_PER_RECORD * 3
    );
    let first = (record - 1) * COUNTERS_PER_RECORD as u8;
    Ok((0..COUNTERS_PER_RECORD)
        .map(|i| {
            (
                first + i as u8,
                BigEndian::read_u24(&data[i * 3..i * 3 + 3]),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_numbered_from_the_record() {
        let mut data = vec![0u8; 27];
        data[0..3].copy_from_slice(&[0x00, 0x00, 0x2A]);
        let counters = decode_counters(2, &data).unwrap();
        assert_eq!(counters[0], (9, 42));
        assert_eq!(counters.len(), 9);
    }

    #[test]
    fn record_number_is_checked() {
        assert!(ReadEventCounterCommand::new(0).is_err());
        assert!(ReadEventCounterCommand::new(4).is_err());
    }
}
