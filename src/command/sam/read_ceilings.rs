//! Read Ceilings
//!
//! Reads one record of event ceilings (the limits matching the event
//! counters) into the SAM image.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::read_event_counter::decode_counters;
use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table();
}

/// Read Ceilings command
#[derive(Clone, Debug)]
pub struct ReadCeilingsCommand {
    record: u8,
}

impl ReadCeilingsCommand {
    /// Read one record of ceilings (records 1 to 3)
    pub fn new(record: u8) -> Result<Self, ProtocolError> {
        ensure!(
            record >= 1 && record <= 3,
            ProtocolErrorKind::IllegalArgument,
            "ceilings record {} out of range [1, 3]",
            record
        );
        Ok(Self { record })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::ReadCeilings.instruction(),
            0x00,
            0xB0 | self.record,
            None,
            Some(0),
        )?
        .with_info("SAM Read Ceilings"))
    }

    /// Record number read by this command
    pub fn record(&self) -> u8 {
        self.record
    }

    /// Validate the response and decode the ceilings, by counter
    /// number
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<(u8, u32)>, ProtocolError> {
        STATUS_TABLE.check(SamCommandRef::ReadCeilings.name(), response, None)?;
        decode_counters(self.record, response.data())
    }
}
