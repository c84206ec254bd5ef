//! Increase / Decrease
//!
//! Adds to or subtracts from one 3-byte counter. The response carries
//! the new counter value, which the anticipated response predicts from
//! the image when the current value is known.

use apdu::{ApduRequest, ApduResponse};
use byteorder::{BigEndian, ByteOrder};
use card::CalypsoCard;
use command::{anticipated, CardCommand, CardCommandRef};
use error::ProtocolErrorKind;
use status::StatusTable;
use transaction::{TransactionContext, TransactionError, TransactionErrorKind};

lazy_static! {
    static ref STATUS_TABLE: StatusTable =
        super::session_buffer_overlay(super::base_status_table())
            .with(
                0x6981,
                "Wrong EF type (not a counters EF).",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6986,
                "No current EF.",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6A80,
                "Counter overflow.",
                Some(ProtocolErrorKind::DataOutOfBounds),
            )
            .with(
                0x6A82,
                "File not found.",
                Some(ProtocolErrorKind::DataAccess),
            )
            .with(
                0x6A83,
                "Counter not found.",
                Some(ProtocolErrorKind::DataAccess),
            );
}

/// Counter size on the wire
const COUNTER_LENGTH: u8 = 3;

/// Increase / Decrease command
pub struct IncreaseDecreaseCommand {
    decrease: bool,
    sfi: u8,
    counter_number: u8,
    value: u32,
}

impl IncreaseDecreaseCommand {
    /// Add (`decrease` false) or subtract (`decrease` true) `value`
    /// to/from the counter
    pub fn new(decrease: bool, sfi: u8, counter_number: u8, value: u32) -> Self {
        Self {
            decrease,
            sfi,
            counter_number,
            value,
        }
    }

    fn new_counter_value(&self, card: &CalypsoCard) -> Option<u32> {
        card.counter(self.sfi, self.counter_number).map(|old| {
            if self.decrease {
                old.wrapping_sub(self.value) & 0x00FF_FFFF
            } else {
                old.wrapping_add(self.value) & 0x00FF_FFFF
            }
        })
    }
}

impl CardCommand for IncreaseDecreaseCommand {
    fn command_ref(&self) -> CardCommandRef {
        if self.decrease {
            CardCommandRef::Decrease
        } else {
            CardCommandRef::Increase
        }
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn uses_session_buffer(&self) -> bool {
        true
    }

    fn session_buffer_weight(&self) -> usize {
        usize::from(COUNTER_LENGTH) + super::SESSION_BUFFER_OVERHEAD
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let mut value = [0u8; 3];
        BigEndian::write_u24(&mut value, self.value);
        Ok(ApduRequest::new(
            cla,
            self.command_ref().instruction(),
            self.counter_number,
            self.sfi * 8,
            Some(&value),
            Some(COUNTER_LENGTH),
        )?
        .with_info(if self.decrease { "Decrease" } else { "Increase" }))
    }

    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        self.new_counter_value(card).map(|new_value| {
            let mut bytes = [0u8; 3];
            BigEndian::write_u24(&mut bytes, new_value);
            anticipated(&bytes)
        })
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, Some(COUNTER_LENGTH))?;
        let data = response.data();
        if data.len() != usize::from(COUNTER_LENGTH) {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::UnexpectedResponseLength,
                },
                "counter response of {} bytes (expected 3)",
                data.len()
            );
        }
        let new_value = BigEndian::read_u24(data);
        ctx.card.set_counter(self.sfi, self.counter_number, new_value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anticipated_value_wraps_at_24_bits() {
        let command = IncreaseDecreaseCommand::new(false, 0x07, 1, 2);
        assert_eq!(command.value, 2);
        assert_eq!(command.session_buffer_weight(), 9);
    }
}
