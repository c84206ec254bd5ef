//! Increase Multiple / Decrease Multiple
//!
//! Applies one delta per counter in a single command. Request data is
//! a sequence of `counterNumber | value(3)` entries; the response
//! echoes the same layout with the new values, which the anticipated
//! response predicts from the image when every counter is known.

use std::collections::BTreeMap;

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

/// Increase Multiple / Decrease Multiple command
pub struct IncreaseDecreaseMultipleCommand {
    decrease: bool,
    sfi: u8,
    deltas: BTreeMap<u8, u32>,
}

impl IncreaseDecreaseMultipleCommand {
    /// Apply one delta per counter, ordered by counter number
    pub fn new(decrease: bool, sfi: u8, deltas: BTreeMap<u8, u32>) -> Self {
        Self {
            decrease,
            sfi,
            deltas,
        }
    }

    fn data_length(&self) -> usize {
        self.deltas.len() * 4
    }
}

impl CardCommand for IncreaseDecreaseMultipleCommand {
    fn command_ref(&self) -> CardCommandRef {
        if self.decrease {
            CardCommandRef::DecreaseMultiple
        } else {
            CardCommandRef::IncreaseMultiple
        }
    }

    fn status_table(&self) -> &StatusTable {
        &STATUS_TABLE
    }

    fn uses_session_buffer(&self) -> bool {
        true
    }

    fn session_buffer_weight(&self) -> usize {
        self.data_length() + super::SESSION_BUFFER_OVERHEAD
    }

    fn finalize_request(
        &mut self,
        ctx: &mut TransactionContext,
    ) -> Result<ApduRequest, TransactionError> {
        let cla = ctx.card.card_class().to_u8();
        let mut data = Vec::with_capacity(self.data_length());
        for (&counter, &value) in &self.deltas {
            data.push(counter);
            let mut bytes = [0u8; 3];
            BigEndian::write_u24(&mut bytes, value);
            data.extend_from_slice(&bytes);
        }
        Ok(ApduRequest::new(
            cla,
            self.command_ref().instruction(),
            0x00,
            self.sfi * 8,
            Some(&data),
            Some(0),
        )?
        .with_info(if self.decrease {
            "Decrease Multiple"
        } else {
            "Increase Multiple"
        }))
    }

    fn anticipated_response(&self, card: &CalypsoCard) -> Option<ApduResponse> {
        let mut data = Vec::with_capacity(self.data_length());
        for (&counter, &value) in &self.deltas {
            let old = match card.counter(self.sfi, counter) {
                Some(old) => old,
                None => return None,
            };
            let new_value = if self.decrease {
                old.wrapping_sub(value) & 0x00FF_FFFF
            } else {
                old.wrapping_add(value) & 0x00FF_FFFF
            };
            data.push(counter);
            let mut bytes = [0u8; 3];
            BigEndian::write_u24(&mut bytes, new_value);
            data.extend_from_slice(&bytes);
        }
        Some(anticipated(&data))
    }

    fn parse_response(
        &mut self,
        response: &ApduResponse,
        ctx: &mut TransactionContext,
    ) -> Result<(), TransactionError> {
        STATUS_TABLE.check(self.command_ref().name(), response, None)?;
        let data = response.data();
        if data.len() % 4 != 0 {
            fail!(
                TransactionErrorKind::UnexpectedCommandStatus {
                    kind: ProtocolErrorKind::UnexpectedResponseLength,
                },
                "multiple-counter response of {} bytes is not a sequence of 4-byte entries",
                data.len()
            );
        }
        for entry in data.chunks(4) {
            let counter = entry[0];
            let new_value = BigEndian::read_u24(&entry[1..4]);
            ctx.card.set_counter(self.sfi, counter, new_value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_is_four_bytes_per_counter() {
        let mut deltas = BTreeMap::new();
        deltas.insert(1, 10);
        deltas.insert(3, 20);
        let command = IncreaseDecreaseMultipleCommand::new(false, 0x09, deltas);
        assert_eq!(command.data_length(), 8);
        assert_eq!(command.session_buffer_weight(), 14);
    }
}
