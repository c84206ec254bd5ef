//! SV Check
//!
//! Verifies the card's SV operation signature (3 bytes in
//! compatibility mode, 6 in extended mode) against the cryptogram the
//! SAM computed during SV Prepare.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table().with(
        0x6988,
        "Incorrect SV signature.",
        Some(ProtocolErrorKind::SecurityData),
    );
}

/// SV Check command
#[derive(Clone, Debug)]
pub struct SvCheckCommand {
    card_sv_mac: Vec<u8>,
}

impl SvCheckCommand {
    /// Verify the card SV signature (3 or 6 bytes)
    pub fn new(card_sv_mac: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            card_sv_mac.len() == 3 || card_sv_mac.len() == 6,
            ProtocolErrorKind::IllegalArgument,
            "card SV MAC is {} bytes (expected 3 or 6)",
            card_sv_mac.len()
        );
        Ok(Self {
            card_sv_mac: card_sv_mac.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::SvCheck.instruction(),
            0x00,
            0x00,
            Some(&self.card_sv_mac),
            None,
        )?
        .with_info("SAM SV Check")
        .accept_status(0x6988))
    }

    /// `true` when the signature verifies, `false` on `6988`
    pub fn parse(&self, response: &ApduResponse) -> Result<bool, ProtocolError> {
        if response.status_word() == 0x6988 {
            return Ok(false);
        }
        STATUS_TABLE.check(SamCommandRef::SvCheck.name(), response, None)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_length_is_checked() {
        assert!(SvCheckCommand::new(&[0x01, 0x02, 0x03]).is_ok());
        assert!(SvCheckCommand::new(&[0x01; 6]).is_ok());
        assert!(SvCheckCommand::new(&[0x01; 4]).is_err());
    }

    #[test]
    fn refused_signature_maps_to_false() {
        let command = SvCheckCommand::new(&[0x01, 0x02, 0x03]).unwrap();
        let refused = ApduResponse::new(vec![0x69, 0x88]).unwrap();
        assert_eq!(command.parse(&refused).unwrap(), false);
        let accepted = ApduResponse::new(vec![0x90, 0x00]).unwrap();
        assert_eq!(command.parse(&accepted).unwrap(), true);
    }
}
