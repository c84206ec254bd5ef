//! Digest Init / Update / Close / Authenticate
//!
//! The session-MAC accumulator of the SAM. `Init` primes the digest
//! with the card's Open Secure Session response and the session key
//! identifiers; one `Update` is issued per exchanged APDU (command and
//! response alternating); `Close` emits the terminal MAC; `Authenticate`
//! verifies the card's closing MAC. `Internal Authenticate` produces
//! the intermediate MAC used by early mutual authentication.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref INIT_STATUS_TABLE: StatusTable = base_status_table().with(
        0x6900,
        "Session already open.",
        Some(ProtocolErrorKind::AccessForbidden),
    );
    static ref UPDATE_STATUS_TABLE: StatusTable = base_status_table();
    static ref CLOSE_STATUS_TABLE: StatusTable = base_status_table();
    static ref AUTHENTICATE_STATUS_TABLE: StatusTable = base_status_table().with(
        0x6988,
        "Incorrect signature.",
        Some(ProtocolErrorKind::SecurityData),
    );
}

/// Digest Init: prime the session digest
#[derive(Clone, Debug)]
pub struct DigestInitCommand {
    extended_mode: bool,
    kif: u8,
    kvc: u8,
    open_session_data: Vec<u8>,
}

impl DigestInitCommand {
    /// Prime with the Open Secure Session response data and the
    /// session key identifiers
    pub fn new(extended_mode: bool, kif: u8, kvc: u8, open_session_data: Vec<u8>) -> Self {
        Self {
            extended_mode,
            kif,
            kvc,
            open_session_data,
        }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(2 + self.open_session_data.len());
        data.push(self.kif);
        data.push(self.kvc);
        data.extend_from_slice(&self.open_session_data);
        let p2 = if self.extended_mode { 0x02 } else { 0x01 };
        Ok(
            ApduRequest::new(cla, SamCommandRef::DigestInit.instruction(), 0x00, p2, Some(&data), None)?
                .with_info("SAM Digest Init"),
        )
    }

    /// Validate the response
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        INIT_STATUS_TABLE.check(SamCommandRef::DigestInit.name(), response, None)
    }
}

/// Digest Update: feed one exchanged APDU to the digest
#[derive(Clone, Debug)]
pub struct DigestUpdateCommand {
    encrypted_session: bool,
    data: Vec<u8>,
}

impl DigestUpdateCommand {
    /// Feed one APDU; with `encrypted_session` the SAM also returns
    /// the transformed (ciphered or deciphered) APDU
    pub fn new(encrypted_session: bool, data: Vec<u8>) -> Self {
        Self {
            encrypted_session,
            data,
        }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let p2 = if self.encrypted_session { 0x80 } else { 0x00 };
        let le = if self.encrypted_session { Some(0) } else { None };
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::DigestUpdate.instruction(),
            0x00,
            p2,
            Some(&self.data),
            le,
        )?
        .with_info("SAM Digest Update"))
    }

    /// Validate the response; in encrypted mode, yield the transformed
    /// APDU
    pub fn parse(&self, response: &ApduResponse) -> Result<Option<Vec<u8>>, ProtocolError> {
        UPDATE_STATUS_TABLE.check(SamCommandRef::DigestUpdate.name(), response, None)?;
        if self.encrypted_session {
            ensure!(
                !response.data().is_empty(),
                ProtocolErrorKind::UnexpectedResponseLength,
                "Digest Update returned no transformed APDU in encrypted mode"
            );
            Ok(Some(response.data().to_vec()))
        } else {
            Ok(None)
        }
    }
}

/// Digest Update Multiple: feed several APDUs at once
#[derive(Clone, Debug)]
pub struct DigestUpdateMultipleCommand {
    data: Vec<u8>,
}

impl DigestUpdateMultipleCommand {
    /// Feed the concatenation of length-prefixed APDUs
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::DigestUpdateMultiple.instruction(),
            0x80,
            0x00,
            Some(&self.data),
            None,
        )?
        .with_info("SAM Digest Update Multiple"))
    }

    /// Validate the response
    pub fn check(&self, response: &ApduResponse) -> Result<(), ProtocolError> {
        UPDATE_STATUS_TABLE.check(SamCommandRef::DigestUpdateMultiple.name(), response, None)
    }
}

/// Digest Close: emit the terminal session MAC
#[derive(Clone, Debug)]
pub struct DigestCloseCommand {
    mac_length: u8,
}

impl DigestCloseCommand {
    /// Request a terminal MAC of 4 (compatibility) or 8 (extended)
    /// bytes
    pub fn new(mac_length: u8) -> Self {
        Self { mac_length }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::DigestClose.instruction(),
            0x00,
            0x00,
            None,
            Some(self.mac_length),
        )?
        .with_info("SAM Digest Close"))
    }

    /// Validate the response and extract the terminal MAC
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        CLOSE_STATUS_TABLE.check(
            SamCommandRef::DigestClose.name(),
            response,
            Some(self.mac_length),
        )?;
        Ok(response.data().to_vec())
    }
}

/// Digest Authenticate: verify the card's closing session MAC
#[derive(Clone, Debug)]
pub struct DigestAuthenticateCommand {
    card_mac: Vec<u8>,
}

impl DigestAuthenticateCommand {
    /// Verify the given card MAC against the accumulated digest
    pub fn new(card_mac: Vec<u8>) -> Self {
        Self { card_mac }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::DigestAuthenticate.instruction(),
            0x00,
            0x00,
            Some(&self.card_mac),
            None,
        )?
        .with_info("SAM Digest Authenticate")
        .accept_status(0x6988))
    }

    /// `true` when the card MAC verifies, `false` on `6988`
    pub fn parse(&self, response: &ApduResponse) -> Result<bool, ProtocolError> {
        if response.status_word() == 0x6988 {
            return Ok(false);
        }
        AUTHENTICATE_STATUS_TABLE.check(SamCommandRef::DigestAuthenticate.name(), response, None)?;
        Ok(true)
    }
}

/// Digest Internal Authenticate: intermediate terminal MAC for early
/// mutual authentication
#[derive(Clone, Debug, Default)]
pub struct DigestInternalAuthenticateCommand;

impl DigestInternalAuthenticateCommand {
    /// Terminal MAC length produced by this command
    pub const MAC_LENGTH: u8 = 8;

    /// Request an intermediate terminal MAC
    pub fn new() -> Self {
        DigestInternalAuthenticateCommand
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::DigestInternalAuthenticate.instruction(),
            0x80,
            0x00,
            None,
            Some(Self::MAC_LENGTH),
        )?
        .with_info("SAM Digest Internal Authenticate"))
    }

    /// Validate the response and extract the intermediate MAC
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        CLOSE_STATUS_TABLE.check(
            SamCommandRef::DigestInternalAuthenticate.name(),
            response,
            Some(Self::MAC_LENGTH),
        )?;
        Ok(response.data().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn digest_init_carries_kif_kvc_and_open_data() {
        let command = DigestInitCommand::new(false, 0x30, 0x79, vec![0xAA, 0xBB]);
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(
            request.bytes(),
            &[0x80, 0x8A, 0x00, 0x01, 0x04, 0x30, 0x79, 0xAA, 0xBB]
        );
    }

    #[test]
    fn digest_update_in_encrypted_mode_expects_data_back() {
        let command = DigestUpdateCommand::new(true, vec![0x00, 0xB2, 0x01, 0x0C, 0x00]);
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(request.bytes()[3], 0x80);
        let empty = ApduResponse::new(vec![0x90, 0x00]).unwrap();
        assert!(command.parse(&empty).is_err());
    }

    #[test]
    fn digest_authenticate_maps_6988_to_false() {
        let command = DigestAuthenticateCommand::new(vec![0x11, 0x22, 0x33, 0x44]);
        let refused = ApduResponse::new(vec![0x69, 0x88]).unwrap();
        assert_eq!(command.parse(&refused).unwrap(), false);
        let accepted = ApduResponse::new(vec![0x90, 0x00]).unwrap();
        assert_eq!(command.parse(&accepted).unwrap(), true);
    }

    #[test]
    fn digest_update_multiple_sets_p1() {
        let command = DigestUpdateMultipleCommand::new(vec![0x05, 0x00, 0xB2, 0x01, 0x3D, 0x00]);
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(&request.bytes()[..4], &[0x80, 0x8C, 0x80, 0x00]);
        let response = ApduResponse::new(vec![0x90, 0x00]).unwrap();
        assert!(command.check(&response).is_ok());
    }

    #[test]
    fn digest_close_checks_the_mac_length() {
        let command = DigestCloseCommand::new(4);
        let response = ApduResponse::new(vec![0x01, 0x02, 0x03, 0x04, 0x90, 0x00]).unwrap();
        assert_eq!(command.parse(&response).unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
        let short = ApduResponse::new(vec![0x01, 0x02, 0x90, 0x00]).unwrap();
        assert!(command.parse(&short).is_err());
    }
}
