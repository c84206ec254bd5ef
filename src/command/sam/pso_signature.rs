//! PSO Compute Signature / PSO Verify Signature
//!
//! Computes and verifies detached signatures over terminal data (e.g.
//! traceability information) with a SAM system key.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref COMPUTE_STATUS_TABLE: StatusTable = base_status_table().with(
        0x6A83,
        "Signing key not found.",
        Some(ProtocolErrorKind::DataAccess),
    );
    static ref VERIFY_STATUS_TABLE: StatusTable = base_status_table().with(
        0x6988,
        "Incorrect signature.",
        Some(ProtocolErrorKind::SecurityData),
    );
}

/// Maximum length of the data to sign in one command
const MAX_SIGNABLE_DATA: usize = 208;

/// PSO Compute Signature command
#[derive(Clone, Debug)]
pub struct PsoComputeSignatureCommand {
    kif: u8,
    kvc: u8,
    data: Vec<u8>,
    signature_length: u8,
}

impl PsoComputeSignatureCommand {
    /// Sign `data` with the key addressed by KIF/KVC, producing a
    /// signature of 1 to 8 bytes
    pub fn new(kif: u8, kvc: u8, data: &[u8], signature_length: u8) -> Result<Self, ProtocolError> {
        ensure!(
            !data.is_empty() && data.len() <= MAX_SIGNABLE_DATA,
            ProtocolErrorKind::IllegalArgument,
            "signable data is {} bytes (expected 1 to {})",
            data.len(),
            MAX_SIGNABLE_DATA
        );
        ensure!(
            signature_length >= 1 && signature_length <= 8,
            ProtocolErrorKind::IllegalArgument,
            "signature length {} out of range [1, 8]",
            signature_length
        );
        Ok(Self {
            kif,
            kvc,
            data: data.to_vec(),
            signature_length,
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(3 + self.data.len());
        data.push(self.kif);
        data.push(self.kvc);
        data.push(self.signature_length);
        data.extend_from_slice(&self.data);
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::PsoComputeSignature.instruction(),
            0x9E,
            0x9A,
            Some(&data),
            Some(self.signature_length),
        )?
        .with_info("SAM PSO Compute Signature"))
    }

    /// Validate the response and extract the signature
    pub fn parse(&self, response: &ApduResponse) -> Result<Vec<u8>, ProtocolError> {
        COMPUTE_STATUS_TABLE.check(
            SamCommandRef::PsoComputeSignature.name(),
            response,
            Some(self.signature_length),
        )?;
        Ok(response.data().to_vec())
    }
}

/// PSO Verify Signature command
#[derive(Clone, Debug)]
pub struct PsoVerifySignatureCommand {
    kif: u8,
    kvc: u8,
    data: Vec<u8>,
    signature: Vec<u8>,
}

impl PsoVerifySignatureCommand {
    /// Verify `signature` over `data` with the key addressed by
    /// KIF/KVC
    pub fn new(kif: u8, kvc: u8, data: &[u8], signature: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            !data.is_empty() && data.len() <= MAX_SIGNABLE_DATA,
            ProtocolErrorKind::IllegalArgument,
            "signed data is {} bytes (expected 1 to {})",
            data.len(),
            MAX_SIGNABLE_DATA
        );
        ensure!(
            signature.len() >= 1 && signature.len() <= 8,
            ProtocolErrorKind::IllegalArgument,
            "signature is {} bytes (expected 1 to 8)",
            signature.len()
        );
        Ok(Self {
            kif,
            kvc,
            data: data.to_vec(),
            signature: signature.to_vec(),
        })
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(3 + self.data.len() + self.signature.len());
        data.push(self.kif);
        data.push(self.kvc);
        data.push(self.signature.len() as u8);
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&self.signature);
        Ok(ApduRequest::new(
            cla,
            SamCommandRef::PsoVerifySignature.instruction(),
            0x00,
            0xA8,
            Some(&data),
            None,
        )?
        .with_info("SAM PSO Verify Signature")
        .accept_status(0x6988))
    }

    /// `true` when the signature verifies, `false` on `6988`
    pub fn parse(&self, response: &ApduResponse) -> Result<bool, ProtocolError> {
        if response.status_word() == 0x6988 {
            return Ok(false);
        }
        VERIFY_STATUS_TABLE.check(SamCommandRef::PsoVerifySignature.name(), response, None)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn signature_length_bounds() {
        assert!(PsoComputeSignatureCommand::new(0xE1, 0x01, &[0xAA], 0).is_err());
        assert!(PsoComputeSignatureCommand::new(0xE1, 0x01, &[0xAA], 9).is_err());
        assert!(PsoComputeSignatureCommand::new(0xE1, 0x01, &[0xAA], 8).is_ok());
    }

    #[test]
    fn verify_maps_6988_to_false() {
        let command = PsoVerifySignatureCommand::new(0xE1, 0x01, &[0xAA], &[0x01; 8]).unwrap();
        let _ = command.request(SAM_CLA).unwrap();
        let refused = ApduResponse::new(vec![0x69, 0x88]).unwrap();
        assert_eq!(command.parse(&refused).unwrap(), false);
    }
}
