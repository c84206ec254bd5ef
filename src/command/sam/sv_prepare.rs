//! SV Prepare Load / Debit / Undebit
//!
//! Hands the SV Get exchange and the partial SV operation request to
//! the SAM, which answers with its transaction number and the terminal
//! SV MAC to splice into the card command.

use apdu::{ApduRequest, ApduResponse};
use error::{ProtocolError, ProtocolErrorKind};
use status::StatusTable;

use super::{base_status_table, SamCommandRef};

lazy_static! {
    static ref STATUS_TABLE: StatusTable = base_status_table().with(
        0x6A83,
        "SV key not found.",
        Some(ProtocolErrorKind::DataAccess),
    );
}

/// Length of the SAM transaction number in the response
const SAM_TNUM_LENGTH: usize = 3;

/// Which SV operation the SAM prepares
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SvPrepareOperation {
    /// SV Reload
    Load,

    /// SV Debit
    Debit,

    /// SV Undebit
    Undebit,
}

impl SvPrepareOperation {
    fn command_ref(self) -> SamCommandRef {
        match self {
            SvPrepareOperation::Load => SamCommandRef::SvPrepareLoad,
            SvPrepareOperation::Debit => SamCommandRef::SvPrepareDebit,
            SvPrepareOperation::Undebit => SamCommandRef::SvPrepareUndebit,
        }
    }
}

/// SV Prepare command
#[derive(Clone, Debug)]
pub struct SvPrepareCommand {
    operation: SvPrepareOperation,
    sv_get_request: Vec<u8>,
    sv_get_response: Vec<u8>,
    partial_request: Vec<u8>,
}

impl SvPrepareCommand {
    /// Prepare the security data of an SV operation from the SV Get
    /// exchange and the partial operation request
    pub fn new(
        operation: SvPrepareOperation,
        sv_get_request: &[u8],
        sv_get_response: &[u8],
        partial_request: &[u8],
    ) -> Self {
        Self {
            operation,
            sv_get_request: sv_get_request.to_vec(),
            sv_get_response: sv_get_response.to_vec(),
            partial_request: partial_request.to_vec(),
        }
    }

    /// Build the request APDU
    pub fn request(&self, cla: u8) -> Result<ApduRequest, ProtocolError> {
        let mut data = Vec::with_capacity(
            self.sv_get_request.len() + self.sv_get_response.len() + self.partial_request.len(),
        );
        data.extend_from_slice(&self.sv_get_request);
        data.extend_from_slice(&self.sv_get_response);
        data.extend_from_slice(&self.partial_request);
        Ok(ApduRequest::new(
            cla,
            self.operation.command_ref().instruction(),
            0x01,
            0xFF,
            Some(&data),
            Some(0),
        )?
        .with_info("SAM SV Prepare"))
    }

    /// Validate the response and extract `(sam_tnum, terminal_sv_mac)`
    pub fn parse(&self, response: &ApduResponse) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
        STATUS_TABLE.check(self.operation.command_ref().name(), response, None)?;
        let data = response.data();
        // tnum(3) followed by a 5 or 10-byte MAC
        ensure!(
            data.len() == SAM_TNUM_LENGTH + 5 || data.len() == SAM_TNUM_LENGTH + 10,
            ProtocolErrorKind::UnexpectedResponseLength,
            "SV prepare data is {} bytes",
            data.len()
        );
        Ok((
            data[..SAM_TNUM_LENGTH].to_vec(),
            data[SAM_TNUM_LENGTH..].to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::sam::SAM_CLA;

    #[test]
    fn request_concatenates_the_three_parts() {
        let command = SvPrepareCommand::new(
            SvPrepareOperation::Load,
            &[0x01, 0x02],
            &[0x03],
            &[0x04, 0x05],
        );
        let request = command.request(SAM_CLA).unwrap();
        assert_eq!(request.bytes()[1], 0x56);
        assert_eq!(&request.bytes()[5..10], &[0x01, 0x02, 0x03, 0x04, 0x05]);
    }

    #[test]
    fn response_splits_tnum_and_mac() {
        let command = SvPrepareCommand::new(SvPrepareOperation::Debit, &[], &[], &[]);
        let response = ApduResponse::new(vec![
            0x00, 0x00, 0x2A, 0x01, 0x02, 0x03, 0x04, 0x05, 0x90, 0x00,
        ])
        .unwrap();
        let (tnum, mac) = command.parse(&response).unwrap();
        assert_eq!(tnum, vec![0x00, 0x00, 0x2A]);
        assert_eq!(mac.len(), 5);
    }
}
