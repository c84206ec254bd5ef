//! Shared test doubles: a scripted reader and a deterministic crypto
//! provider, plus card fixtures.

// Not every integration-test crate uses every helper
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use calypso::{
    ApduResponse, ApduTransceiver, CalypsoCard, CardRequest, CardResponse, ChannelControl,
    CryptoError, CryptoErrorKind, SvCommandSecurityData, SymmetricCryptoProvider,
    TransceiverError,
};

/// Decode a hex string, spaces allowed
pub fn hex(s: &str) -> Vec<u8> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    assert!(compact.len() % 2 == 0, "odd hex string: {}", s);
    (0..compact.len() / 2)
        .map(|i| u8::from_str_radix(&compact[i * 2..i * 2 + 2], 16).unwrap())
        .collect()
}

/// A reader that answers from a scripted FIFO of responses and records
/// every request APDU it sees
pub struct MockTransceiver {
    responses: VecDeque<Vec<u8>>,
    requests: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MockTransceiver {
    /// Script the reader with one response per expected request APDU
    pub fn new(responses: Vec<Vec<u8>>) -> (Box<MockTransceiver>, Rc<RefCell<Vec<Vec<u8>>>>) {
        let requests = Rc::new(RefCell::new(Vec::new()));
        let transceiver = Box::new(MockTransceiver {
            responses: responses.into_iter().collect(),
            requests: Rc::clone(&requests),
        });
        (transceiver, requests)
    }
}

impl ApduTransceiver for MockTransceiver {
    fn exchange(
        &mut self,
        request: &CardRequest,
        _channel_control: ChannelControl,
    ) -> Result<CardResponse, TransceiverError> {
        let mut apdus = Vec::new();
        for apdu in request.apdus() {
            self.requests.borrow_mut().push(apdu.bytes().to_vec());
            let bytes = match self.responses.pop_front() {
                Some(bytes) => bytes,
                None => break,
            };
            let response = ApduResponse::new(bytes).unwrap();
            let stop = request.stop_on_unsuccessful()
                && !apdu.successful_statuses().contains(&response.status_word());
            apdus.push(response);
            if stop {
                break;
            }
        }
        Ok(CardResponse::new(apdus))
    }
}

/// Involutive toy cipher standing in for session encryption
pub fn toy_cipher(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b ^ 0x55).collect()
}

/// A crypto provider returning fixed values and logging every call
pub struct RecordingCryptoProvider {
    calls: Rc<RefCell<Vec<String>>>,
    challenge: Vec<u8>,
    mac: Vec<u8>,
    sv_mac_length: usize,
    pub session_mac_valid: bool,
    pub sv_mac_valid: bool,
    encryption_active: bool,
}

impl RecordingCryptoProvider {
    /// `mac_length` 4 builds a compatibility-mode provider, 8 an
    /// extended-mode one
    pub fn new(mac_length: usize) -> (Box<RecordingCryptoProvider>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let provider = Box::new(RecordingCryptoProvider {
            calls: Rc::clone(&calls),
            challenge: vec![0x11; if mac_length == 8 { 8 } else { 4 }],
            mac: vec![0xAA; mac_length],
            sv_mac_length: if mac_length == 8 { 10 } else { 5 },
            session_mac_valid: true,
            sv_mac_valid: true,
            encryption_active: false,
        });
        (provider, calls)
    }

    fn log(&self, entry: String) {
        self.calls.borrow_mut().push(entry);
    }
}

impl SymmetricCryptoProvider for RecordingCryptoProvider {
    fn init_terminal_secure_session_context(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.log("init_context".to_string());
        Ok(self.challenge.clone())
    }

    fn init_terminal_session_mac(
        &mut self,
        _open_data_out: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<(), CryptoError> {
        self.log(format!("init_mac kif={:02X} kvc={:02X}", kif, kvc));
        Ok(())
    }

    fn update_terminal_session_mac(&mut self, apdu: &[u8]) -> Result<Option<Vec<u8>>, CryptoError> {
        if self.encryption_active {
            self.log(format!("update_ciphered len={}", apdu.len()));
            Ok(Some(toy_cipher(apdu)))
        } else {
            self.log(format!("update len={}", apdu.len()));
            Ok(None)
        }
    }

    fn finalize_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.log("finalize".to_string());
        Ok(self.mac.clone())
    }

    fn generate_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.log("generate".to_string());
        Ok(vec![0xA5; 8])
    }

    fn activate_encryption(&mut self) -> Result<(), CryptoError> {
        self.log("activate_encryption".to_string());
        if self.encryption_active {
            return Err(CryptoError::new(
                CryptoErrorKind::Crypto,
                Some("already active".to_string()),
            ));
        }
        self.encryption_active = true;
        Ok(())
    }

    fn deactivate_encryption(&mut self) -> Result<(), CryptoError> {
        self.log("deactivate_encryption".to_string());
        self.encryption_active = false;
        Ok(())
    }

    fn is_card_session_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError> {
        self.log(format!("check_session_mac len={}", mac.len()));
        Ok(self.session_mac_valid)
    }

    fn compute_sv_command_security_data(
        &mut self,
        data: &mut SvCommandSecurityData,
    ) -> Result<(), CryptoError> {
        self.log("compute_sv".to_string());
        data.set_serial_number(vec![0x01, 0x02, 0x03, 0x04]);
        data.set_transaction_number(vec![0x00, 0x00, 0x2A]);
        data.set_terminal_sv_mac(vec![0xBB; self.sv_mac_length]);
        Ok(())
    }

    fn is_card_sv_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError> {
        self.log(format!("check_sv_mac len={}", mac.len()));
        Ok(self.sv_mac_valid)
    }

    fn cipher_pin_for_presentation(
        &mut self,
        _card_challenge: &[u8],
        _pin: &[u8],
        _kif: u8,
        _kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.log("cipher_pin_presentation".to_string());
        Ok(vec![0xC0; 8])
    }

    fn cipher_pin_for_modification(
        &mut self,
        _card_challenge: &[u8],
        _current_pin: &[u8],
        _new_pin: &[u8],
        _kif: u8,
        _kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.log("cipher_pin_modification".to_string());
        Ok(vec![0xC1; 8])
    }

    fn generate_ciphered_card_key(
        &mut self,
        _card_challenge: &[u8],
        _issuer_kif: u8,
        _issuer_kvc: u8,
        _target_kif: u8,
        _target_kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.log("generate_card_key".to_string());
        Ok(vec![0xC2; 32])
    }
}

/// Build an FCI for a card with the given application type byte
pub fn fci_with_application_type(application_type: u8) -> Vec<u8> {
    let mut fci = vec![
        0x6F, 0x22, 0x84, 0x08, 0x31, 0x54, 0x49, 0x43, 0x2E, 0x49, 0x43, 0x41, 0xA5, 0x16, 0xBF,
        0x0C, 0x13, 0xC7, 0x08,
    ];
    fci.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44]);
    fci.extend_from_slice(&[0x53, 0x07, 0x0A, 0x3C, application_type, 0x05, 0x01, 0x31, 0x00]);
    fci
}

/// A current-generation card with PIN and Stored Value, compatibility
/// mode only
pub fn compat_card() -> CalypsoCard {
    CalypsoCard::from_fci(&fci_with_application_type(0x23)).unwrap()
}

/// A current-generation card with PIN, Stored Value and the extended
/// mode
pub fn extended_card() -> CalypsoCard {
    CalypsoCard::from_fci(&fci_with_application_type(0x2F)).unwrap()
}
