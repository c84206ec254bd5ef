//! The SAM-backed crypto provider: unlock/diversifier preamble,
//! buffered digest, encryption rules, SV preparation, administrative
//! reads.

extern crate calypso;

mod common;

use calypso::{
    CryptoErrorKind, LegacySam, SamCryptoProvider, SamProductType, SvCommandSecurityData,
    SymmetricCryptoProvider,
};

use common::{hex, MockTransceiver};

fn sam() -> LegacySam {
    LegacySam::new(SamProductType::SamC1, &[0x11, 0x22, 0x33, 0x44])
}

/// First use unlocks the SAM, selects the diversifier, then fetches
/// the terminal challenge
#[test]
fn session_context_preamble() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("90 00"),             // Unlock
        hex("90 00"),             // Select Diversifier
        hex("A1 A2 A3 A4 90 00"), // Get Challenge
    ]);
    let mut provider = SamCryptoProvider::new(transceiver, sam())
        .with_card_diversifier(&hex("00 00 00 00 55 66 77 88"))
        .with_unlock_data(&[0x5A; 8]);

    let challenge = provider.init_terminal_secure_session_context().unwrap();
    assert_eq!(challenge, hex("A1 A2 A3 A4"));

    let requests = requests.borrow();
    assert_eq!(requests.len(), 3);
    assert_eq!(&requests[0][..5], &hex("80 20 00 00 08")[..]);
    assert_eq!(requests[1], hex("80 14 00 00 08 00 00 00 00 55 66 77 88"));
    assert_eq!(requests[2], hex("80 84 00 00 04"));
}

/// Digest updates are buffered and flushed in one exchange when the
/// terminal MAC is needed
#[test]
fn digest_is_buffered_until_close() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("90 00"), // Digest Init
        hex("90 00"), // Digest Update (request APDU)
        hex("90 00"), // Digest Update (response APDU)
        hex("AA BB CC DD 90 00"), // Digest Close
    ]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    provider
        .init_terminal_session_mac(&hex("01 02 03"), 0x30, 0x79)
        .unwrap();
    assert!(provider
        .update_terminal_session_mac(&hex("00 B2 01 3D 00"))
        .unwrap()
        .is_none());
    assert!(provider
        .update_terminal_session_mac(&hex("AA BB 90 00"))
        .unwrap()
        .is_none());
    // Nothing on the wire yet
    assert!(requests.borrow().is_empty());

    let mac = provider.finalize_terminal_session_mac().unwrap();
    assert_eq!(mac, hex("AA BB CC DD"));

    let requests = requests.borrow();
    assert_eq!(requests.len(), 4);
    // Digest Init primes with KIF, KVC and the open-session data
    assert_eq!(requests[0], hex("80 8A 00 01 05 30 79 01 02 03"));
    assert_eq!(requests[1], hex("80 8C 00 00 05 00 B2 01 3D 00"));
    assert_eq!(requests[3], hex("80 8E 00 00 04"));
}

/// The card MAC verification maps `6988` to a clean refusal
#[test]
fn card_session_mac_verification() {
    let (transceiver, _requests) =
        MockTransceiver::new(vec![hex("90 00"), hex("69 88")]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    assert!(provider
        .is_card_session_mac_valid(&hex("01 02 03 04"))
        .unwrap());
    assert!(!provider
        .is_card_session_mac_valid(&hex("01 02 03 04"))
        .unwrap());
}

/// With encryption active, a command APDU below 5 bytes is refused
/// before reaching the SAM
#[test]
fn encrypted_digest_update_length_rule() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("90 00"), // Digest Init flushed by the activation
    ]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    provider
        .init_terminal_session_mac(&hex("01 02 03"), 0x30, 0x79)
        .unwrap();
    provider.activate_encryption().unwrap();

    let err = provider
        .update_terminal_session_mac(&hex("00 B2 01"))
        .unwrap_err();
    assert_eq!(err.kind(), CryptoErrorKind::Crypto);
}

/// SV preparation fills the SAM identification and MAC fields
#[test]
fn sv_security_data_preparation() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("00 00 07 B1 B2 B3 B4 B5 90 00"), // SV Prepare Load
    ]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    let mut data = SvCommandSecurityData::default();
    data.set_sv_get_request(hex("00 7C 00 07"));
    data.set_sv_get_response(hex("AA 00 04 51 52 53 C1 C2 00 03 E8"));
    data.set_sv_command_partial_request(hex("00 B8 04 00"));
    provider.compute_sv_command_security_data(&mut data).unwrap();

    assert_eq!(data.serial_number(), &hex("11 22 33 44")[..]);
    assert_eq!(data.transaction_number(), &hex("00 00 07")[..]);
    assert_eq!(data.terminal_sv_mac(), &hex("B1 B2 B3 B4 B5")[..]);

    // The SAM saw the SV Get exchange followed by the partial request
    let requests = requests.borrow();
    assert_eq!(requests[0][1], 0x56);
    assert_eq!(
        &requests[0][5..24],
        &hex("00 7C 00 07 AA 00 04 51 52 53 C1 C2 00 03 E8 00 B8 04 00")[..]
    );
}

/// Administrative reads populate the SAM image
#[test]
fn administrative_reads() {
    let mut counters = vec![0u8; 27];
    counters[0..3].copy_from_slice(&hex("00 00 2A"));
    counters.extend_from_slice(&hex("90 00"));

    let mut ceilings = vec![0u8; 27];
    ceilings[3..6].copy_from_slice(&hex("00 01 00"));
    ceilings.extend_from_slice(&hex("90 00"));

    let mut parameters = hex("30 79 00 00 00 00");
    parameters.extend_from_slice(&hex("90 00"));

    let (transceiver, _requests) = MockTransceiver::new(vec![counters, ceilings, parameters]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    provider.read_event_counters(1).unwrap();
    provider.read_ceilings(1).unwrap();
    provider.read_key_parameters(0x30, 0x79).unwrap();

    assert_eq!(provider.sam().event_counter(0), Some(42));
    assert_eq!(provider.sam().event_ceiling(1), Some(256));
    assert!(provider.sam().key_parameters(0x30, 0x79).is_some());
}

/// PIN ciphering produces the presentation block
#[test]
fn pin_ciphering() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("C0 C1 C2 C3 C4 C5 C6 C7 90 00"),
    ]);
    let mut provider = SamCryptoProvider::new(transceiver, sam());

    let block = provider
        .cipher_pin_for_presentation(&hex("D1 D2 D3 D4"), b"1234", 0x30, 0x79)
        .unwrap();
    assert_eq!(block.len(), 8);
    let requests = requests.borrow();
    assert_eq!(requests[0][1], 0x12);
    assert_eq!(requests[0][3], 0xFF);
}
