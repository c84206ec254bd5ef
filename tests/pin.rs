//! PIN presentation: attempt counter tracking, blocking, enciphered
//! presentation.

extern crate calypso;

mod common;

use calypso::{ChannelControl, ProtocolErrorKind, TransactionErrorKind};

use common::{compat_card, hex, MockTransceiver, RecordingCryptoProvider};

fn pin_error_kind(err: &calypso::TransactionError) -> Option<bool> {
    match err.kind() {
        TransactionErrorKind::UnexpectedCommandStatus {
            kind: ProtocolErrorKind::Pin { blocked },
        } => Some(blocked),
        _ => None,
    }
}

/// Three wrong presentations walk the counter down to blocked
#[test]
fn three_wrong_presentations_block_the_pin() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("63 C2"),
        hex("63 C1"),
        hex("69 83"),
    ]);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card());

    transaction.prepare_verify_pin_plain(b"0000").unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();
    assert_eq!(pin_error_kind(&err), Some(false));
    assert_eq!(transaction.card().pin_attempts_remaining(), Some(2));

    transaction.prepare_verify_pin_plain(b"0000").unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();
    assert_eq!(pin_error_kind(&err), Some(false));
    assert_eq!(transaction.card().pin_attempts_remaining(), Some(1));

    transaction.prepare_verify_pin_plain(b"0000").unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();
    assert_eq!(pin_error_kind(&err), Some(true));
    assert_eq!(transaction.card().pin_attempts_remaining(), Some(0));
}

/// A correct presentation resets the counter to 3
#[test]
fn correct_presentation_resets_the_counter() {
    let (transceiver, requests) = MockTransceiver::new(vec![hex("90 00")]);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card());

    transaction.prepare_verify_pin_plain(b"1234").unwrap();
    transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap();

    assert_eq!(transaction.card().pin_attempts_remaining(), Some(3));
    // Plain transmission: the PIN rides in clear
    assert_eq!(requests.borrow()[0], hex("00 20 00 00 04 31 32 33 34"));
}

/// Reading the counter presents nothing and accepts the counter
/// status words
#[test]
fn read_pin_counter_is_not_a_presentation() {
    let (transceiver, requests) = MockTransceiver::new(vec![hex("63 C1")]);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card());

    transaction.prepare_read_pin_counter().unwrap();
    transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap();

    assert_eq!(transaction.card().pin_attempts_remaining(), Some(1));
    assert_eq!(requests.borrow()[0], hex("00 20 00 00"));
}

/// Enciphered presentation ciphers against a fresh card challenge
#[test]
fn encrypted_presentation_uses_the_card_challenge() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("C1 C2 C3 C4 C5 C6 C7 C8 90 00"), // Get Challenge
        hex("90 00"),                         // Verify PIN
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction.prepare_get_challenge().unwrap();
    transaction
        .prepare_verify_pin_encrypted(b"1234", 0x30, 0x79)
        .unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.card().pin_attempts_remaining(), Some(3));
    assert!(calls
        .borrow()
        .iter()
        .any(|c| c == "cipher_pin_presentation"));
    // The 8-byte cipher block replaces the plain PIN
    let requests = requests.borrow();
    assert_eq!(&requests[1][..5], &hex("00 20 00 00 08")[..]);
    assert_eq!(&requests[1][5..], &[0xC0; 8][..]);
}

/// Change PIN resets the counter
#[test]
fn change_pin_plain() {
    let (transceiver, requests) = MockTransceiver::new(vec![hex("90 00")]);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card());

    transaction.prepare_change_pin_plain(b"4321").unwrap();
    transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap();

    assert_eq!(transaction.card().pin_attempts_remaining(), Some(3));
    assert_eq!(requests.borrow()[0], hex("00 D8 00 04 04 34 33 32 31"));
}
