//! Stored Value operations: reload and debit round-trips, postponed
//! signature at session close.

extern crate calypso;

mod common;

use calypso::{ChannelControl, SessionState, SvAction, SvOperation, WriteAccessLevel};

use common::{compat_card, extended_card, hex, MockTransceiver, RecordingCryptoProvider};

/// SV Get response: header (kvc, tnum, signature, challenge, balance)
/// plus the requested log(s)
fn sv_get_response(kvc: u8, tnum: u16, balance: i32, load_log: bool, debit_log: bool) -> Vec<u8> {
    let mut data = vec![kvc, (tnum >> 8) as u8, tnum as u8, 0x51, 0x52, 0x53, 0xC1, 0xC2];
    data.push((balance >> 16) as u8);
    data.push((balance >> 8) as u8);
    data.push(balance as u8);
    if load_log {
        data.extend_from_slice(&[0u8; 22]);
    }
    if debit_log {
        data.extend_from_slice(&[0u8; 19]);
    }
    data.extend_from_slice(&[0x90, 0x00]);
    data
}

/// Reload of +100 in extended mode, outside any session
#[test]
fn sv_reload_updates_balance_and_log() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        sv_get_response(0xAA, 4, 1000, true, true),
        hex("12 34 56 90 00"),
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(8);
    let mut transaction = calypso::CardTransaction::new(transceiver, extended_card())
        .with_crypto_provider(provider);

    transaction.prepare_sv_get(SvOperation::Reload).unwrap();
    transaction
        .prepare_sv_reload(100, [0x20, 0x01], [0x09, 0x30], [0x00, 0x00])
        .unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    let card = transaction.card();
    assert_eq!(card.sv_balance(), 1100);
    assert_eq!(card.sv_transaction_number(), 5);
    assert_eq!(card.sv().operation_signature, hex("12 34 56"));
    assert!(card.sv().operation_complete);

    let load_log = card.sv().load_log.clone().unwrap();
    assert_eq!(load_log.amount(), 100);
    assert_eq!(load_log.balance(), 1100);
    assert_eq!(load_log.date(), 0x2001);
    assert_eq!(load_log.time(), 0x0930);
    assert_eq!(load_log.sam_id(), &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(load_log.sam_transaction_number(), 42);
    assert_eq!(load_log.sv_transaction_number(), 5);

    // The reload request carries the spliced SAM id, SAM tnum and the
    // 10-byte extended MAC
    let requests = requests.borrow();
    let reload = &requests[1];
    assert_eq!(reload[1], 0xB8);
    assert_eq!(reload[4] as usize, 27); // Lc: extended dataIn
    assert_eq!(&reload[5 + 10..5 + 14], &hex("01 02 03 04")[..]);
    assert_eq!(&reload[5 + 14..5 + 17], &hex("00 00 2A")[..]);
    assert_eq!(&reload[5 + 17..5 + 27], &[0xBB; 10][..]);

    // Outside a session the card signature is verified right away
    assert!(calls.borrow().iter().any(|c| c == "check_sv_mac len=3"));
}

/// Debit of 50 in compatibility mode: balance decreases, the wire
/// amount is negated
#[test]
fn sv_debit_round_trip() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        sv_get_response(0xAA, 9, 500, false, true),
        hex("0A 0B 0C 90 00"),
    ]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction.prepare_sv_get(SvOperation::Debit).unwrap();
    transaction
        .prepare_sv_debit(SvAction::Do, 50, [0x20, 0x01], [0x10, 0x00])
        .unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    let card = transaction.card();
    assert_eq!(card.sv_balance(), 450);
    assert_eq!(card.sv_transaction_number(), 10);

    let debit_log = card.sv().debit_log.clone().unwrap();
    assert_eq!(debit_log.amount(), -50);
    assert_eq!(debit_log.balance(), 450);
    assert_eq!(debit_log.sv_transaction_number(), 10);

    let requests = requests.borrow();
    let debit = &requests[1];
    assert_eq!(debit[1], 0xBA);
    // Wire amount is -50 two's complement
    assert_eq!(&debit[5..7], &hex("FF CE")[..]);
}

/// Undebit gives the amount back
#[test]
fn sv_undebit_restores_balance() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        sv_get_response(0xAA, 9, 450, false, true),
        hex("0A 0B 0C 90 00"),
    ]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction.prepare_sv_get(SvOperation::Debit).unwrap();
    transaction
        .prepare_sv_debit(SvAction::Undo, 50, [0x20, 0x01], [0x10, 0x00])
        .unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.card().sv_balance(), 500);
}

/// Inside a session the SV signature arrives postponed in the close
/// response and is verified there
#[test]
fn sv_reload_in_session_verifies_the_postponed_signature() {
    let mut close_response = vec![0x03, 0x61, 0x62, 0x63];
    close_response.extend_from_slice(&[0x0D; 8]);
    close_response.extend_from_slice(&[0x90, 0x00]);

    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("01 02 03 04 05 06 07 08 03 30 79 90 00"), // open, extended
        sv_get_response(0xAA, 4, 1000, true, true),
        hex("90 00"), // reload: signature postponed
        close_response,
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(8);
    let mut transaction = calypso::CardTransaction::new(transceiver, extended_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Load)
        .unwrap();
    transaction.prepare_sv_get(SvOperation::Reload).unwrap();
    transaction
        .prepare_sv_reload(100, [0x20, 0x01], [0x09, 0x30], [0x00, 0x00])
        .unwrap();
    transaction.prepare_close_secure_session(false).unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.session_state(), SessionState::Closed);
    assert_eq!(transaction.card().sv_balance(), 1100);
    assert_eq!(
        transaction.card().sv().operation_signature,
        hex("61 62 63")
    );
    let calls = calls.borrow();
    assert!(calls.iter().any(|c| c == "check_session_mac len=8"));
    assert!(calls.iter().any(|c| c == "check_sv_mac len=3"));
}

/// A refused postponed SV signature fails the close
#[test]
fn invalid_postponed_sv_signature_is_fatal() {
    let mut close_response = vec![0x03, 0x61, 0x62, 0x63];
    close_response.extend_from_slice(&[0x0D; 8]);
    close_response.extend_from_slice(&[0x90, 0x00]);

    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("01 02 03 04 05 06 07 08 03 30 79 90 00"),
        sv_get_response(0xAA, 4, 1000, true, true),
        hex("90 00"),
        close_response,
        hex("69 85"), // abort after the failure
    ]);
    let (mut provider, _calls) = RecordingCryptoProvider::new(8);
    provider.sv_mac_valid = false;
    let mut transaction = calypso::CardTransaction::new(transceiver, extended_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Load)
        .unwrap();
    transaction.prepare_sv_get(SvOperation::Reload).unwrap();
    transaction
        .prepare_sv_reload(100, [0x20, 0x01], [0x09, 0x30], [0x00, 0x00])
        .unwrap();
    transaction.prepare_close_secure_session(false).unwrap();
    let err = transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap_err();

    assert_eq!(
        err.kind(),
        calypso::TransactionErrorKind::InvalidCardMac
    );
}
