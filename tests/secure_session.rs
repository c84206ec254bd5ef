//! Secure-session lifecycle: open/read/close, abort rollback,
//! mid-session encryption toggles, ratification, desynchronisation.

extern crate calypso;

mod common;

use calypso::{
    ChannelControl, ProtocolErrorKind, SessionState, TransactionErrorKind, WriteAccessLevel,
};

use common::{compat_card, extended_card, hex, MockTransceiver, RecordingCryptoProvider};

/// Open, read a record, close — compatibility mode (4-byte MAC)
#[test]
fn open_read_close_in_compatibility_mode() {
    let record: Vec<u8> = (0x01..=0x1D).collect();
    let mut read_response = record.clone();
    read_response.extend_from_slice(&[0x90, 0x00]);

    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("03 0F 00 00 00 00 00 90 00"),
        read_response,
        hex("DE AD BE EF 90 00"),
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Debit)
        .unwrap();
    transaction.prepare_read_record(0x07, 1).unwrap();
    transaction.prepare_close_secure_session(false).unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.session_state(), SessionState::Closed);
    assert_eq!(
        transaction
            .card()
            .ef_by_sfi(0x07)
            .unwrap()
            .data()
            .content(1)
            .unwrap(),
        &record[..]
    );
    // A ratified 7-byte open response leaves the key identifiers to
    // the SAM
    assert!(transaction.card().is_ratified());

    let calls = calls.borrow();
    let expected: Vec<&str> = vec![
        "init_context",
        "init_mac kif=FF kvc=FF",
        "update len=5",  // read request
        "update len=31", // read response
        "finalize",
        "check_session_mac len=4",
    ];
    assert_eq!(calls.as_slice(), &expected[..]);

    // Open carries the 4-byte terminal challenge, close the 4-byte MAC
    let requests = requests.borrow();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0], hex("00 8A 03 01 04 11 11 11 11 00"));
    assert_eq!(requests[2], hex("00 8E 00 00 04 AA AA AA AA 00"));
}

/// An error inside the session aborts it and restores the image to
/// the open-session snapshot
#[test]
fn session_abort_restores_the_image() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("AA BB 90 00"),             // initial read, before the session
        hex("01 02 03 00 00 00 00 90 00"), // open (short ratified form)
        hex("90 00"),                   // update record
        hex("69 82"),                   // read refused -> error
        hex("69 85"),                   // abort exchange
    ]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction.prepare_read_record(0x07, 1).unwrap();
    transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap();
    assert_eq!(
        transaction
            .card()
            .ef_by_sfi(0x07)
            .unwrap()
            .data()
            .content(1)
            .unwrap(),
        &[0xAA, 0xBB]
    );

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Load)
        .unwrap();
    transaction
        .prepare_update_record(0x07, 1, &[0x11, 0x22])
        .unwrap();
    transaction.prepare_read_record(0x08, 1).unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();

    assert_eq!(
        err.kind(),
        TransactionErrorKind::UnexpectedCommandStatus {
            kind: ProtocolErrorKind::SecurityContext,
        }
    );
    assert_eq!(transaction.session_state(), SessionState::Aborted);
    // The update observed mid-session is rolled back
    assert_eq!(
        transaction
            .card()
            .ef_by_sfi(0x07)
            .unwrap()
            .data()
            .content(1)
            .unwrap(),
        &[0xAA, 0xBB]
    );
    assert!(transaction.card().ef_by_sfi(0x08).is_none());
}

/// Encryption toggled on for one command mid-session and off again
#[test]
fn encryption_toggle_covers_only_the_middle_command() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("01 02 03 04 05 06 07 08 03 30 79 90 00"), // open, extended
        hex("A1 A2 A3 A4 90 00"),                      // first read
        hex("90 00"),                                  // MSS encryption on
        common::toy_cipher(&hex("90 00")),             // ciphered update answer
        common::toy_cipher(&hex("90 00")),             // ciphered MSS off answer
        hex("B1 B2 B3 B4 90 00"),                      // second read
        hex("0A 0B 0C 0D 0A 0B 0C 0D 90 00"),          // close, 8-byte MAC
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(8);
    let mut transaction = calypso::CardTransaction::new(transceiver, extended_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Debit)
        .unwrap();
    transaction.prepare_read_record(0x07, 1).unwrap();
    transaction.prepare_activate_encryption().unwrap();
    transaction
        .prepare_update_record(0x07, 1, &[0xAA, 0xBB])
        .unwrap();
    transaction.prepare_deactivate_encryption().unwrap();
    transaction.prepare_read_record(0x07, 2).unwrap();
    transaction.prepare_close_secure_session(false).unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.session_state(), SessionState::Closed);
    assert!(transaction.card().is_manage_secure_session_authorized());
    assert_eq!(
        transaction
            .card()
            .ef_by_sfi(0x07)
            .unwrap()
            .data()
            .content(1)
            .unwrap(),
        &[0xAA, 0xBB]
    );
    assert_eq!(
        transaction
            .card()
            .ef_by_sfi(0x07)
            .unwrap()
            .data()
            .content(2)
            .unwrap(),
        &[0xB1, 0xB2, 0xB3, 0xB4]
    );

    let calls = calls.borrow();
    // Every data exchange feeds the MAC with its request then its
    // response; only the exchanges between the two toggles are
    // ciphered
    let updates: Vec<&String> = calls.iter().filter(|c| c.starts_with("update")).collect();
    assert_eq!(updates.len(), 10);
    let ciphered: Vec<&&String> = updates
        .iter()
        .filter(|c| c.starts_with("update_ciphered"))
        .collect();
    assert_eq!(ciphered.len(), 4); // update record + MSS off, request and response each
    let activate = calls
        .iter()
        .position(|c| c == "activate_encryption")
        .unwrap();
    let deactivate = calls
        .iter()
        .position(|c| c == "deactivate_encryption")
        .unwrap();
    assert!(calls[activate + 1..deactivate]
        .iter()
        .filter(|c| c.starts_with("update"))
        .all(|c| c.starts_with("update_ciphered")));
    assert_eq!(*calls.last().unwrap(), "check_session_mac len=8");
}

/// Close with ratification asked keeps the session in the closing
/// state until the ratification exchange went through
#[test]
fn ratification_completes_the_close() {
    let (transceiver, requests) = MockTransceiver::new(vec![
        hex("01 02 03 00 00 00 00 90 00"),
        hex("DE AD BE EF 90 00"),
        hex("6B 00"), // the ratification read is expected to fail
    ]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Debit)
        .unwrap();
    transaction.prepare_close_secure_session(true).unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.session_state(), SessionState::Closed);
    let requests = requests.borrow();
    // Close asked for ratification (P1=80), then the fake read
    assert_eq!(requests[1][2], 0x80);
    assert_eq!(requests[2], hex("00 B2 00 00 00"));
}

/// A missing response is fatal
#[test]
fn desynchronisation_is_inconsistent_data() {
    let (transceiver, _requests) = MockTransceiver::new(vec![hex("AA 90 00")]);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card());

    transaction.prepare_read_record(0x07, 1).unwrap();
    transaction.prepare_read_record(0x07, 2).unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();
    assert_eq!(err.kind(), TransactionErrorKind::InconsistentData);
}

/// Against a pre-opened session context, anticipated responses are
/// fed to the MAC before transmission and checked afterwards
#[test]
fn pre_open_session_synchronizes_with_anticipated_responses() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("01 02 03 00 00 00 00 90 00"), // open
        hex("90 00"),                      // update (matches anticipation)
        hex("AA BB 90 00"),                // read (not anticipatable)
        hex("DE AD BE EF 90 00"),          // close
    ]);
    let (provider, calls) = RecordingCryptoProvider::new(4);
    let mut card = compat_card();
    card.set_pre_open(WriteAccessLevel::Load, hex("01 02 03 00 00 00 00"));
    let mut transaction =
        calypso::CardTransaction::new(transceiver, card).with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Load)
        .unwrap();
    transaction
        .prepare_update_record(0x07, 1, &[0x11, 0x22])
        .unwrap();
    transaction.prepare_read_record(0x07, 1).unwrap();
    transaction.prepare_close_secure_session(false).unwrap();
    transaction
        .process_commands(ChannelControl::CloseAfter)
        .unwrap();

    assert_eq!(transaction.session_state(), SessionState::Closed);
    // The update's request and anticipated response were digested
    // before its exchange; the read degraded the session to
    // post-response feeding
    let calls = calls.borrow();
    let updates: Vec<&String> = calls.iter().filter(|c| c.starts_with("update")).collect();
    assert_eq!(updates.len(), 4); // update req + anticipated, read req + response
}

/// A response diverging from the anticipated one is a session context
/// violation
#[test]
fn anticipated_mismatch_is_a_context_violation() {
    let (transceiver, _requests) = MockTransceiver::new(vec![
        hex("01 02 03 00 00 00 00 90 00"), // open
        hex("AB CD 90 00"),                // update answered unexpected data
        hex("69 85"),                      // abort exchange
    ]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut card = compat_card();
    card.set_pre_open(WriteAccessLevel::Load, hex("01 02 03 00 00 00 00"));
    let mut transaction =
        calypso::CardTransaction::new(transceiver, card).with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Load)
        .unwrap();
    transaction
        .prepare_update_record(0x07, 1, &[0x11, 0x22])
        .unwrap();
    let err = transaction
        .process_commands(ChannelControl::KeepOpen)
        .unwrap_err();
    assert_eq!(err.kind(), TransactionErrorKind::SessionContextViolation);
    assert_eq!(transaction.session_state(), SessionState::Aborted);
}

/// Two sessions cannot be planned at once
#[test]
fn only_one_session_at_a_time() {
    let (transceiver, _requests) = MockTransceiver::new(vec![]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    transaction
        .prepare_open_secure_session(WriteAccessLevel::Debit)
        .unwrap();
    let err = transaction
        .prepare_open_secure_session(WriteAccessLevel::Debit)
        .unwrap_err();
    assert_eq!(err.kind(), TransactionErrorKind::IllegalState);
}

/// Modifying commands outside a session are refused in secure mode
#[test]
fn modifying_command_needs_a_session_in_secure_mode() {
    let (transceiver, _requests) = MockTransceiver::new(vec![]);
    let (provider, _calls) = RecordingCryptoProvider::new(4);
    let mut transaction = calypso::CardTransaction::new(transceiver, compat_card())
        .with_crypto_provider(provider);

    let err = transaction
        .prepare_update_record(0x07, 1, &[0x00])
        .unwrap_err();
    assert_eq!(err.kind(), TransactionErrorKind::IllegalState);
}
