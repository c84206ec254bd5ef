//! In-memory image of the selected Calypso card
//!
//! The image is created at selection time from the FCI, mutated only by
//! the response parsers of the command library, and dropped with the
//! transaction. A snapshot of the file contents is taken when a secure
//! session opens so that an aborted session can roll every observed
//! modification back.

pub mod file;
pub mod product;
pub mod sv;

pub use self::file::{DirectoryHeader, ElementaryFile, FileData, FileHeader, FileType};
pub use self::product::{ProductType, StartupInfo};
pub use self::sv::{SvData, SvDebitLogRecord, SvLoadLogRecord};

use apdu::CardClass;
use error::{ProtocolError, ProtocolErrorKind::DataOutOfBounds};
use tlv;

/// FCI template tag
const TAG_FCI_TEMPLATE: u16 = 0x6F;

/// DF name (AID) tag
const TAG_DF_NAME: u16 = 0x84;

/// FCI proprietary template tag
const TAG_FCI_PROPRIETARY_TEMPLATE: u16 = 0xA5;

/// FCI issuer discretionary data tag
const TAG_FCI_ISSUER_DISCRETIONARY_DATA: u16 = 0xBF0C;

/// Application serial number tag
const TAG_APPLICATION_SERIAL_NUMBER: u16 = 0xC7;

/// Discretionary data (startup information) tag
const TAG_DISCRETIONARY_DATA: u16 = 0x53;

/// Default modifications budget of legacy cards, which count commands
/// instead of bytes
const LEGACY_MODIFICATIONS_LIMIT: usize = 6;

bitflags! {
    /// Flags byte of the Open Secure Session response
    pub struct SessionFlags: u8 {
        /// The previous secure session was ratified
        const RATIFIED = 0x01;

        /// Manage Secure Session is authorised within this session
        const MANAGE_SECURE_SESSION = 0x02;
    }
}

/// Session write access levels, ordered from the most to the least
/// privileged key
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum WriteAccessLevel {
    /// Issuer key (key #1)
    Personalization = 1,

    /// Load key (key #2)
    Load = 2,

    /// Debit key (key #3)
    Debit = 3,
}

impl WriteAccessLevel {
    /// The key index carried in the Open Secure Session P1
    pub fn key_index(self) -> u8 {
        self as u8
    }
}

/// Secure-session related state mirrored from card responses
#[derive(Clone, Debug, Default)]
struct SessionInfo {
    ratified: bool,
    manage_secure_session_authorized: bool,
    kif: Option<u8>,
    kvc: Option<u8>,
    pre_open_write_access_level: Option<WriteAccessLevel>,
    pre_open_data: Option<Vec<u8>>,
}

/// The in-memory mirror of the selected card
#[derive(Clone, Debug)]
pub struct CalypsoCard {
    df_name: Vec<u8>,
    serial_number: Vec<u8>,
    startup_info: StartupInfo,
    product_type: ProductType,
    df_invalidated: bool,
    traceability_information: Vec<u8>,
    directory_header: Option<DirectoryHeader>,
    files: Vec<ElementaryFile>,
    files_backup: Vec<ElementaryFile>,
    session: SessionInfo,
    challenge: Option<Vec<u8>>,
    pin_attempts: Option<u8>,
    sv: SvData,
}

impl CalypsoCard {
    /// Build the image from the FCI returned by the application
    /// selection (tags 6F / 84 / A5 / BF0C / C7 / 53)
    pub fn from_fci(fci: &[u8]) -> Result<Self, ProtocolError> {
        let (df_name, serial_number, startup_info) = parse_fci(fci)?;

        Ok(Self {
            df_name,
            serial_number,
            startup_info,
            product_type: startup_info.product_type(),
            df_invalidated: false,
            traceability_information: Vec::new(),
            directory_header: None,
            files: Vec::new(),
            files_backup: Vec::new(),
            session: SessionInfo::default(),
            challenge: None,
            pin_attempts: None,
            sv: SvData::default(),
        })
    }

    /// Refresh the identification data from a re-read FCI (Get Data)
    pub(crate) fn apply_fci(&mut self, fci: &[u8]) -> Result<(), ProtocolError> {
        let (df_name, serial_number, startup_info) = parse_fci(fci)?;
        self.df_name = df_name;
        self.serial_number = serial_number;
        self.startup_info = startup_info;
        self.product_type = startup_info.product_type();
        Ok(())
    }

    /// DF name (AID) of the selected application
    pub fn df_name(&self) -> &[u8] {
        &self.df_name
    }

    /// Application serial number
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    /// Startup information from the FCI discretionary data
    pub fn startup_info(&self) -> &StartupInfo {
        &self.startup_info
    }

    /// Product family of the card
    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    /// Class byte for regular commands
    pub fn card_class(&self) -> CardClass {
        self.product_type.card_class()
    }

    /// Class byte for Stored Value commands
    pub fn sv_card_class(&self) -> CardClass {
        self.product_type.sv_card_class()
    }

    /// Does the card support the extended mode?
    pub fn is_extended_mode_supported(&self) -> bool {
        self.startup_info.extended_mode_supported()
    }

    /// Does the card hold a PIN?
    pub fn is_pin_feature_available(&self) -> bool {
        self.startup_info.has_pin()
    }

    /// Does the card embed the Stored Value application?
    pub fn is_sv_feature_available(&self) -> bool {
        self.startup_info.has_stored_value()
    }

    /// Is the current DF invalidated?
    pub fn is_df_invalidated(&self) -> bool {
        self.df_invalidated
    }

    pub(crate) fn set_df_invalidated(&mut self, invalidated: bool) {
        self.df_invalidated = invalidated;
    }

    /// Traceability information from Get Data
    pub fn traceability_information(&self) -> &[u8] {
        &self.traceability_information
    }

    pub(crate) fn set_traceability_information(&mut self, data: Vec<u8>) {
        self.traceability_information = data;
    }

    /// Header of the current DF, when observed
    pub fn directory_header(&self) -> Option<&DirectoryHeader> {
        self.directory_header.as_ref()
    }

    pub(crate) fn set_directory_header(&mut self, header: DirectoryHeader) {
        self.directory_header = Some(header);
    }

    /// Does the card count session modifications in bytes (as opposed
    /// to a fixed number of commands)?
    pub fn is_modifications_counter_in_bytes(&self) -> bool {
        self.product_type != ProductType::PrimeRevision2
    }

    /// Session modifications budget: bytes for current cards, command
    /// count for legacy ones
    pub fn modifications_counter(&self) -> usize {
        if self.is_modifications_counter_in_bytes() {
            self.startup_info.buffer_size()
        } else {
            LEGACY_MODIFICATIONS_LIMIT
        }
    }

    //
    // File tree
    //

    /// Find an elementary file by SFI
    pub fn ef_by_sfi(&self, sfi: u8) -> Option<&ElementaryFile> {
        self.files.iter().find(|ef| ef.sfi() == sfi)
    }

    /// Find an elementary file by LID (requires its header to be known)
    pub fn ef_by_lid(&self, lid: u16) -> Option<&ElementaryFile> {
        self.files
            .iter()
            .find(|ef| ef.header().map(|h| h.lid == lid).unwrap_or(false))
    }

    pub(crate) fn ef_or_create(&mut self, sfi: u8) -> &mut ElementaryFile {
        if let Some(position) = self.files.iter().position(|ef| ef.sfi() == sfi) {
            return &mut self.files[position];
        }
        self.files.push(ElementaryFile::new(sfi));
        self.files.last_mut().unwrap_or_else(|| unreachable!())
    }

    pub(crate) fn set_file_header(&mut self, sfi: u8, header: FileHeader) {
        self.ef_or_create(sfi).set_header(header);
    }

    /// Replace the content of a record
    pub(crate) fn set_record_content(&mut self, sfi: u8, record: u8, data: Vec<u8>) {
        self.ef_or_create(sfi).data_mut().set_content(record, data);
    }

    /// Write into a record at an offset, padding with zeros
    pub(crate) fn set_record_content_at(&mut self, sfi: u8, record: u8, data: &[u8], offset: usize) {
        self.ef_or_create(sfi)
            .data_mut()
            .set_content_at(record, data, offset);
    }

    /// OR data on top of a record at an offset
    pub(crate) fn fill_record_content_at(&mut self, sfi: u8, record: u8, data: &[u8], offset: usize) {
        self.ef_or_create(sfi)
            .data_mut()
            .fill_content_at(record, data, offset);
    }

    /// Insert content at the head of a cyclic file
    pub(crate) fn add_cyclic_content(&mut self, sfi: u8, data: Vec<u8>) {
        let ef = self.ef_or_create(sfi);
        let records_number = ef.records_number();
        ef.data_mut().add_cyclic_content(records_number, data);
    }

    /// Set a counter value in a counters file
    pub(crate) fn set_counter(&mut self, sfi: u8, counter_number: u8, value: u32) {
        self.ef_or_create(sfi)
            .data_mut()
            .set_counter(counter_number, value);
    }

    /// Value of a counter, when observed
    pub fn counter(&self, sfi: u8, counter_number: u8) -> Option<u32> {
        self.ef_by_sfi(sfi)
            .and_then(|ef| ef.data().counter(counter_number))
    }

    /// Snapshot the file contents (taken when a secure session opens)
    pub(crate) fn backup_files(&mut self) {
        self.files_backup = self.files.clone();
    }

    /// Revert the file contents to the snapshot (session abort)
    pub(crate) fn restore_files(&mut self) {
        self.files = self.files_backup.clone();
    }

    //
    // Secure session state
    //

    /// Record the data parsed from an Open Secure Session response
    pub(crate) fn set_open_session_info(
        &mut self,
        ratified: bool,
        manage_secure_session_authorized: bool,
        kif: Option<u8>,
        kvc: Option<u8>,
    ) {
        self.session.ratified = ratified;
        self.session.manage_secure_session_authorized = manage_secure_session_authorized;
        self.session.kif = kif;
        self.session.kvc = kvc;
    }

    /// Was the previous session ratified?
    pub fn is_ratified(&self) -> bool {
        self.session.ratified
    }

    /// Is Manage Secure Session authorised in the open session?
    pub fn is_manage_secure_session_authorized(&self) -> bool {
        self.session.manage_secure_session_authorized
    }

    /// KIF of the open session's key
    pub fn session_kif(&self) -> Option<u8> {
        self.session.kif
    }

    /// KVC of the open session's key
    pub fn session_kvc(&self) -> Option<u8> {
        self.session.kvc
    }

    /// Record the pre-open context fixed during the selection phase
    pub fn set_pre_open(&mut self, level: WriteAccessLevel, data: Vec<u8>) {
        self.session.pre_open_write_access_level = Some(level);
        self.session.pre_open_data = Some(data);
    }

    /// Write access level fixed by a pre-opened session, if any
    pub fn pre_open_write_access_level(&self) -> Option<WriteAccessLevel> {
        self.session.pre_open_write_access_level
    }

    /// Data captured by the pre-opened session, if any
    pub fn pre_open_data(&self) -> Option<&[u8]> {
        self.session.pre_open_data.as_ref().map(Vec::as_slice)
    }

    pub(crate) fn clear_pre_open(&mut self) {
        self.session.pre_open_write_access_level = None;
        self.session.pre_open_data = None;
    }

    //
    // Challenge and PIN
    //

    /// Current card challenge (4 or 8 bytes)
    pub fn challenge(&self) -> Option<&[u8]> {
        self.challenge.as_ref().map(Vec::as_slice)
    }

    pub(crate) fn set_challenge(&mut self, challenge: Vec<u8>) {
        self.challenge = Some(challenge);
    }

    /// PIN presentation attempts remaining (0 to 3), when observed
    pub fn pin_attempts_remaining(&self) -> Option<u8> {
        self.pin_attempts
    }

    pub(crate) fn set_pin_attempts(&mut self, attempts: u8) {
        self.pin_attempts = Some(attempts);
    }

    //
    // Stored Value
    //

    /// Stored Value context
    pub fn sv(&self) -> &SvData {
        &self.sv
    }

    /// Signed SV balance
    pub fn sv_balance(&self) -> i32 {
        self.sv.balance
    }

    /// Last SV transaction number
    pub fn sv_transaction_number(&self) -> u16 {
        self.sv.last_transaction_number
    }

    /// Record everything parsed from an SV Get response
    pub(crate) fn set_sv_data(
        &mut self,
        kvc: u8,
        sv_get_request_header: Vec<u8>,
        sv_get_response: Vec<u8>,
        balance: i32,
        transaction_number: u16,
        load_log: Option<SvLoadLogRecord>,
        debit_log: Option<SvDebitLogRecord>,
    ) {
        self.sv.kvc = kvc;
        self.sv.sv_get_request_header = sv_get_request_header;
        self.sv.sv_get_response = sv_get_response;
        self.sv.balance = balance;
        self.sv.last_transaction_number = transaction_number;
        if load_log.is_some() {
            self.sv.load_log = load_log;
        }
        if debit_log.is_some() {
            self.sv.debit_log = debit_log;
        }
        self.sv.operation_complete = false;
    }

    /// Update balance and transaction number after a completed SV
    /// operation
    pub(crate) fn update_sv_data(&mut self, balance: i32, transaction_number: u16) {
        self.sv.balance = balance;
        self.sv.last_transaction_number = transaction_number;
        self.sv.operation_complete = true;
    }

    pub(crate) fn set_sv_load_log(&mut self, record: SvLoadLogRecord) {
        self.sv.load_log = Some(record);
    }

    pub(crate) fn set_sv_debit_log(&mut self, record: SvDebitLogRecord) {
        self.sv.debit_log = Some(record);
    }

    pub(crate) fn set_sv_operation_signature(&mut self, signature: Vec<u8>) {
        self.sv.operation_signature = signature;
    }
}

/// Walk the FCI template down to the DF name, serial number and
/// startup information
fn parse_fci(fci: &[u8]) -> Result<(Vec<u8>, Vec<u8>, StartupInfo), ProtocolError> {
    let template = tlv::find(fci, TAG_FCI_TEMPLATE)?
        .ok_or_else(|| err!(DataOutOfBounds, "FCI template (tag 6F) not found"))?;

    let df_name = tlv::find(&template, TAG_DF_NAME)?
        .ok_or_else(|| err!(DataOutOfBounds, "DF name (tag 84) not found"))?;

    let proprietary = tlv::find(&template, TAG_FCI_PROPRIETARY_TEMPLATE)?
        .ok_or_else(|| err!(DataOutOfBounds, "proprietary template (tag A5) not found"))?;

    let discretionary = tlv::find(&proprietary, TAG_FCI_ISSUER_DISCRETIONARY_DATA)?
        .ok_or_else(|| err!(DataOutOfBounds, "issuer discretionary data (tag BF0C) not found"))?;

    let serial_number = tlv::find(&discretionary, TAG_APPLICATION_SERIAL_NUMBER)?
        .ok_or_else(|| err!(DataOutOfBounds, "serial number (tag C7) not found"))?;

    let startup_bytes = tlv::find(&discretionary, TAG_DISCRETIONARY_DATA)?
        .ok_or_else(|| err!(DataOutOfBounds, "startup information (tag 53) not found"))?;

    let startup_info = StartupInfo::parse(&startup_bytes)?;

    Ok((df_name, serial_number, startup_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fci() -> Vec<u8> {
        // 6F { 84: AID, A5 { BF0C { C7: serial, 53: startup } } }
        let mut fci = vec![
            0x6F, 0x22, 0x84, 0x08, 0x31, 0x54, 0x49, 0x43, 0x2E, 0x49, 0x43, 0x41, 0xA5, 0x16,
            0xBF, 0x0C, 0x13, 0xC7, 0x08,
        ];
        fci.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44]);
        fci.extend_from_slice(&[0x53, 0x07, 0x0A, 0x3C, 0x2F, 0x05, 0x01, 0x31, 0x00]);
        fci
    }

    #[test]
    fn image_is_built_from_fci() {
        let card = CalypsoCard::from_fci(&fci()).unwrap();
        assert_eq!(card.df_name(), &[0x31, 0x54, 0x49, 0x43, 0x2E, 0x49, 0x43, 0x41]);
        assert_eq!(
            card.serial_number(),
            &[0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44]
        );
        assert_eq!(card.product_type(), ProductType::PrimeRevision3);
        assert!(card.is_extended_mode_supported());
        assert!(card.is_pin_feature_available());
        assert_eq!(card.modifications_counter(), 430);
    }

    #[test]
    fn fci_without_template_is_refused() {
        assert!(CalypsoCard::from_fci(&[0x84, 0x01, 0x00]).is_err());
    }

    #[test]
    fn backup_and_restore_revert_file_contents() {
        let mut card = CalypsoCard::from_fci(&fci()).unwrap();
        card.set_record_content(0x07, 1, vec![0x01, 0x02]);
        card.backup_files();
        card.set_record_content(0x07, 1, vec![0xFF, 0xFF]);
        card.set_record_content(0x08, 1, vec![0xEE]);
        card.restore_files();
        assert_eq!(
            card.ef_by_sfi(0x07).unwrap().data().content(1).unwrap(),
            &[0x01, 0x02]
        );
        assert!(card.ef_by_sfi(0x08).is_none());
    }

    #[test]
    fn sv_update_marks_operation_complete() {
        let mut card = CalypsoCard::from_fci(&fci()).unwrap();
        card.set_sv_data(0xAA, vec![], vec![], 1000, 4, None, None);
        assert!(!card.sv().operation_complete);
        card.update_sv_data(1100, 5);
        assert_eq!(card.sv_balance(), 1100);
        assert_eq!(card.sv_transaction_number(), 5);
        assert!(card.sv().operation_complete);
    }

    #[test]
    fn write_access_level_key_indexes() {
        assert_eq!(WriteAccessLevel::Personalization.key_index(), 1);
        assert_eq!(WriteAccessLevel::Load.key_index(), 2);
        assert_eq!(WriteAccessLevel::Debit.key_index(), 3);
    }
}
