//! Default symmetric-crypto provider backed by a SAM
//!
//! Drives a SAM through its command set over an [`ApduTransceiver`].
//! Digest updates are buffered and flushed to the SAM in a single
//! exchange when the terminal MAC is needed; with session encryption
//! active each update is exchanged immediately, since the transformed
//! APDU is needed right away.

use apdu::{to_hex, ApduRequest, ApduResponse};
use command::sam::{
    CardCipherPinCommand, CardGenerateKeyCommand, DigestAuthenticateCommand, DigestCloseCommand,
    DigestInitCommand, DigestInternalAuthenticateCommand, DigestUpdateCommand, GetChallengeCommand,
    GiveRandomCommand, PinCipheringMode, PsoComputeSignatureCommand, PsoVerifySignatureCommand,
    ReadCeilingsCommand, ReadEventCounterCommand, ReadKeyParametersCommand, SelectDiversifierCommand,
    SvCheckCommand, SvPrepareCommand, SvPrepareOperation, UnlockCommand, WriteKeyCommand, SAM_CLA,
};
use sam::LegacySam;
use transceiver::{ApduTransceiver, CardRequest, CardResponse, ChannelControl};
use zeroize::Zeroize;

use super::{CryptoError, CryptoErrorKind, SvCommandSecurityData, SymmetricCryptoProvider};

/// Minimum length of a command APDU fed to the digest with encryption
/// active
const MIN_ENCRYPTED_COMMAND_LENGTH: usize = 5;

/// Minimum length of a response APDU fed to the digest with encryption
/// active
const MIN_ENCRYPTED_RESPONSE_LENGTH: usize = 2;

/// State of the running session digest
#[derive(Debug)]
struct DigestManager {
    extended_mode: bool,
    kif: u8,
    kvc: u8,
    open_session_data: Vec<u8>,
    pending_updates: Vec<Vec<u8>>,
    init_sent: bool,
    update_count: usize,
}

impl DigestManager {
    fn mac_length(&self) -> u8 {
        if self.extended_mode {
            8
        } else {
            4
        }
    }
}

/// The default [`SymmetricCryptoProvider`], driving a SAM
pub struct SamCryptoProvider {
    transceiver: Box<dyn ApduTransceiver>,
    sam: LegacySam,
    cla: u8,
    extended_mode: bool,
    card_diversifier: Option<Vec<u8>>,
    unlock_data: Option<Vec<u8>>,
    prepared: bool,
    digest: Option<DigestManager>,
    encryption_active: bool,
}

impl SamCryptoProvider {
    /// Create a provider over the SAM reachable through `transceiver`
    pub fn new(transceiver: Box<dyn ApduTransceiver>, sam: LegacySam) -> Self {
        Self {
            transceiver,
            sam,
            cla: SAM_CLA,
            extended_mode: false,
            card_diversifier: None,
            unlock_data: None,
            prepared: false,
            digest: None,
            encryption_active: false,
        }
    }

    /// Produce 8-byte challenges and MACs for extended-mode sessions
    pub fn with_extended_mode(mut self) -> Self {
        self.extended_mode = true;
        self
    }

    /// Diversify the session keys with the card serial number
    pub fn with_card_diversifier(mut self, diversifier: &[u8]) -> Self {
        self.card_diversifier = Some(diversifier.to_vec());
        self
    }

    /// Unlock the SAM with this secret before its first use
    pub fn with_unlock_data(mut self, unlock_data: &[u8]) -> Self {
        self.unlock_data = Some(unlock_data.to_vec());
        self
    }

    /// The SAM image maintained by this provider
    pub fn sam(&self) -> &LegacySam {
        &self.sam
    }

    fn exchange(&mut self, apdus: Vec<ApduRequest>) -> Result<CardResponse, CryptoError> {
        for apdu in &apdus {
            trace!("SAM > uuid={} apdu={}", apdu.uuid(), to_hex(apdu.bytes()));
        }
        let request = CardRequest::new(apdus, true);
        let response = self
            .transceiver
            .exchange(&request, ChannelControl::KeepOpen)?;
        for apdu in response.apdus() {
            trace!("SAM < apdu={}", to_hex(apdu.bytes()));
        }
        Ok(response)
    }

    fn exchange_one(&mut self, apdu: ApduRequest) -> Result<ApduResponse, CryptoError> {
        let mut responses = self.exchange(vec![apdu])?.into_apdus();
        match responses.pop() {
            Some(response) if responses.is_empty() => Ok(response),
            _ => fail!(
                CryptoErrorKind::CryptoIo,
                "SAM returned an unexpected number of responses"
            ),
        }
    }

    /// Unlock and diversifier selection, once per provider
    fn ensure_prepared(&mut self) -> Result<(), CryptoError> {
        if self.prepared {
            return Ok(());
        }

        if let Some(unlock_data) = self.unlock_data.clone() {
            let command = UnlockCommand::new(&unlock_data)?;
            let response = self.exchange_one(command.request(self.cla)?)?;
            command.check(&response)?;
        }

        if let Some(diversifier) = self.card_diversifier.clone() {
            let command = SelectDiversifierCommand::new(&diversifier)?;
            let response = self.exchange_one(command.request(self.cla)?)?;
            command.check(&response)?;
        }

        self.prepared = true;
        Ok(())
    }

    /// Send the Digest Init and any buffered updates in one exchange
    fn flush_digest(&mut self) -> Result<(), CryptoError> {
        let cla = self.cla;
        let (init, updates) = {
            let digest = match self.digest {
                Some(ref mut digest) => digest,
                None => fail!(CryptoErrorKind::Crypto, "no session digest in progress"),
            };
            let init = if digest.init_sent {
                None
            } else {
                digest.init_sent = true;
                Some(DigestInitCommand::new(
                    digest.extended_mode,
                    digest.kif,
                    digest.kvc,
                    digest.open_session_data.clone(),
                ))
            };
            let updates: Vec<DigestUpdateCommand> = digest
                .pending_updates
                .drain(..)
                .map(|apdu| DigestUpdateCommand::new(false, apdu))
                .collect();
            (init, updates)
        };

        if init.is_none() && updates.is_empty() {
            return Ok(());
        }

        let mut apdus = Vec::with_capacity(1 + updates.len());
        if let Some(ref init) = init {
            apdus.push(init.request(cla)?);
        }
        for update in &updates {
            apdus.push(update.request(cla)?);
        }

        let responses = self.exchange(apdus)?.into_apdus();
        let expected = updates.len() + if init.is_some() { 1 } else { 0 };

        let mut responses = responses.into_iter();
        if let Some(init) = init {
            match responses.next() {
                Some(response) => init.check(&response)?,
                None => fail!(CryptoErrorKind::CryptoIo, "SAM digest sequence interrupted"),
            }
        }
        let mut checked = 0;
        for update in &updates {
            match responses.next() {
                Some(response) => {
                    update.parse(&response)?;
                    checked += 1;
                }
                None => fail!(
                    CryptoErrorKind::CryptoIo,
                    "SAM digest sequence interrupted after {} of {} exchanges",
                    checked,
                    expected
                ),
            }
        }
        Ok(())
    }

    //
    // Administrative entry points (SAM image maintenance)
    //

    /// Read the parameters of a system key into the SAM image
    pub fn read_key_parameters(&mut self, kif: u8, kvc: u8) -> Result<(), CryptoError> {
        let command = ReadKeyParametersCommand::new(kif, kvc);
        let response = self.exchange_one(command.request(self.cla)?)?;
        let parameters = command.parse(&response)?;
        self.sam.set_key_parameters(kif, kvc, parameters);
        Ok(())
    }

    /// Read one record of event counters into the SAM image
    pub fn read_event_counters(&mut self, record: u8) -> Result<(), CryptoError> {
        let command = ReadEventCounterCommand::new(record)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        for (number, value) in command.parse(&response)? {
            self.sam.set_event_counter(number, value);
        }
        Ok(())
    }

    /// Read one record of event ceilings into the SAM image
    pub fn read_ceilings(&mut self, record: u8) -> Result<(), CryptoError> {
        let command = ReadCeilingsCommand::new(record)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        for (number, value) in command.parse(&response)? {
            self.sam.set_event_ceiling(number, value);
        }
        Ok(())
    }

    /// Load an enciphered key into the SAM key store
    pub fn write_key(
        &mut self,
        writing_mode: u8,
        key_reference: u8,
        key_data: &[u8],
    ) -> Result<(), CryptoError> {
        let command = WriteKeyCommand::new(writing_mode, key_reference, key_data)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        command.check(&response)?;
        Ok(())
    }

    /// Hand the card challenge to the SAM (outside-session ciphering)
    pub fn give_random(&mut self, random: &[u8]) -> Result<(), CryptoError> {
        let command = GiveRandomCommand::new(random)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        command.check(&response)?;
        Ok(())
    }

    /// Sign terminal data with a SAM system key
    pub fn compute_signature(
        &mut self,
        kif: u8,
        kvc: u8,
        data: &[u8],
        signature_length: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.ensure_prepared()?;
        let command = PsoComputeSignatureCommand::new(kif, kvc, data, signature_length)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    /// Verify a signature over terminal data with a SAM system key
    pub fn verify_signature(
        &mut self,
        kif: u8,
        kvc: u8,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        self.ensure_prepared()?;
        let command = PsoVerifySignatureCommand::new(kif, kvc, data, signature)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }
}

impl SymmetricCryptoProvider for SamCryptoProvider {
    fn init_terminal_secure_session_context(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.ensure_prepared()?;
        self.digest = None;
        self.encryption_active = false;
        let length = if self.extended_mode { 8 } else { 4 };
        let command = GetChallengeCommand::new(length)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn init_terminal_session_mac(
        &mut self,
        open_data_out: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<(), CryptoError> {
        ensure!(
            self.digest.is_none(),
            CryptoErrorKind::Crypto,
            "a session digest is already in progress"
        );
        self.digest = Some(DigestManager {
            extended_mode: self.extended_mode,
            kif,
            kvc,
            open_session_data: open_data_out.to_vec(),
            pending_updates: Vec::new(),
            init_sent: false,
            update_count: 0,
        });
        Ok(())
    }

    fn update_terminal_session_mac(&mut self, apdu: &[u8]) -> Result<Option<Vec<u8>>, CryptoError> {
        let encryption_active = self.encryption_active;
        {
            let digest = match self.digest {
                Some(ref mut digest) => digest,
                None => fail!(CryptoErrorKind::Crypto, "no session digest in progress"),
            };

            if encryption_active {
                let is_command = digest.update_count % 2 == 0;
                let minimum = if is_command {
                    MIN_ENCRYPTED_COMMAND_LENGTH
                } else {
                    MIN_ENCRYPTED_RESPONSE_LENGTH
                };
                ensure!(
                    apdu.len() >= minimum,
                    CryptoErrorKind::Crypto,
                    "ciphered digest update of {} bytes is below the {}-byte minimum",
                    apdu.len(),
                    minimum
                );
            } else {
                digest.pending_updates.push(apdu.to_vec());
                digest.update_count += 1;
                return Ok(None);
            }
        }

        // Encryption active: the transformed APDU is needed now
        self.flush_digest()?;
        let command = DigestUpdateCommand::new(true, apdu.to_vec());
        let response = self.exchange_one(command.request(self.cla)?)?;
        let transformed = command.parse(&response)?;
        if let Some(ref mut digest) = self.digest {
            digest.update_count += 1;
        }
        Ok(transformed)
    }

    fn finalize_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.flush_digest()?;
        let (close, request) = {
            let digest = match self.digest {
                Some(ref digest) => digest,
                None => fail!(CryptoErrorKind::Crypto, "no session digest in progress"),
            };
            let close = DigestCloseCommand::new(digest.mac_length());
            let request = close.request(self.cla)?;
            (close, request)
        };
        let response = self.exchange_one(request)?;
        let mac = close.parse(&response)?;
        self.digest = None;
        self.encryption_active = false;
        Ok(mac)
    }

    fn generate_terminal_session_mac(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.flush_digest()?;
        let command = DigestInternalAuthenticateCommand::new();
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn activate_encryption(&mut self) -> Result<(), CryptoError> {
        ensure!(
            !self.encryption_active,
            CryptoErrorKind::Crypto,
            "session encryption is already active"
        );
        self.flush_digest()?;
        self.encryption_active = true;
        Ok(())
    }

    fn deactivate_encryption(&mut self) -> Result<(), CryptoError> {
        ensure!(
            self.encryption_active,
            CryptoErrorKind::Crypto,
            "session encryption is not active"
        );
        self.encryption_active = false;
        Ok(())
    }

    fn is_card_session_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError> {
        let command = DigestAuthenticateCommand::new(mac.to_vec());
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn compute_sv_command_security_data(
        &mut self,
        data: &mut SvCommandSecurityData,
    ) -> Result<(), CryptoError> {
        self.ensure_prepared()?;
        let operation = match data.sv_command_partial_request().get(1) {
            Some(&0xB8) => SvPrepareOperation::Load,
            Some(&0xBA) => SvPrepareOperation::Debit,
            Some(&0xBC) => SvPrepareOperation::Undebit,
            other => fail!(
                CryptoErrorKind::Crypto,
                "partial SV request has no known instruction byte ({:?})",
                other
            ),
        };
        let command = SvPrepareCommand::new(
            operation,
            data.sv_get_request(),
            data.sv_get_response(),
            data.sv_command_partial_request(),
        );
        let response = self.exchange_one(command.request(self.cla)?)?;
        let (transaction_number, mac) = command.parse(&response)?;
        data.set_serial_number(self.sam.serial_number().to_vec());
        data.set_transaction_number(transaction_number);
        data.set_terminal_sv_mac(mac);
        Ok(())
    }

    fn is_card_sv_mac_valid(&mut self, mac: &[u8]) -> Result<bool, CryptoError> {
        let command = SvCheckCommand::new(mac)?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn cipher_pin_for_presentation(
        &mut self,
        card_challenge: &[u8],
        pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.ensure_prepared()?;
        let command = CardCipherPinCommand::new(
            PinCipheringMode::Presentation { pin: pin.to_vec() },
            card_challenge,
            kif,
            kvc,
        )?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn cipher_pin_for_modification(
        &mut self,
        card_challenge: &[u8],
        current_pin: &[u8],
        new_pin: &[u8],
        kif: u8,
        kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.ensure_prepared()?;
        let command = CardCipherPinCommand::new(
            PinCipheringMode::Modification {
                current_pin: current_pin.to_vec(),
                new_pin: new_pin.to_vec(),
            },
            card_challenge,
            kif,
            kvc,
        )?;
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }

    fn generate_ciphered_card_key(
        &mut self,
        card_challenge: &[u8],
        issuer_kif: u8,
        issuer_kvc: u8,
        target_kif: u8,
        target_kvc: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        self.ensure_prepared()?;
        let command = CardGenerateKeyCommand::new(
            card_challenge,
            issuer_kif,
            issuer_kvc,
            target_kif,
            target_kvc,
        );
        let response = self.exchange_one(command.request(self.cla)?)?;
        Ok(command.parse(&response)?)
    }
}

impl Drop for SamCryptoProvider {
    fn drop(&mut self) {
        if let Some(ref mut unlock_data) = self.unlock_data {
            unlock_data.zeroize();
        }
    }
}
