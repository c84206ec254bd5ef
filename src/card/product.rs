//! Card product identification
//!
//! The startup information returned in the FCI discretionary data
//! drives everything the transaction needs to know about the card's
//! capabilities: product family, session buffer size, and optional
//! feature availability (PIN, Stored Value, extended mode).

use apdu::CardClass;
use error::{ProtocolError, ProtocolErrorKind::DataOutOfBounds};

/// Application type bit: the card supports a PIN
const APP_TYPE_WITH_PIN: u8 = 0x01;

/// Application type bit: the card embeds the Stored Value application
const APP_TYPE_WITH_STORED_VALUE: u8 = 0x02;

/// Application type bit: a ratification command is required (the card
/// does not ratify on deselect)
const APP_TYPE_RATIFICATION_COMMAND_REQUIRED: u8 = 0x04;

/// Application type bit: the card supports the extended mode
/// (8-byte session MACs, Manage Secure Session)
const APP_TYPE_EXTENDED_MODE: u8 = 0x08;

/// Session buffer size in bytes, indexed by the buffer size indicator
/// of the startup information
const BUFFER_SIZE_BY_INDICATOR: [usize; 16] = [
    0, 0, 0, 0, 0, 0, 215, 256, 304, 362, 430, 512, 608, 724, 861, 1024,
];

/// Calypso product families
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProductType {
    /// Legacy product line, revision 1 or 2 (proprietary class byte)
    PrimeRevision2,

    /// Current product line
    PrimeRevision3,

    /// Calypso Light
    Light,

    /// Calypso Basic
    Basic,

    /// Product could not be identified from the application type
    Unknown,
}

impl ProductType {
    /// Derive the product family from the application type byte
    pub fn from_application_type(app_type: u8) -> Self {
        match app_type {
            0x00 => ProductType::Unknown,
            0x01..=0x1F => ProductType::PrimeRevision2,
            0x90..=0x97 => ProductType::Light,
            0x98..=0x9F => ProductType::Basic,
            _ => ProductType::PrimeRevision3,
        }
    }

    /// The class byte used for regular commands to this product
    pub fn card_class(self) -> CardClass {
        match self {
            ProductType::PrimeRevision2 => CardClass::Legacy,
            _ => CardClass::Iso,
        }
    }

    /// The class byte used for Stored Value commands to this product
    pub fn sv_card_class(self) -> CardClass {
        match self {
            ProductType::PrimeRevision2 => CardClass::LegacyStoredValue,
            _ => CardClass::Iso,
        }
    }
}

/// The 7 bytes of startup information from the FCI discretionary data
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StartupInfo {
    /// Session modifications buffer size indicator
    pub buffer_size_indicator: u8,

    /// Card platform (chip) identifier
    pub platform: u8,

    /// Application type, carrying the feature bits
    pub application_type: u8,

    /// Application subtype (file structure reference)
    pub application_subtype: u8,

    /// Software issuer identifier
    pub software_issuer: u8,

    /// Software version (MSB)
    pub software_version: u8,

    /// Software revision (LSB)
    pub software_revision: u8,
}

impl StartupInfo {
    /// Parse the startup information from its 7-byte encoding
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            bytes.len() >= 7,
            DataOutOfBounds,
            "startup information too short: {} bytes (expected 7)",
            bytes.len()
        );
        Ok(Self {
            buffer_size_indicator: bytes[0],
            platform: bytes[1],
            application_type: bytes[2],
            application_subtype: bytes[3],
            software_issuer: bytes[4],
            software_version: bytes[5],
            software_revision: bytes[6],
        })
    }

    /// The product family encoded in the application type
    pub fn product_type(&self) -> ProductType {
        ProductType::from_application_type(self.application_type)
    }

    /// Does the card hold a PIN?
    pub fn has_pin(&self) -> bool {
        self.application_type & APP_TYPE_WITH_PIN != 0
    }

    /// Does the card embed the Stored Value application?
    pub fn has_stored_value(&self) -> bool {
        self.application_type & APP_TYPE_WITH_STORED_VALUE != 0
    }

    /// Must the terminal send a ratification command (as opposed to the
    /// card ratifying on deselect)?
    pub fn ratification_command_required(&self) -> bool {
        self.application_type & APP_TYPE_RATIFICATION_COMMAND_REQUIRED != 0
    }

    /// Does the card support the extended mode?
    pub fn extended_mode_supported(&self) -> bool {
        self.application_type & APP_TYPE_EXTENDED_MODE != 0
            && self.product_type() == ProductType::PrimeRevision3
    }

    /// The session modifications buffer size in bytes. Legacy cards
    /// count modifications instead of bytes and report zero here.
    pub fn buffer_size(&self) -> usize {
        BUFFER_SIZE_BY_INDICATOR
            .get(usize::from(self.buffer_size_indicator))
            .cloned()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_info_fields() {
        let si = StartupInfo::parse(&[0x0A, 0x3C, 0x2F, 0x05, 0x01, 0x31, 0x00]).unwrap();
        assert_eq!(si.buffer_size_indicator, 0x0A);
        assert_eq!(si.product_type(), ProductType::PrimeRevision3);
        assert!(si.has_pin());
        assert!(si.has_stored_value());
        assert!(si.extended_mode_supported());
        assert_eq!(si.buffer_size(), 430);
    }

    #[test]
    fn legacy_product_uses_proprietary_classes() {
        assert_eq!(ProductType::PrimeRevision2.card_class(), CardClass::Legacy);
        assert_eq!(
            ProductType::PrimeRevision2.sv_card_class(),
            CardClass::LegacyStoredValue
        );
        assert_eq!(ProductType::PrimeRevision3.card_class(), CardClass::Iso);
        assert_eq!(ProductType::PrimeRevision3.sv_card_class(), CardClass::Iso);
    }

    #[test]
    fn short_startup_info_is_refused() {
        assert!(StartupInfo::parse(&[0x0A, 0x3C]).is_err());
    }
}
