//! Thin selection filters for cards and SAMs
//!
//! Selection itself (sending the Select Application APDU, matching the
//! power-on data) belongs to the reader layer; these structs only carry
//! the filtering configuration it needs.

use error::{ProtocolError, ProtocolErrorKind::IllegalArgument};

/// Filter applied when selecting the card application
#[derive(Clone, Debug, Default)]
pub struct CardSelector {
    aid: Vec<u8>,
    power_on_data_regex: Option<String>,
    accept_invalidated: bool,
}

impl CardSelector {
    /// Filter on the application identifier (5 to 16 bytes)
    pub fn with_aid(mut self, aid: &[u8]) -> Result<Self, ProtocolError> {
        ensure!(
            aid.len() >= 5 && aid.len() <= 16,
            IllegalArgument,
            "AID length {} out of range [5, 16]",
            aid.len()
        );
        self.aid = aid.to_vec();
        Ok(self)
    }

    /// Filter on the reader's power-on data
    pub fn with_power_on_data_regex(mut self, regex: &str) -> Self {
        self.power_on_data_regex = Some(regex.to_string());
        self
    }

    /// Accept cards whose DF is invalidated (SW `6283` on selection)
    pub fn accept_invalidated(mut self) -> Self {
        self.accept_invalidated = true;
        self
    }

    /// The configured AID
    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    /// The configured power-on data filter
    pub fn power_on_data_regex(&self) -> Option<&str> {
        self.power_on_data_regex.as_ref().map(String::as_str)
    }

    /// Whether invalidated applications are accepted
    pub fn is_invalidated_accepted(&self) -> bool {
        self.accept_invalidated
    }
}

/// SAM product types, distinguished by the application type byte of
/// their ATR
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamProductType {
    /// SAM-C1, the common contact SAM
    SamC1,

    /// SAM S1Dx family
    SamS1Dx,

    /// SAM S1E1
    SamS1E1,

    /// HSM-C1 (rack SAM)
    HsmC1,

    /// CSAM-F. The ATR application-type mask of this product is not
    /// documented; the selector keeps a wildcard in its place.
    CsamF,
}

impl SamProductType {
    /// Application-type mask in the ATR regex. `??` marks the
    /// undocumented CSAM-F mask and is widened to a wildcard.
    fn application_type_mask(self) -> &'static str {
        match self {
            SamProductType::SamC1 => "C1",
            SamProductType::SamS1Dx => "D?",
            SamProductType::SamS1E1 => "E1",
            SamProductType::HsmC1 => "B1",
            SamProductType::CsamF => "??",
        }
    }
}

/// Filter applied when selecting the SAM
#[derive(Clone, Debug)]
pub struct SamSelector {
    product_type: SamProductType,
    serial_number_regex: Option<String>,
    unlock_data: Option<Vec<u8>>,
}

impl SamSelector {
    /// Filter on a SAM product type
    pub fn new(product_type: SamProductType) -> Self {
        if product_type == SamProductType::CsamF {
            warn!("CSAM-F ATR mask is unknown; matching any application type");
        }
        Self {
            product_type,
            serial_number_regex: None,
            unlock_data: None,
        }
    }

    /// Filter on the SAM serial number (regex over its hex form)
    pub fn with_serial_number_regex(mut self, regex: &str) -> Self {
        self.serial_number_regex = Some(regex.to_string());
        self
    }

    /// Provide the unlock data (hex string of 8 or 16 bytes) sent to a
    /// locked SAM right after its selection
    pub fn with_unlock_data(mut self, unlock_data_hex: &str) -> Result<Self, ProtocolError> {
        let unlock_data = from_hex(unlock_data_hex)?;
        ensure!(
            unlock_data.len() == 8 || unlock_data.len() == 16,
            IllegalArgument,
            "unlock data is {} bytes (expected 8 or 16)",
            unlock_data.len()
        );
        self.unlock_data = Some(unlock_data);
        Ok(self)
    }

    /// The configured product type
    pub fn product_type(&self) -> SamProductType {
        self.product_type
    }

    /// The configured unlock data
    pub fn unlock_data(&self) -> Option<&[u8]> {
        self.unlock_data.as_ref().map(Vec::as_slice)
    }

    /// Build the ATR matching regex for the configured product type and
    /// serial number
    pub fn atr_regex(&self) -> String {
        let sn_regex = match self.serial_number_regex {
            Some(ref regex) => regex.clone(),
            None => ".{8}".to_string(),
        };
        let mask = self.product_type.application_type_mask().replace('?', ".");
        format!("3B(.{{6}}|.{{10}})805A..80{}20.{{4}}{}829000", mask, sn_regex)
    }
}

/// Decode a hex string into bytes
pub(crate) fn from_hex(hex: &str) -> Result<Vec<u8>, ProtocolError> {
    ensure!(
        hex.len() % 2 == 0,
        IllegalArgument,
        "odd-length hex string ({} chars)",
        hex.len()
    );
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let chars = hex.as_bytes();
    for pair in chars.chunks(2) {
        let high = hex_digit(pair[0])?;
        let low = hex_digit(pair[1])?;
        bytes.push(high << 4 | low);
    }
    Ok(bytes)
}

fn hex_digit(c: u8) -> Result<u8, ProtocolError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        other => fail!(IllegalArgument, "invalid hex character '{}'", other as char),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sam_atr_regex_for_c1() {
        let selector = SamSelector::new(SamProductType::SamC1);
        assert_eq!(
            selector.atr_regex(),
            "3B(.{6}|.{10})805A..80C120.{4}.{8}829000"
        );
    }

    #[test]
    fn csam_f_mask_widens_to_wildcards() {
        let selector = SamSelector::new(SamProductType::CsamF);
        assert_eq!(
            selector.atr_regex(),
            "3B(.{6}|.{10})805A..80..20.{4}.{8}829000"
        );
    }

    #[test]
    fn unlock_data_must_be_8_or_16_bytes_of_hex() {
        assert!(SamSelector::new(SamProductType::SamC1)
            .with_unlock_data("0011223344556677")
            .is_ok());
        assert!(SamSelector::new(SamProductType::SamC1)
            .with_unlock_data("001122")
            .is_err());
        assert!(SamSelector::new(SamProductType::SamC1)
            .with_unlock_data("00112233445566ZZ")
            .is_err());
    }

    #[test]
    fn aid_length_is_checked() {
        assert!(CardSelector::default().with_aid(&[0x31; 4]).is_err());
        assert!(CardSelector::default().with_aid(&[0x31; 8]).is_ok());
    }
}
