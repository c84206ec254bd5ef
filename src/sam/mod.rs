//! In-memory image of the companion SAM
//!
//! Mirrors the administrative state read back from the SAM: key
//! parameters, event counters and ceilings. The serial number is fixed
//! at selection time and spliced into SV operations.

use std::collections::BTreeMap;

use selection::SamProductType;

/// The in-memory mirror of the selected SAM
#[derive(Clone, Debug)]
pub struct LegacySam {
    product_type: SamProductType,
    serial_number: Vec<u8>,
    key_parameters: BTreeMap<(u8, u8), Vec<u8>>,
    event_counters: BTreeMap<u8, u32>,
    event_ceilings: BTreeMap<u8, u32>,
}

impl LegacySam {
    /// Build the image from the selection outcome
    pub fn new(product_type: SamProductType, serial_number: &[u8]) -> Self {
        Self {
            product_type,
            serial_number: serial_number.to_vec(),
            key_parameters: BTreeMap::new(),
            event_counters: BTreeMap::new(),
            event_ceilings: BTreeMap::new(),
        }
    }

    /// SAM product type
    pub fn product_type(&self) -> SamProductType {
        self.product_type
    }

    /// SAM serial number (4 bytes spliced into SV operations)
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    /// Raw parameters of a key, when read
    pub fn key_parameters(&self, kif: u8, kvc: u8) -> Option<&[u8]> {
        self.key_parameters.get(&(kif, kvc)).map(Vec::as_slice)
    }

    pub(crate) fn set_key_parameters(&mut self, kif: u8, kvc: u8, parameters: Vec<u8>) {
        self.key_parameters.insert((kif, kvc), parameters);
    }

    /// Value of an event counter, when read
    pub fn event_counter(&self, number: u8) -> Option<u32> {
        self.event_counters.get(&number).cloned()
    }

    pub(crate) fn set_event_counter(&mut self, number: u8, value: u32) {
        self.event_counters.insert(number, value);
    }

    /// Value of an event ceiling, when read
    pub fn event_ceiling(&self, number: u8) -> Option<u32> {
        self.event_ceilings.get(&number).cloned()
    }

    pub(crate) fn set_event_ceiling(&mut self, number: u8, value: u32) {
        self.event_ceilings.insert(number, value);
    }
}
