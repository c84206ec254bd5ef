//! Simple BER-TLV parsing
//!
//! Only the flat rules needed by the Calypso FCI and proprietary file
//! information: one-byte tags unless bits 1-5 of the first byte are all
//! set (then two bytes), definite lengths up to two length octets, no
//! recursion (constructed values are re-parsed explicitly by callers).

use error::{ProtocolError, ProtocolErrorKind::DataOutOfBounds};

/// One parsed tag/value pair
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Tlv {
    /// Tag number, one or two bytes wide
    pub tag: u16,

    /// Raw value octets
    pub value: Vec<u8>,
}

/// Parse a flat sequence of TLV structures covering the whole input
pub(crate) fn parse(data: &[u8]) -> Result<Vec<Tlv>, ProtocolError> {
    let mut tlvs = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        // Padding bytes between structures
        if data[pos] == 0x00 || data[pos] == 0xFF {
            pos += 1;
            continue;
        }

        let tag = if data[pos] & 0x1F == 0x1F {
            ensure!(
                pos + 1 < data.len(),
                DataOutOfBounds,
                "truncated two-byte tag at offset {}",
                pos
            );
            pos += 2;
            (u16::from(data[pos - 2]) << 8) | u16::from(data[pos - 1])
        } else {
            pos += 1;
            u16::from(data[pos - 1])
        };

        ensure!(
            pos < data.len(),
            DataOutOfBounds,
            "missing length octet for tag 0x{:02X}",
            tag
        );

        let len = match data[pos] {
            n @ 0x00..=0x7F => {
                pos += 1;
                usize::from(n)
            }
            0x81 => {
                ensure!(
                    pos + 1 < data.len(),
                    DataOutOfBounds,
                    "truncated length for tag 0x{:02X}",
                    tag
                );
                pos += 2;
                usize::from(data[pos - 1])
            }
            0x82 => {
                ensure!(
                    pos + 2 < data.len(),
                    DataOutOfBounds,
                    "truncated length for tag 0x{:02X}",
                    tag
                );
                pos += 3;
                (usize::from(data[pos - 2]) << 8) | usize::from(data[pos - 1])
            }
            other => fail!(
                DataOutOfBounds,
                "unsupported length octet 0x{:02X} for tag 0x{:02X}",
                other,
                tag
            ),
        };

        ensure!(
            pos + len <= data.len(),
            DataOutOfBounds,
            "value of tag 0x{:02X} overruns the buffer",
            tag
        );

        tlvs.push(Tlv {
            tag,
            value: data[pos..pos + len].to_vec(),
        });
        pos += len;
    }

    Ok(tlvs)
}

/// Find the first value with the given tag in a flat TLV sequence
pub(crate) fn find(data: &[u8], tag: u16) -> Result<Option<Vec<u8>>, ProtocolError> {
    Ok(parse(data)?
        .into_iter()
        .find(|tlv| tlv.tag == tag)
        .map(|tlv| tlv.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_byte_tag() {
        let tlvs = parse(&[0x84, 0x02, 0xAA, 0xBB]).unwrap();
        assert_eq!(tlvs, vec![Tlv { tag: 0x84, value: vec![0xAA, 0xBB] }]);
    }

    #[test]
    fn two_byte_tag() {
        let tlvs = parse(&[0xBF, 0x0C, 0x01, 0x42]).unwrap();
        assert_eq!(tlvs, vec![Tlv { tag: 0xBF0C, value: vec![0x42] }]);
    }

    #[test]
    fn extended_length() {
        let mut data = vec![0x53, 0x81, 0x80];
        data.extend_from_slice(&[0x11; 0x80]);
        let tlvs = parse(&data).unwrap();
        assert_eq!(tlvs[0].value.len(), 0x80);
    }

    #[test]
    fn sequence_and_find() {
        let data = [0x84, 0x01, 0x01, 0xC7, 0x02, 0x02, 0x03];
        assert_eq!(find(&data, 0xC7).unwrap(), Some(vec![0x02, 0x03]));
        assert_eq!(find(&data, 0x53).unwrap(), None);
    }

    #[test]
    fn overrun_is_refused() {
        assert!(parse(&[0x84, 0x05, 0x01]).is_err());
    }
}
