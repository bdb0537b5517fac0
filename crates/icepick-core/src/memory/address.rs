//! Foreign address type and the pointer byte encoding used to locate
//! references inside the target process.

use std::fmt;
use std::num::NonZeroU64;

/// An address inside the target process.
///
/// Never dereferenced locally. Zero is not a valid foreign address, so
/// providers report "not found" with `Option<ForeignAddress>` instead of a
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForeignAddress(NonZeroU64);

impl ForeignAddress {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Address `offset` bytes past this one, or `None` on overflow.
    pub fn offset(self, offset: u64) -> Option<Self> {
        self.get().checked_add(offset).and_then(Self::new)
    }

    /// Little-endian pointer encoding of this address.
    pub fn to_pointer_bytes(self) -> Vec<u8> {
        encode_pointer(self.get())
    }
}

impl fmt::Display for ForeignAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.get())
    }
}

/// Number of significant bytes in `value` (at least one).
fn significant_bytes(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(8)
    }
}

/// Encode an address the way it is stored as a pointer in the target.
///
/// Equivalent to rendering the value as minimal-length hex, left-padding to
/// whole bytes, and reversing the bytes: the little-endian bytes of the
/// value truncated to its significant bytes.
pub fn encode_pointer(value: u64) -> Vec<u8> {
    value.to_le_bytes()[..significant_bytes(value)].to_vec()
}

/// Encode `value` zero-extended to at least `width` bytes (capped at 8).
///
/// Used when overwriting a stored pointer so that the high bytes of the old
/// value do not survive a shorter replacement.
pub fn encode_pointer_with_width(value: u64, width: usize) -> Vec<u8> {
    let len = significant_bytes(value).max(width).min(8);
    value.to_le_bytes()[..len].to_vec()
}

/// Decode little-endian pointer bytes. Returns `None` for empty input or
/// more than eight bytes.
pub fn decode_pointer(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(
        bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte)),
    )
}

/// Render bytes as space-separated hex, for logs.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pointer_roundtrip() {
        for value in [0u64, 1, 0xFF, 0x100, 0x7FFF_FFFF, 0x1_0000_0000] {
            let encoded = encode_pointer(value);
            assert_eq!(decode_pointer(&encoded), Some(value), "value 0x{:X}", value);
        }
    }

    #[test]
    fn test_encode_pointer_minimal_length() {
        assert_eq!(encode_pointer(0), vec![0x00]);
        assert_eq!(encode_pointer(0xFF), vec![0xFF]);
        assert_eq!(encode_pointer(0x100), vec![0x00, 0x01]);
        // Odd hex length gets a leading zero nibble
        assert_eq!(encode_pointer(0xABC), vec![0xBC, 0x0A]);
        assert_eq!(
            encode_pointer(0x7FF6_1234_5678),
            vec![0x78, 0x56, 0x34, 0x12, 0xF6, 0x7F]
        );
    }

    #[test]
    fn test_encode_pointer_with_width_zero_extends() {
        assert_eq!(
            encode_pointer_with_width(0x1234, 4),
            vec![0x34, 0x12, 0x00, 0x00]
        );
        // Never truncates significant bytes
        assert_eq!(
            encode_pointer_with_width(0x12_3456, 2),
            vec![0x56, 0x34, 0x12]
        );
        assert_eq!(encode_pointer_with_width(1, 16).len(), 8);
    }

    #[test]
    fn test_decode_pointer_rejects_bad_lengths() {
        assert_eq!(decode_pointer(&[]), None);
        assert_eq!(decode_pointer(&[0; 9]), None);
        assert_eq!(decode_pointer(&[0x34, 0x12, 0x00, 0x00]), Some(0x1234));
    }

    #[test]
    fn test_foreign_address_rejects_zero() {
        assert!(ForeignAddress::new(0).is_none());
        let addr = ForeignAddress::new(0x1000).unwrap();
        assert_eq!(addr.to_string(), "0x1000");
        assert_eq!(addr.offset(0x10).unwrap().get(), 0x1010);
        assert!(ForeignAddress::new(u64::MAX).unwrap().offset(1).is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x00, 0xAB, 0x7F]), "00 AB 7F");
    }
}
