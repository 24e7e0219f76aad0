//! Composite keys used to address entries inside tree nodes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{AshError, Result};

/// Bits of the first encoded word that may be set (type + secondary).
const ENCODED_V1_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Composite tree key.
///
/// Keys collate on `secondary`, then `key_type`, then `primary`, each as a
/// signed ascending comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    key_type: i16,
    secondary: i32,
    primary: i64,
}

impl Key {
    /// Size of the big-endian key image in bytes.
    pub const SIZE: usize = 16;

    /// The smallest possible key.
    pub const MIN: Key = Key::new(i16::MIN, i32::MIN, i64::MIN);

    /// The largest possible key.
    pub const MAX: Key = Key::new(i16::MAX, i32::MAX, i64::MAX);

    /// Creates a new key.
    pub const fn new(key_type: i16, secondary: i32, primary: i64) -> Self {
        Self {
            key_type,
            secondary,
            primary,
        }
    }

    /// Decodes a key from its two 64-bit words.
    pub fn from_encoded(v1: u64, v2: u64) -> Result<Self> {
        if v1 & !ENCODED_V1_MASK != 0 {
            return Err(AshError::invalid(format!(
                "encoded key word out of range: {v1:#018x}"
            )));
        }
        Ok(Self {
            key_type: (v1 >> 32) as u16 as i16,
            secondary: v1 as u32 as i32,
            primary: v2 as i64,
        })
    }

    /// Returns the type discriminator.
    #[inline]
    pub fn key_type(&self) -> i16 {
        self.key_type
    }

    /// Returns the secondary component.
    #[inline]
    pub fn secondary(&self) -> i32 {
        self.secondary
    }

    /// Returns the primary component.
    #[inline]
    pub fn primary(&self) -> i64 {
        self.primary
    }

    /// Returns encoded word `n`: 1 packs type and secondary, 2 is primary.
    pub fn encoded(&self, n: u8) -> Result<u64> {
        match n {
            1 => Ok(((self.key_type as u16 as u64) << 32) | self.secondary as u32 as u64),
            2 => Ok(self.primary as u64),
            _ => Err(AshError::invalid(format!("key word index out of range: {n}"))),
        }
    }

    /// Returns the 16-byte big-endian image (word 1 then word 2).
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let v1 = ((self.key_type as u16 as u64) << 32) | self.secondary as u32 as u64;
        buf[0..8].copy_from_slice(&v1.to_be_bytes());
        buf[8..16].copy_from_slice(&(self.primary as u64).to_be_bytes());
        buf
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.secondary
            .cmp(&other.secondary)
            .then(self.key_type.cmp(&other.key_type))
            .then(self.primary.cmp(&other.primary))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = AshError;

    fn try_from(buf: &[u8]) -> Result<Self> {
        let image: [u8; Key::SIZE] = buf.try_into().map_err(|_| AshError::TypeMismatch {
            expected: format!("{}-byte key image", Key::SIZE),
            actual: format!("{} bytes", buf.len()),
        })?;
        let mut v1 = [0u8; 8];
        let mut v2 = [0u8; 8];
        v1.copy_from_slice(&image[0..8]);
        v2.copy_from_slice(&image[8..16]);
        Key::from_encoded(u64::from_be_bytes(v1), u64::from_be_bytes(v2))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.key_type, self.secondary, self.primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_breaks_ties() {
        let a = Key::new(1, 5, 10);
        let b = Key::new(1, 5, 20);
        assert!(a < b);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn test_secondary_dominates_type() {
        let a = Key::new(1, 5, 10);
        let c = Key::new(2, 1, 1);
        // c has a larger type but a smaller secondary.
        assert!(c < a);

        let d = Key::new(i16::MAX, 0, 0);
        let e = Key::new(i16::MIN, 1, 0);
        assert!(d < e);
    }

    #[test]
    fn test_type_before_primary() {
        let a = Key::new(1, 5, i64::MAX);
        let b = Key::new(2, 5, i64::MIN);
        assert!(a < b);
    }

    #[test]
    fn test_signed_collation() {
        assert!(Key::new(0, -1, 0) < Key::new(0, 0, 0));
        assert!(Key::new(-1, 0, 0) < Key::new(0, 0, 0));
        assert!(Key::new(0, 0, -1) < Key::new(0, 0, 0));
    }

    #[test]
    fn test_min_max() {
        let k = Key::new(3, 4, 5);
        assert!(Key::MIN < k);
        assert!(k < Key::MAX);
    }

    #[test]
    fn test_equality_requires_all_fields() {
        let a = Key::new(1, 2, 3);
        assert_eq!(a, Key::new(1, 2, 3));
        assert_ne!(a, Key::new(0, 2, 3));
        assert_ne!(a, Key::new(1, 0, 3));
        assert_ne!(a, Key::new(1, 2, 0));
    }

    #[test]
    fn test_encoded_layout() {
        let k = Key::new(2, 7, 99);
        assert_eq!(k.encoded(1).unwrap(), (2u64 << 32) | 7);
        assert_eq!(k.encoded(2).unwrap(), 99);
        assert!(matches!(k.encoded(3), Err(AshError::InvalidArgument(_))));
    }

    #[test]
    fn test_encoded_roundtrip_negative() {
        let k = Key::new(-3, -70_000, -1);
        let back = Key::from_encoded(k.encoded(1).unwrap(), k.encoded(2).unwrap()).unwrap();
        assert_eq!(back, k);
    }

    #[test]
    fn test_from_encoded_rejects_high_bits() {
        let err = Key::from_encoded(1 << 48, 0).unwrap_err();
        assert!(matches!(err, AshError::InvalidArgument(_)));
    }

    #[test]
    fn test_byte_image() {
        let k = Key::new(1, 2, 3);
        let image = k.to_bytes();
        assert_eq!(Key::try_from(&image[..]).unwrap(), k);

        let err = Key::try_from(&image[..15]).unwrap_err();
        assert!(matches!(err, AshError::TypeMismatch { .. }));
    }

    #[test]
    fn test_display() {
        assert_eq!(Key::new(1, 2, 3).to_string(), "(1, 2, 3)");
    }
}
