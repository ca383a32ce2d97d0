//! Sector keys

use core::{fmt, str::FromStr};

use crate::error::Error;

/// A six byte MIFARE Classic sector key
///
/// The length invariant is enforced on construction, so no key of the wrong
/// size can ever reach an authentication call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorKey([u8; SectorKey::LEN]);

impl SectorKey {
    /// Length of a key in bytes
    pub const LEN: usize = 6;

    /// Factory default key of blank cards
    pub const DEFAULT: Self = Self([0xFF; Self::LEN]);

    /// Create a key from its bytes
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Whether this is the factory default key
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl TryFrom<&[u8]> for SectorKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; Self::LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))
    }
}

/// Parses the configuration form `0xFFFFFFFFFFFF`
impl FromStr for SectorKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidEncoding(format!("key must start with 0x: {s:?}")))?;
        let bytes = hex::decode(digits)
            .map_err(|e| Error::InvalidEncoding(format!("key is not hex: {e}")))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode_upper(self.0))
    }
}

// Keys only show up in logs as default/custom, never with their bytes.
impl fmt::Debug for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("SectorKey(DEFAULT)")
        } else {
            f.write_str("SectorKey(..)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_form() {
        let key: SectorKey = "0xA0A1A2A3A4A5".parse().unwrap();
        assert_eq!(key.as_bytes(), &[0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
        assert_eq!(key.to_string(), "0xA0A1A2A3A4A5");

        let lower: SectorKey = "0xa0a1a2a3a4a5".parse().unwrap();
        assert_eq!(lower, key);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "A0A1A2A3A4A5".parse::<SectorKey>(),
            Err(Error::InvalidEncoding(_))
        ));
        assert!(matches!(
            "0xZZA1A2A3A4A5".parse::<SectorKey>(),
            Err(Error::InvalidEncoding(_))
        ));
        assert_eq!(
            "0xA0A1A2A3A4".parse::<SectorKey>(),
            Err(Error::InvalidKeyLength(5))
        );
        assert_eq!(
            "0xA0A1A2A3A4A5A6".parse::<SectorKey>(),
            Err(Error::InvalidKeyLength(7))
        );
    }

    #[test]
    fn test_from_slice() {
        assert_eq!(
            SectorKey::try_from(&[0xFF; 6][..]).unwrap(),
            SectorKey::DEFAULT
        );
        assert_eq!(
            SectorKey::try_from(&[0xFF; 5][..]),
            Err(Error::InvalidKeyLength(5))
        );
    }

    #[test]
    fn test_debug_hides_custom_key() {
        let key = SectorKey::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(format!("{key:?}"), "SectorKey(..)");
        assert_eq!(format!("{:?}", SectorKey::DEFAULT), "SectorKey(DEFAULT)");
    }
}
