//! Card identifiers

use core::{fmt, str::FromStr};

use crate::error::Error;

/// ISO 14443A unique identifier of a tag (4, 7 or 10 bytes)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardUid(Vec<u8>);

impl CardUid {
    /// Create a UID, checking its length
    pub fn new(bytes: Vec<u8>) -> Result<Self, Error> {
        match bytes.len() {
            4 | 7 | 10 => Ok(Self(bytes)),
            len => Err(Error::InvalidUidLength(len)),
        }
    }

    /// UID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CardUid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 4]> for CardUid {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes.to_vec())
    }
}

impl TryFrom<&[u8]> for CardUid {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::new(bytes.to_vec())
    }
}

/// Parses `0x04A1B2C3` as well as `04A1B2C3`
impl FromStr for CardUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::InvalidEncoding(format!("UID is not hex: {e}")))?;
        Self::new(bytes)
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardUid({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert!(CardUid::new(vec![0; 4]).is_ok());
        assert!(CardUid::new(vec![0; 7]).is_ok());
        assert!(CardUid::new(vec![0; 10]).is_ok());
        assert_eq!(CardUid::new(vec![0; 5]), Err(Error::InvalidUidLength(5)));
        assert_eq!(CardUid::new(Vec::new()), Err(Error::InvalidUidLength(0)));
    }

    #[test]
    fn test_text_form() {
        let uid = CardUid::new(vec![0x04, 0xA1, 0xB2, 0xC3]).unwrap();
        assert_eq!(uid.to_string(), "0x04A1B2C3");
        assert_eq!("0x04A1B2C3".parse::<CardUid>().unwrap(), uid);
        assert_eq!("04a1b2c3".parse::<CardUid>().unwrap(), uid);
        assert!(matches!(
            "0xnothex".parse::<CardUid>(),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_equality_is_bytewise() {
        let a = CardUid::new(vec![1, 2, 3, 4]).unwrap();
        let b = CardUid::try_from(&[1u8, 2, 3, 4][..]).unwrap();
        let c = CardUid::new(vec![1, 2, 3, 5]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
