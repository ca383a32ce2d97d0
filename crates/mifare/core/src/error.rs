//! Card error type for all MIFARE operations
//!
//! Every failure that can happen between detecting a tag and decoding its
//! payload is one variant of [`Error`]. Transport drivers report plain
//! boolean/empty results; the session layers translate those into these kinds.

use crate::sector::Sector;
use crate::uid::CardUid;

/// Result type for card operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Why no usable card was found
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum NoCardReason {
    /// Nothing answered the presence request
    #[display("no tag in range")]
    Absent,
    /// A card answered, but not the one the caller asked for
    #[display("card {found} present, expected {expected}")]
    UidMismatch {
        /// UID the caller required
        expected: CardUid,
        /// UID that was actually read
        found: CardUid,
    },
}

/// Card error type that encompasses all failure kinds of a card session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No tag in range, or not the required one
    #[error("No RFID card detected: {reason}")]
    NoCardDetected {
        /// Which of the two situations occurred
        reason: NoCardReason,
    },

    /// Tag selection failed after the UID was obtained
    #[error("Failed to select RFID tag with UID {uid}")]
    AccessDenied {
        /// UID of the tag that could not be selected
        uid: CardUid,
    },

    /// A key did not validate for a block
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// A block read or write failed at the transport
    #[error("Read/write failure: {0}")]
    ReadWriteFailure(String),

    /// The metadata sector does not have the `<prefix>_<digits>` form
    #[error("Unexpected meta data: {0}")]
    UnexpectedMetaData(String),

    /// A sector payload exceeds the data area of a sector
    #[error("Payload of {len} bytes exceeds the maximum size of {max} bytes")]
    PayloadTooLarge {
        /// Encoded length of the rejected payload
        len: usize,
        /// Capacity of a sector's data blocks
        max: usize,
    },

    /// Key material that is not exactly six bytes
    #[error("Invalid key length: expected 6 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A malformed UID or key text representation
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A UID that is not 4, 7 or 10 bytes long
    #[error("Invalid UID length: {0}")]
    InvalidUidLength(usize),
}

impl Error {
    /// No card answered the presence request
    pub const fn no_card() -> Self {
        Self::NoCardDetected {
            reason: NoCardReason::Absent,
        }
    }

    /// A card other than the required one is present
    pub const fn wrong_card(expected: CardUid, found: CardUid) -> Self {
        Self::NoCardDetected {
            reason: NoCardReason::UidMismatch { expected, found },
        }
    }

    /// The key was rejected for the given sector
    pub fn sector_authentication(sector: Sector) -> Self {
        Self::AuthenticationFailure(format!("{sector} rejected the key"))
    }

    /// Every key candidate failed on the card
    pub fn keys_exhausted(uid: Option<&CardUid>) -> Self {
        match uid {
            Some(uid) => Self::AuthenticationFailure(format!(
                "cannot access RFID card {uid} with known keys"
            )),
            None => Self::AuthenticationFailure("cannot access RFID card with known keys".into()),
        }
    }

    /// Create a read/write failure with a dynamic message
    pub fn read_write<S: Into<String>>(message: S) -> Self {
        Self::ReadWriteFailure(message.into())
    }

    /// Create a metadata error with a dynamic message
    pub fn metadata<S: Into<String>>(message: S) -> Self {
        Self::UnexpectedMetaData(message.into())
    }

    /// Whether this is a [`Error::NoCardDetected`] of either reason
    pub const fn is_no_card(&self) -> bool {
        matches!(self, Self::NoCardDetected { .. })
    }

    /// Whether a card session should move on to the next key candidate
    ///
    /// Only authentication and block I/O failures are tied to the key in use;
    /// everything else is independent of it and aborts the session.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure(_) | Self::ReadWriteFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(bytes: &[u8]) -> CardUid {
        CardUid::new(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::sector_authentication(Sector::new(1)).is_retryable());
        assert!(Error::read_write("block 4").is_retryable());
        assert!(!Error::no_card().is_retryable());
        assert!(
            !Error::AccessDenied {
                uid: uid(&[1, 2, 3, 4])
            }
            .is_retryable()
        );
        assert!(!Error::metadata("x").is_retryable());
        assert!(!Error::PayloadTooLarge { len: 49, max: 48 }.is_retryable());
    }

    #[test]
    fn test_no_card_reasons_are_both_no_card() {
        assert!(Error::no_card().is_no_card());
        assert!(Error::wrong_card(uid(&[1, 2, 3, 4]), uid(&[5, 6, 7, 8])).is_no_card());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::wrong_card(uid(&[1, 2, 3, 4]), uid(&[0xAB, 0xCD, 0xEF, 0x01])).to_string(),
            "No RFID card detected: card 0xABCDEF01 present, expected 0x01020304"
        );
        assert_eq!(
            Error::keys_exhausted(Some(&uid(&[0xDE, 0xAD, 0xBE, 0xEF]))).to_string(),
            "Authentication failure: cannot access RFID card 0xDEADBEEF with known keys"
        );
        assert_eq!(
            Error::sector_authentication(Sector::new(3)).to_string(),
            "Authentication failure: sector 3 rejected the key"
        );
    }
}
