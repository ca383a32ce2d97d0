//! The access record stored on a tag
//!
//! Four sectors make up a record: metadata (`<prefix>_<flags>`), username,
//! identifier and password. Each holds UTF-8 text of at most 48 bytes.

use std::fmt;

use relaylock_mifare_core::{CardUid, Error, Result, Sector};
use serde::{Deserialize, Serialize};

/// Metadata sector
pub const SECTOR_META: Sector = Sector::new(1);
/// Username sector
pub const SECTOR_USERNAME: Sector = Sector::new(2);
/// Identifier sector
pub const SECTOR_IDENTIFIER: Sector = Sector::new(3);
/// Password sector
pub const SECTOR_PASSWORD: Sector = Sector::new(4);

/// Record sectors in write and rekey order
pub const RECORD_SECTORS: [Sector; 4] = [
    SECTOR_META,
    SECTOR_USERNAME,
    SECTOR_IDENTIFIER,
    SECTOR_PASSWORD,
];

/// Which bit of the flags grants which access
///
/// Cards provisioned before the door bit was dropped use [`FlagLayout::Legacy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagLayout {
    /// Bit 0 grants the cash register
    #[default]
    Current,
    /// Bit 0 grants the door, bit 1 the cash register
    Legacy,
}

impl FlagLayout {
    /// Bit granting cash register access
    pub const fn cash_register_bit(self) -> u32 {
        match self {
            Self::Current => 0b0001,
            Self::Legacy => 0b0010,
        }
    }

    /// Bit granting door access, if the layout has one
    pub const fn door_bit(self) -> Option<u32> {
        match self {
            Self::Current => None,
            Self::Legacy => Some(0b0001),
        }
    }
}

/// Access flags of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessFlags(u32);

impl AccessFlags {
    /// Create flags from their raw value
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Flags written for a newly provisioned tag
    pub const fn provisioning_default(layout: FlagLayout) -> Self {
        match layout.door_bit() {
            Some(door) => Self(door | layout.cash_register_bit()),
            None => Self(layout.cash_register_bit()),
        }
    }

    /// Whether the cash register relay may be opened
    pub const fn grants_cash_register(self, layout: FlagLayout) -> bool {
        self.0 & layout.cash_register_bit() != 0
    }

    /// Convert legacy-layout flags to the current layout, dropping the door bit
    pub const fn migrate_legacy(self) -> Self {
        if self.grants_cash_register(FlagLayout::Legacy) {
            Self(FlagLayout::Current.cash_register_bit())
        } else {
            Self(0)
        }
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text fields of a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// External identifier of the user
    pub identifier: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Bundle the three text fields
    pub fn new(
        username: impl Into<String>,
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

/// A record as read from a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    /// Tag the record was read from
    pub uid: CardUid,
    /// Prefix of the metadata sector
    pub meta_prefix: String,
    /// Access flags of the metadata sector
    pub flags: AccessFlags,
    /// Text fields
    pub credentials: Credentials,
}

/// Format the metadata sector text
pub fn format_metadata(prefix: &str, flags: AccessFlags) -> String {
    format!("{prefix}_{flags}")
}

/// Parse the metadata sector text, requiring `expected_prefix`
pub fn parse_metadata(text: &str, expected_prefix: &str) -> Result<AccessFlags> {
    let Some((prefix, flags)) = text.rsplit_once('_') else {
        return Err(Error::metadata(
            "The meta data sector did not match the expected format",
        ));
    };
    if prefix != expected_prefix {
        return Err(Error::metadata(format!(
            "The prefix in the meta data sector was {prefix:?}, expected {expected_prefix:?}"
        )));
    }
    if flags.is_empty() || !flags.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::metadata(format!(
            "The flags in the meta data sector are not a number: {flags:?}"
        )));
    }
    // Only the low 32 bits carry access rights; longer numbers wrap
    let bits = flags.bytes().fold(0u32, |acc, digit| {
        acc.wrapping_mul(10).wrapping_add(u32::from(digit - b'0'))
    });
    Ok(AccessFlags::new(bits))
}
