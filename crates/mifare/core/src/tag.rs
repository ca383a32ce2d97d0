//! Tag type reported by the presence request

/// Card family as reported by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TagType {
    /// MIFARE Classic 1K
    #[display("MIFARE Classic 1K")]
    Classic1K,
    /// MIFARE Classic 4K
    #[display("MIFARE Classic 4K")]
    Classic4K,
    /// MIFARE Ultralight
    #[display("MIFARE Ultralight")]
    Ultralight,
    /// MIFARE DESFire
    #[display("MIFARE DESFire")]
    Desfire,
    /// MIFARE Plus
    #[display("MIFARE Plus")]
    Plus,
    /// MIFARE Mini
    #[display("MIFARE Mini")]
    Mini,
    /// Anything else
    #[display("unknown tag type 0x{_0:02X}")]
    Unknown(u8),
}

impl TagType {
    /// Whether the tag uses the classic sector/key scheme
    pub const fn is_classic(self) -> bool {
        matches!(self, Self::Classic1K | Self::Classic4K | Self::Mini)
    }

    /// Type byte for this tag type
    pub const fn code(self) -> u8 {
        match self {
            Self::Classic1K => 0x08,
            Self::Classic4K => 0x10,
            Self::Ultralight => 0x04,
            Self::Desfire => 0x44,
            Self::Plus => 0x20,
            Self::Mini => 0x40,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for TagType {
    fn from(code: u8) -> Self {
        match code {
            0x08 => Self::Classic1K,
            0x10 => Self::Classic4K,
            0x04 => Self::Ultralight,
            0x44 => Self::Desfire,
            0x20 => Self::Plus,
            0x40 => Self::Mini,
            other => Self::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        for code in [0x08, 0x10, 0x04, 0x44, 0x20, 0x40, 0x99] {
            assert_eq!(TagType::from(code).code(), code);
        }
        assert_eq!(TagType::from(0x08), TagType::Classic1K);
        assert_eq!(TagType::from(0x99).to_string(), "unknown tag type 0x99");
        assert!(TagType::Classic4K.is_classic());
        assert!(!TagType::Ultralight.is_classic());
    }
}
