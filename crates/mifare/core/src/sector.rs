//! Sector and block addressing for MIFARE Classic memory
//!
//! The first 32 sectors hold 4 blocks each (128 blocks in total); starting
//! with sector 32 every sector holds 16 blocks. The last block of a sector is
//! its trailer, which stores the two sector keys and the access conditions.

use core::fmt;

use crate::key::SectorKey;

/// Size of one block in bytes
pub const BLOCK_SIZE: usize = 16;

/// Number of data blocks of a sector used for payloads
pub const DATA_BLOCKS_PER_SECTOR: usize = 3;

/// Bytes available for a payload in one sector
pub const SECTOR_PAYLOAD_SIZE: usize = BLOCK_SIZE * DATA_BLOCKS_PER_SECTOR;

/// One block of card memory
pub type Block = [u8; BLOCK_SIZE];

/// Sectors below this number have 4 blocks, the rest 16
const SMALL_SECTOR_COUNT: u16 = 32;
/// First block of the first large sector
const LARGE_SECTOR_BASE: u16 = 128;

/// Logical sector number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sector(u8);

impl Sector {
    /// Create a sector from its number
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    /// The sector number
    pub const fn number(self) -> u8 {
        self.0
    }

    /// First block of the sector
    pub const fn start_block(self) -> u16 {
        start_block(self.0)
    }

    /// Trailer (last) block of the sector
    pub const fn trailer_block(self) -> u16 {
        trailer_block(self.0)
    }

    /// Sector that contains the given block
    pub const fn of_block(block: u16) -> Self {
        if block < LARGE_SECTOR_BASE {
            Self((block / 4) as u8)
        } else {
            Self((SMALL_SECTOR_COUNT + (block - LARGE_SECTOR_BASE) / 16) as u8)
        }
    }

    /// Whether the block belongs to this sector
    pub const fn contains(self, block: u16) -> bool {
        block >= self.start_block() && block <= self.trailer_block()
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sector {}", self.0)
    }
}

/// First block of a sector
pub const fn start_block(sector: u8) -> u16 {
    let sector = sector as u16;
    if sector < SMALL_SECTOR_COUNT {
        sector * 4
    } else {
        LARGE_SECTOR_BASE + (sector - SMALL_SECTOR_COUNT) * 16
    }
}

/// Trailer block of a sector, i.e. the 4th block for sectors 0-31 and the
/// 16th block for sectors from 32 on
pub const fn trailer_block(sector: u8) -> u16 {
    if (sector as u16) < SMALL_SECTOR_COUNT {
        start_block(sector) + 3
    } else {
        start_block(sector) + 15
    }
}

/// Sector trailer written when changing a sector's key
///
/// Layout: key A (6) ‖ access conditions `FF 07 80` ‖ `69` ‖ key B (6).
/// Key A and key B are always the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorTrailer {
    key: SectorKey,
}

impl SectorTrailer {
    /// Transport configuration access bits: key A reads/writes data, key A writes the trailer
    pub const ACCESS_CONDITIONS: [u8; 3] = [0xFF, 0x07, 0x80];
    /// General purpose byte following the access conditions
    pub const GENERAL_PURPOSE_BYTE: u8 = 0x69;

    /// Trailer protecting a sector with `key`
    pub const fn new(key: SectorKey) -> Self {
        Self { key }
    }

    /// Key stored as key A and key B
    pub const fn key(&self) -> &SectorKey {
        &self.key
    }

    /// Encode into the 16 bytes of a trailer block
    pub fn to_block(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[..6].copy_from_slice(self.key.as_bytes());
        block[6..9].copy_from_slice(&Self::ACCESS_CONDITIONS);
        block[9] = Self::GENERAL_PURPOSE_BYTE;
        block[10..].copy_from_slice(self.key.as_bytes());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sectors() {
        for s in 0u8..32 {
            assert_eq!(start_block(s), 4 * s as u16);
            assert_eq!(trailer_block(s), 4 * s as u16 + 3);
        }
    }

    #[test]
    fn test_large_sectors() {
        for s in 32u8..40 {
            assert_eq!(start_block(s), 128 + 16 * (s as u16 - 32));
            assert_eq!(trailer_block(s), start_block(s) + 15);
        }
        assert_eq!(trailer_block(39), 255);
    }

    #[test]
    fn test_mapping_is_total() {
        assert_eq!(start_block(u8::MAX), 128 + 16 * 223);
        assert_eq!(trailer_block(u8::MAX), 128 + 16 * 223 + 15);
    }

    #[test]
    fn test_block_to_sector() {
        assert_eq!(Sector::of_block(0), Sector::new(0));
        assert_eq!(Sector::of_block(7), Sector::new(1));
        assert_eq!(Sector::of_block(127), Sector::new(31));
        assert_eq!(Sector::of_block(128), Sector::new(32));
        assert_eq!(Sector::of_block(143), Sector::new(32));
        assert_eq!(Sector::of_block(144), Sector::new(33));

        let sector = Sector::new(2);
        assert!(sector.contains(8));
        assert!(sector.contains(11));
        assert!(!sector.contains(12));
    }

    #[test]
    fn test_trailer_layout() {
        let key = SectorKey::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let block = SectorTrailer::new(key).to_block();
        assert_eq!(
            block,
            [
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xFF, 0x07, 0x80, 0x69, 0x01, 0x02, 0x03,
                0x04, 0x05, 0x06
            ]
        );
    }
}
