//! PC/SC part 3 pseudo-APDUs for contactless storage cards

use bytes::Bytes;
use relaylock_mifare_core::{BLOCK_SIZE, Block, SectorKey, TagType};

use crate::error::PcscError;

const CLA: u8 = 0xFF;
const INS_GET_DATA: u8 = 0xCA;
const INS_LOAD_KEYS: u8 = 0x82;
const INS_GENERAL_AUTHENTICATE: u8 = 0x86;
const INS_READ_BINARY: u8 = 0xB0;
const INS_UPDATE_BINARY: u8 = 0xD6;

/// MIFARE key A
const KEY_TYPE_A: u8 = 0x60;

/// GET DATA for the UID of the card in the field
pub(crate) const fn get_uid() -> [u8; 5] {
    [CLA, INS_GET_DATA, 0x00, 0x00, 0x00]
}

/// LOAD KEYS into a volatile reader slot
pub(crate) fn load_key(slot: u8, key: &SectorKey) -> Vec<u8> {
    let mut command = vec![CLA, INS_LOAD_KEYS, 0x00, slot, SectorKey::LEN as u8];
    command.extend_from_slice(key.as_bytes());
    command
}

/// GENERAL AUTHENTICATE a block with key A from a reader slot
pub(crate) fn authenticate(block: u8, slot: u8) -> [u8; 10] {
    [
        CLA,
        INS_GENERAL_AUTHENTICATE,
        0x00,
        0x00,
        0x05,
        0x01,
        0x00,
        block,
        KEY_TYPE_A,
        slot,
    ]
}

/// READ BINARY of one block
pub(crate) const fn read_binary(block: u8) -> [u8; 5] {
    [CLA, INS_READ_BINARY, 0x00, block, BLOCK_SIZE as u8]
}

/// UPDATE BINARY of one block
pub(crate) fn update_binary(block: u8, data: &Block) -> Vec<u8> {
    let mut command = vec![CLA, INS_UPDATE_BINARY, 0x00, block, BLOCK_SIZE as u8];
    command.extend_from_slice(data);
    command
}

/// Split a response into payload and status word, failing on anything but `90 00`
pub(crate) fn check_status(response: Bytes) -> Result<Bytes, PcscError> {
    if response.len() < 2 {
        return Err(PcscError::ResponseTooShort(response.len()));
    }
    let split = response.len() - 2;
    let sw = u16::from_be_bytes([response[split], response[split + 1]]);
    if sw != 0x9000 {
        return Err(PcscError::Status(sw));
    }
    Ok(response.slice(..split))
}

/// Tag type from a PC/SC part 3 storage card ATR
///
/// Such ATRs carry the registered application identifier `A0 00 00 03 06`
/// followed by the card standard byte and the two byte card name.
pub(crate) fn tag_type_from_atr(atr: &[u8]) -> TagType {
    const RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

    let Some(pos) = atr.windows(RID.len()).position(|w| w == RID) else {
        return TagType::Unknown(0x00);
    };
    match atr.get(pos + RID.len() + 1..pos + RID.len() + 3) {
        Some([0x00, 0x01]) => TagType::Classic1K,
        Some([0x00, 0x02]) => TagType::Classic4K,
        Some([0x00, 0x03]) => TagType::Ultralight,
        Some([0x00, 0x26]) => TagType::Mini,
        _ => TagType::Unknown(0x00),
    }
}
