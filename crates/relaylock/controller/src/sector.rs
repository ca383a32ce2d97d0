//! Sector-level operations inside a card session
//!
//! A [`SectorSession`] is handed to every card session operation. It is bound
//! to the selected tag and the key candidate of the current attempt, and
//! authenticates each sector right before touching it.

use relaylock_mifare_core::{
    BLOCK_SIZE, Block, CardTransport, CardUid, DATA_BLOCKS_PER_SECTOR, Error, Result,
    SECTOR_PAYLOAD_SIZE, Sector, SectorKey, SectorTrailer,
};
use tracing::debug;

/// Access to the sectors of the selected tag with one key
pub struct SectorSession<'a> {
    transport: &'a mut dyn CardTransport,
    uid: CardUid,
    key: SectorKey,
}

impl std::fmt::Debug for SectorSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectorSession")
            .field("uid", &self.uid)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<'a> SectorSession<'a> {
    pub(crate) fn new(transport: &'a mut dyn CardTransport, uid: CardUid, key: SectorKey) -> Self {
        Self {
            transport,
            uid,
            key,
        }
    }

    /// UID of the selected tag
    pub const fn uid(&self) -> &CardUid {
        &self.uid
    }

    /// Key candidate of this attempt
    pub const fn key(&self) -> &SectorKey {
        &self.key
    }

    /// Authenticate a sector on its first block, or on its trailer block
    pub fn authenticate_sector(&mut self, sector: Sector, use_trailer_block: bool) -> Result<()> {
        let block = if use_trailer_block {
            sector.trailer_block()
        } else {
            sector.start_block()
        };
        if self.transport.authenticate(block, &self.key, &self.uid) {
            Ok(())
        } else {
            Err(Error::sector_authentication(sector))
        }
    }

    /// Write `data` into the three data blocks of a sector, padded with zeros
    ///
    /// A failing block write leaves the blocks before it written.
    pub fn write_sector(&mut self, sector: Sector, data: &str) -> Result<()> {
        let payload = encode_payload(data)?;
        self.authenticate_sector(sector, false)?;

        for (i, chunk) in payload.chunks_exact(BLOCK_SIZE).enumerate() {
            let block = sector.start_block() + i as u16;
            let mut buffer: Block = [0u8; BLOCK_SIZE];
            buffer.copy_from_slice(chunk);
            if !self.transport.write_block(block, &buffer) {
                return Err(Error::read_write(format!("Failed to write block {block}")));
            }
        }
        debug!(%sector, len = data.len(), "Sector written");
        Ok(())
    }

    /// Read the three data blocks of a sector as text, without trailing zeros
    pub fn read_sector(&mut self, sector: Sector) -> Result<String> {
        self.authenticate_sector(sector, false)?;

        let mut payload = Vec::with_capacity(SECTOR_PAYLOAD_SIZE);
        for i in 0..DATA_BLOCKS_PER_SECTOR as u16 {
            let block = sector.start_block() + i;
            let data = self
                .transport
                .read_block(block)
                .ok_or_else(|| Error::read_write(format!("Failed to read block {block}")))?;
            payload.extend_from_slice(&data);
        }
        decode_payload(payload, sector)
    }

    /// Replace the sector's key, authenticating on the trailer with the session key
    pub fn set_sector_trailer(&mut self, sector: Sector, new_key: &SectorKey) -> Result<()> {
        self.authenticate_sector(sector, true)?;

        let trailer = SectorTrailer::new(*new_key).to_block();
        if !self.transport.write_block(sector.trailer_block(), &trailer) {
            return Err(Error::read_write(format!(
                "Failed to update the key for {sector}"
            )));
        }
        debug!(%sector, "Sector key updated");
        Ok(())
    }
}

/// Check that `data` fits a sector and pad it to the full data area
pub(crate) fn encode_payload(data: &str) -> Result<[u8; SECTOR_PAYLOAD_SIZE]> {
    let bytes = data.as_bytes();
    if bytes.len() > SECTOR_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            len: bytes.len(),
            max: SECTOR_PAYLOAD_SIZE,
        });
    }
    let mut payload = [0u8; SECTOR_PAYLOAD_SIZE];
    payload[..bytes.len()].copy_from_slice(bytes);
    Ok(payload)
}

fn decode_payload(mut payload: Vec<u8>, sector: Sector) -> Result<String> {
    let len = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    payload.truncate(len);
    String::from_utf8(payload)
        .map_err(|_| Error::InvalidEncoding(format!("{sector} does not hold UTF-8 text")))
}
