//! PC/SC transport implementation

use std::{ffi::CString, fmt};

use bytes::Bytes;
use pcsc::{Card, Context, Disposition, Protocols};
use relaylock_mifare_core::{Block, CardTransport, CardUid, SectorKey, TagType};
use tracing::{debug, trace, warn};

use crate::{apdu, config::PcscConfig, error::PcscError};

/// Transport implementation using a PC/SC contactless reader
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// Configuration
    config: PcscConfig,
    /// UID read by the last anti-collision
    uid: Option<CardUid>,
    /// Key currently held in the reader's key slot
    loaded_key: Option<SectorKey>,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .field("uid", &self.uid)
            .finish()
    }
}

impl PcscTransport {
    /// Create a new PC/SC transport for the specified reader
    pub(crate) fn new(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        Ok(Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            config,
            uid: None,
            loaded_key: None,
        })
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Check if the transport is connected to a card
    pub const fn has_card(&self) -> bool {
        self.card.is_some()
    }

    /// Connect to the card in the field and return its ATR
    fn connect_card(&mut self) -> Result<Vec<u8>, PcscError> {
        let reader_cstr = CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        let card = match self.context.connect(
            &reader_cstr,
            self.config.share_mode(),
            Protocols::ANY,
        ) {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard) => {
                return Err(PcscError::NoCard(self.reader_name.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let atr = card.get_attribute_owned(pcsc::Attribute::AtrString)?;
        self.card = Some(card);
        // Other applications may have reused the key slot meanwhile
        self.loaded_key = None;
        Ok(atr)
    }

    /// Drop the card connection, resetting the field
    fn disconnect(&mut self, disposition: Disposition) {
        self.uid = None;
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(disposition) {
                debug!(error = %e, "Failed to disconnect card");
            }
        }
    }

    /// Transmit a pseudo-APDU and check its status word
    fn transmit(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;

        trace!(command = %hex::encode(command), "Transmitting command");
        let mut response_buffer = [0u8; 258];
        match card.transmit(command, &mut response_buffer) {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received response");
                apdu::check_status(Bytes::copy_from_slice(response))
            }
            Err(e) => {
                // The card left the field; the next request reconnects
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;
                    self.uid = None;
                }
                Err(e.into())
            }
        }
    }

    fn try_authenticate(&mut self, block: u16, key: &SectorKey) -> Result<(), PcscError> {
        let block = u8::try_from(block).map_err(|_| PcscError::BlockOutOfRange(block))?;
        let slot = self.config.key_slot;
        if self.loaded_key != Some(*key) {
            self.transmit(&apdu::load_key(slot, key))?;
            self.loaded_key = Some(*key);
        }
        self.transmit(&apdu::authenticate(block, slot))?;
        Ok(())
    }

    fn try_read(&mut self, block: u16) -> Result<Block, PcscError> {
        let block = u8::try_from(block).map_err(|_| PcscError::BlockOutOfRange(block))?;
        let data = self.transmit(&apdu::read_binary(block))?;
        Block::try_from(data.as_ref()).map_err(|_| PcscError::ResponseTooShort(data.len()))
    }

    fn try_write(&mut self, block: u16, data: &Block) -> Result<(), PcscError> {
        let block = u8::try_from(block).map_err(|_| PcscError::BlockOutOfRange(block))?;
        self.transmit(&apdu::update_binary(block, data))?;
        Ok(())
    }
}

impl CardTransport for PcscTransport {
    fn request(&mut self) -> Option<TagType> {
        // Every session starts from a fresh connection
        self.disconnect(Disposition::LeaveCard);
        match self.connect_card() {
            Ok(atr) => Some(apdu::tag_type_from_atr(&atr)),
            Err(e) if is_empty_field(&e) => {
                debug!(reader = %self.reader_name, error = %e, "No card in the field");
                None
            }
            Err(e) => {
                warn!(reader = %self.reader_name, error = %e, "Presence request failed");
                None
            }
        }
    }

    fn anticollision(&mut self) -> Option<CardUid> {
        let uid = self
            .transmit(&apdu::get_uid())
            .map_err(|e| debug!(error = %e, "GET DATA UID failed"))
            .ok()
            .and_then(|data| {
                CardUid::try_from(data.as_ref())
                    .map_err(|e| debug!(error = %e, "Reader returned an invalid UID"))
                    .ok()
            })?;
        self.uid = Some(uid.clone());
        Some(uid)
    }

    fn select_tag(&mut self, uid: &CardUid) -> bool {
        // PC/SC readers select the tag while connecting
        self.card.is_some() && self.uid.as_ref() == Some(uid)
    }

    fn stop_crypto(&mut self) {
        // Resetting the field terminates the Crypto1 session
        self.disconnect(Disposition::ResetCard);
    }

    fn do_authenticate(&mut self, block: u16, key: &SectorKey, uid: &CardUid) -> bool {
        if self.uid.as_ref() != Some(uid) {
            return false;
        }
        self.try_authenticate(block, key)
            .map_err(|e| debug!(block, error = %e, "GENERAL AUTHENTICATE failed"))
            .is_ok()
    }

    fn do_read_block(&mut self, block: u16) -> Option<Block> {
        self.try_read(block)
            .map_err(|e| debug!(block, error = %e, "READ BINARY failed"))
            .ok()
    }

    fn do_write_block(&mut self, block: u16, data: &Block) -> bool {
        self.try_write(block, data)
            .map_err(|e| debug!(block, error = %e, "UPDATE BINARY failed"))
            .is_ok()
    }
}

/// Errors drivers use to report a field without a tag
fn is_empty_field(error: &PcscError) -> bool {
    matches!(
        error,
        PcscError::NoCard(_)
            | PcscError::Pcsc(
                pcsc::Error::NoSmartcard
                    | pcsc::Error::RemovedCard
                    | pcsc::Error::ResetCard
                    | pcsc::Error::ReaderUnavailable
            )
    )
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        self.disconnect(Disposition::LeaveCard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_field_errors() {
        for error in [
            PcscError::NoCard("ACR122U".into()),
            PcscError::Pcsc(pcsc::Error::NoSmartcard),
            PcscError::Pcsc(pcsc::Error::RemovedCard),
            PcscError::Pcsc(pcsc::Error::ReaderUnavailable),
        ] {
            assert!(is_empty_field(&error), "{error}");
        }
        assert!(!is_empty_field(&PcscError::Pcsc(pcsc::Error::NoService)));
        assert!(!is_empty_field(&PcscError::Status(0x6300)));
    }
}
