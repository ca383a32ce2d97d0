//! Transport contract for MIFARE Classic readers
//!
//! A transport wraps one physical reader. It performs single blocking
//! round-trips and reports failures as `false`/`None`; it has no notion of
//! sessions, key candidates or the application layout. Those belong to the
//! layers above, which also turn the results into typed errors.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockTransport, RecordedCall, TransportCall};

use core::fmt;

use tracing::{debug, trace};

use crate::{Block, CardUid, SectorKey, TagType};

/// Trait for MIFARE Classic reader transports
pub trait CardTransport: Send + fmt::Debug {
    /// Probe for an idle tag in the field
    ///
    /// Returns the tag type when a tag answered.
    fn request(&mut self) -> Option<TagType>;

    /// Run anti-collision and return the UID of the tag in the field
    fn anticollision(&mut self) -> Option<CardUid>;

    /// Select the tag with the given UID
    fn select_tag(&mut self, uid: &CardUid) -> bool;

    /// Authenticate a block with key A
    fn authenticate(&mut self, block: u16, key: &SectorKey, uid: &CardUid) -> bool {
        let ok = self.do_authenticate(block, key, uid);
        if ok {
            trace!(block, %uid, "Authenticated block");
        } else {
            debug!(block, %uid, ?key, "Block authentication rejected");
        }
        ok
    }

    /// Read one 16 byte block of an authenticated sector
    fn read_block(&mut self, block: u16) -> Option<Block> {
        let data = self.do_read_block(block);
        match &data {
            Some(bytes) => trace!(block, data = %hex::encode(bytes), "Read block"),
            None => debug!(block, "Block read failed"),
        }
        data
    }

    /// Write one 16 byte block of an authenticated sector
    fn write_block(&mut self, block: u16, data: &Block) -> bool {
        trace!(block, data = %hex::encode(data), "Writing block");
        let ok = self.do_write_block(block, data);
        if !ok {
            debug!(block, "Block write failed");
        }
        ok
    }

    /// Tear down the crypto session of the last authentication
    fn stop_crypto(&mut self);

    /// Internal implementation of [`CardTransport::authenticate`]
    fn do_authenticate(&mut self, block: u16, key: &SectorKey, uid: &CardUid) -> bool;

    /// Internal implementation of [`CardTransport::read_block`]
    fn do_read_block(&mut self, block: u16) -> Option<Block>;

    /// Internal implementation of [`CardTransport::write_block`]
    fn do_write_block(&mut self, block: u16, data: &Block) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn request(&mut self) -> Option<TagType> {
        (**self).request()
    }

    fn anticollision(&mut self) -> Option<CardUid> {
        (**self).anticollision()
    }

    fn select_tag(&mut self, uid: &CardUid) -> bool {
        (**self).select_tag(uid)
    }

    fn stop_crypto(&mut self) {
        (**self).stop_crypto()
    }

    fn do_authenticate(&mut self, block: u16, key: &SectorKey, uid: &CardUid) -> bool {
        (**self).do_authenticate(block, key, uid)
    }

    fn do_read_block(&mut self, block: u16) -> Option<Block> {
        (**self).do_read_block(block)
    }

    fn do_write_block(&mut self, block: u16, data: &Block) -> bool {
        (**self).do_write_block(block, data)
    }
}
