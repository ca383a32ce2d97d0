//! In-memory MIFARE Classic 1K tag for tests

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use super::CardTransport;
use crate::{BLOCK_SIZE, Block, CardUid, Sector, SectorKey, SectorTrailer, TagType};

/// Number of blocks of a 1K card
const BLOCK_COUNT: usize = 64;

/// A transport call as seen by the simulated card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TransportCall {
    Request,
    Anticollision,
    Select,
    Authenticate { block: u16 },
    Read { block: u16 },
    Write { block: u16 },
    StopCrypto,
}

/// A transport call together with the thread that made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Calling thread
    pub thread: ThreadId,
    /// The call
    pub call: TransportCall,
}

#[derive(Debug)]
struct MockCard {
    present: bool,
    uid: CardUid,
    tag_type: TagType,
    blocks: Vec<Block>,
    /// Presence requests that fail before the card answers
    request_failures: usize,
    fail_anticollision: bool,
    fail_select: bool,
    fail_read: Option<u16>,
    fail_write: Option<u16>,
    selected: bool,
    authenticated: Option<Sector>,
    latency: Option<Duration>,
    calls: Vec<RecordedCall>,
}

impl MockCard {
    fn new() -> Self {
        let mut blocks = vec![[0u8; BLOCK_SIZE]; BLOCK_COUNT];
        let trailer = SectorTrailer::new(SectorKey::DEFAULT).to_block();
        for sector in 0..16 {
            blocks[crate::trailer_block(sector) as usize] = trailer;
        }

        Self {
            present: true,
            uid: CardUid::from([0x04, 0xA1, 0xB2, 0xC3]),
            tag_type: TagType::Classic1K,
            blocks,
            request_failures: 0,
            fail_anticollision: false,
            fail_select: false,
            fail_read: None,
            fail_write: None,
            selected: false,
            authenticated: None,
            latency: None,
            calls: Vec::new(),
        }
    }

    fn record(&mut self, call: TransportCall) {
        self.calls.push(RecordedCall {
            thread: thread::current().id(),
            call,
        });
    }

    fn key_a(&self, sector: Sector) -> Option<SectorKey> {
        let trailer = self.blocks.get(sector.trailer_block() as usize)?;
        SectorKey::try_from(&trailer[..SectorKey::LEN]).ok()
    }

    fn block_accessible(&self, block: u16) -> bool {
        (block as usize) < BLOCK_COUNT
            && self
                .authenticated
                .is_some_and(|sector| sector.contains(block))
    }
}

/// Simulated MIFARE Classic 1K tag in front of a reader
///
/// Clones share the same card, so a test can keep a handle for inspection
/// after moving the transport into a controller. A failed authentication
/// drops the tag out of the selected state like a real card does; it has to be
/// requested and selected again before the next authentication succeeds.
#[derive(Debug, Clone)]
pub struct MockTransport {
    card: Arc<Mutex<MockCard>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A blank card with UID `0x04A1B2C3` and default keys in the field
    pub fn new() -> Self {
        Self {
            card: Arc::new(Mutex::new(MockCard::new())),
        }
    }

    /// Use a different UID
    pub fn with_uid(self, uid: CardUid) -> Self {
        self.card.lock().uid = uid;
        self
    }

    /// Report a different tag type
    pub fn with_tag_type(self, tag_type: TagType) -> Self {
        self.card.lock().tag_type = tag_type;
        self
    }

    /// Start without a card in the field
    pub fn absent(self) -> Self {
        self.card.lock().present = false;
        self
    }

    /// Let the next `count` presence requests fail
    pub fn with_request_failures(self, count: usize) -> Self {
        self.card.lock().request_failures = count;
        self
    }

    /// Protect sectors with `key`
    pub fn with_key(self, sectors: impl IntoIterator<Item = u8>, key: SectorKey) -> Self {
        {
            let mut card = self.card.lock();
            for sector in sectors {
                let block = crate::trailer_block(sector) as usize;
                card.blocks[block] = SectorTrailer::new(key).to_block();
            }
        }
        self
    }

    /// Make anti-collision fail
    pub fn with_failing_anticollision(self) -> Self {
        self.card.lock().fail_anticollision = true;
        self
    }

    /// Make tag selection fail
    pub fn with_failing_select(self) -> Self {
        self.card.lock().fail_select = true;
        self
    }

    /// Make reads of `block` fail
    pub fn with_failing_read(self, block: u16) -> Self {
        self.card.lock().fail_read = Some(block);
        self
    }

    /// Make writes to `block` fail
    pub fn with_failing_write(self, block: u16) -> Self {
        self.card.lock().fail_write = Some(block);
        self
    }

    /// Delay every call, widening the window for interleaving
    pub fn with_latency(self, latency: Duration) -> Self {
        self.card.lock().latency = Some(latency);
        self
    }

    /// Put the card into the field
    pub fn insert(&self) {
        self.card.lock().present = true;
    }

    /// Take the card out of the field
    pub fn remove(&self) {
        let mut card = self.card.lock();
        card.present = false;
        card.selected = false;
        card.authenticated = None;
    }

    /// Store `data` in the data blocks of a sector, bypassing authentication
    pub fn store(&self, sector: u8, data: &[u8]) {
        let mut card = self.card.lock();
        let start = crate::start_block(sector) as usize;
        for (i, chunk) in data.chunks(BLOCK_SIZE).take(3).enumerate() {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            card.blocks[start + i] = block;
        }
        for i in data.len().div_ceil(BLOCK_SIZE)..3 {
            card.blocks[start + i] = [0u8; BLOCK_SIZE];
        }
    }

    /// Raw content of a block
    pub fn block(&self, block: u16) -> Block {
        self.card.lock().blocks[block as usize]
    }

    /// Key A currently protecting a sector
    pub fn sector_key(&self, sector: u8) -> Option<SectorKey> {
        self.card.lock().key_a(Sector::new(sector))
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.card.lock().calls.clone()
    }

    /// Number of calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.card
            .lock()
            .calls
            .iter()
            .filter(|c| predicate(&c.call))
            .count()
    }

    /// Forget the recorded calls
    pub fn clear_calls(&self) {
        self.card.lock().calls.clear();
    }

    fn with_card<R>(&self, call: TransportCall, f: impl FnOnce(&mut MockCard) -> R) -> R {
        let latency = {
            let mut card = self.card.lock();
            card.record(call);
            card.latency
        };
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        f(&mut self.card.lock())
    }
}

impl CardTransport for MockTransport {
    fn request(&mut self) -> Option<TagType> {
        self.with_card(TransportCall::Request, |card| {
            if !card.present {
                return None;
            }
            if card.request_failures > 0 {
                card.request_failures -= 1;
                return None;
            }
            card.selected = false;
            card.authenticated = None;
            Some(card.tag_type)
        })
    }

    fn anticollision(&mut self) -> Option<CardUid> {
        self.with_card(TransportCall::Anticollision, |card| {
            (card.present && !card.fail_anticollision).then(|| card.uid.clone())
        })
    }

    fn select_tag(&mut self, uid: &CardUid) -> bool {
        self.with_card(TransportCall::Select, |card| {
            card.selected = card.present && !card.fail_select && card.uid == *uid;
            card.selected
        })
    }

    fn stop_crypto(&mut self) {
        self.with_card(TransportCall::StopCrypto, |card| {
            card.authenticated = None;
        })
    }

    fn do_authenticate(&mut self, block: u16, key: &SectorKey, uid: &CardUid) -> bool {
        self.with_card(TransportCall::Authenticate { block }, |card| {
            let sector = Sector::of_block(block);
            let ok = card.present
                && card.selected
                && card.uid == *uid
                && (block as usize) < BLOCK_COUNT
                && card.key_a(sector) == Some(*key);
            if ok {
                card.authenticated = Some(sector);
            } else {
                card.authenticated = None;
                card.selected = false;
            }
            ok
        })
    }

    fn do_read_block(&mut self, block: u16) -> Option<Block> {
        self.with_card(TransportCall::Read { block }, |card| {
            if card.fail_read == Some(block) || !card.present || !card.block_accessible(block) {
                return None;
            }
            Some(card.blocks[block as usize])
        })
    }

    fn do_write_block(&mut self, block: u16, data: &Block) -> bool {
        self.with_card(TransportCall::Write { block }, |card| {
            if card.fail_write == Some(block) || !card.present || !card.block_accessible(block) {
                return false;
            }
            card.blocks[block as usize] = *data;
            true
        })
    }
}
