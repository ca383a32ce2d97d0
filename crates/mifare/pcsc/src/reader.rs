//! Attached PC/SC readers and the tag in their field

use pcsc::{ReaderState, State};
use relaylock_mifare_core::TagType;

use crate::apdu;

/// A PC/SC reader as seen when listing readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    /// Tag in the field, decoded from its ATR
    tag: Option<TagType>,
}

impl PcscReader {
    /// A reader with `tag` in its field
    pub const fn new(name: String, tag: Option<TagType>) -> Self {
        Self { name, tag }
    }

    /// Reader name, as passed to [`PcscDeviceManager::open`]
    ///
    /// [`PcscDeviceManager::open`]: crate::PcscDeviceManager::open
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a tag is in the field
    pub const fn has_card(&self) -> bool {
        self.tag.is_some()
    }

    /// Type of the tag in the field
    pub const fn tag_type(&self) -> Option<TagType> {
        self.tag
    }

    pub(crate) fn from_reader_state(state: &ReaderState) -> Self {
        let events = state.event_state();
        let present = events.contains(State::PRESENT) && !events.contains(State::EMPTY);

        Self {
            name: state.name().to_string_lossy().into_owned(),
            tag: present.then(|| apdu::tag_type_from_atr(state.atr())),
        }
    }
}
