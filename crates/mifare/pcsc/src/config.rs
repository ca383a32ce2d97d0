//! Connection parameters of the PC/SC transport

use pcsc::ShareMode;

/// How a [`PcscTransport`](crate::PcscTransport) connects to tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcscConfig {
    /// Lock other PC/SC applications out of the tag while connected
    pub exclusive: bool,
    /// Volatile reader slot that sector keys are loaded into
    ///
    /// ACR122U-class readers offer slots 0 and 1.
    pub key_slot: u8,
}

impl PcscConfig {
    /// Connect exclusively
    pub const fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Load keys into `slot`
    pub const fn with_key_slot(mut self, slot: u8) -> Self {
        self.key_slot = slot;
        self
    }

    pub(crate) const fn share_mode(&self) -> ShareMode {
        if self.exclusive {
            ShareMode::Exclusive
        } else {
            ShareMode::Shared
        }
    }
}
