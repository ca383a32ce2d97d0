//! Error types for the PC/SC transport

/// PC/SC-specific errors
///
/// These never cross the [`CardTransport`](relaylock_mifare_core::CardTransport)
/// boundary; the transport logs them and reports a failed call instead.
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// The reader answered with an error status word
    #[error("Status word error: {0:#06X}")]
    Status(u16),

    /// The reader answer is too short to carry a status word
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Block address outside what the pseudo-APDUs can express
    #[error("Block {0} cannot be addressed")]
    BlockOutOfRange(u16),
}
