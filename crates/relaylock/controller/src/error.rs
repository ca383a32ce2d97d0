use relaylock_mifare_core::Error as CardError;

use crate::registry::RegistryError;

/// Result type for controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for controller operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Card session errors
    #[error(transparent)]
    Card(#[from] CardError),

    /// The relay output could not be driven
    #[error("Relay error: {0}")]
    Relay(#[source] std::io::Error),

    /// Authorised tag registry errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A blocking card session task panicked or was cancelled
    #[error("Card session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// The card error, if this is one
    pub const fn card(&self) -> Option<&CardError> {
        match self {
            Self::Card(e) => Some(e),
            _ => None,
        }
    }

    /// Whether no (matching) card was in the field
    pub fn is_no_card(&self) -> bool {
        self.card().is_some_and(CardError::is_no_card)
    }
}

impl From<figment::Error> for Error {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}
