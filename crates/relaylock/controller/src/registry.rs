//! Registry of provisioned tags
//!
//! Access decisions never consult the registry; it records which tags were
//! handed out, to whom, and when.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use relaylock_mifare_core::CardUid;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors of a tag registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry file could not be read or written
    #[error("Registry I/O error: {0}")]
    Io(#[from] io::Error),

    /// The registry file is not a valid entry list
    #[error("Registry format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One provisioned tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// UID of the tag
    #[serde(with = "uid_text")]
    pub uid: CardUid,
    /// Username written to the tag
    pub username: String,
    /// Identifier written to the tag
    pub identifier: String,
    /// Provisioning time as passed by the operator
    pub timestamp: String,
}

/// Storage of provisioned tags
pub trait TagRegistry: Send + Sync {
    /// All entries, in insertion order
    fn get_all(&self) -> Result<Vec<RegistryEntry>, RegistryError>;

    /// Add an entry, replacing one with the same UID
    fn add(&self, entry: RegistryEntry) -> Result<(), RegistryError>;

    /// Remove the entry of `uid`; removing an unknown UID is not an error
    fn remove(&self, uid: &CardUid) -> Result<(), RegistryError>;
}

/// Registry kept as a JSON array in one file
#[derive(Debug)]
pub struct JsonRegistry {
    path: PathBuf,
    /// Serialises read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonRegistry {
    /// Registry backed by `path`; a missing file is an empty registry
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &[RegistryEntry]) -> Result<(), RegistryError> {
        let json = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Registry saved");
        Ok(())
    }
}

impl TagRegistry for JsonRegistry {
    fn get_all(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let _guard = self.lock.lock();
        self.load()
    }

    fn add(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        entries.retain(|e| e.uid != entry.uid);
        entries.push(entry);
        self.save(&entries)
    }

    fn remove(&self, uid: &CardUid) -> Result<(), RegistryError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| e.uid != *uid);
        if entries.len() == before {
            debug!(%uid, "Tag was not registered");
            return Ok(());
        }
        self.save(&entries)
    }
}

mod uid_text {
    use relaylock_mifare_core::CardUid;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(uid: &CardUid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(uid)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CardUid, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
