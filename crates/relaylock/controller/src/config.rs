//! Installation configuration
//!
//! Read from a TOML file, overridden by `RELAYLOCK_`-prefixed environment
//! variables (`RELAYLOCK_POLLER__PULSE_MS=500` sets `poller.pulse_ms`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use relaylock_mifare_core::SectorKey;
use serde::{Deserialize, Serialize};

use crate::poller::PollerKey;
use crate::record::FlagLayout;

/// Default configuration file
pub const DEFAULT_CONFIG_FILE: &str = "relaylock.toml";

/// Prefix of overriding environment variables
pub const ENV_PREFIX: &str = "RELAYLOCK_";

/// relaylock configuration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Prefix of the metadata sector of provisioned tags
    pub meta_prefix: String,
    /// Key of provisioned tags, as `0x` and twelve hex digits
    #[serde(with = "key_text")]
    pub key: SectorKey,
    /// Flag bit convention of the provisioned tags
    #[serde(default)]
    pub flag_layout: FlagLayout,
    /// PC/SC reader; the first one if unset
    #[serde(default)]
    pub reader: Option<String>,
    /// JSON file of the tag registry
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    /// How long provisioning waits for a tag
    #[serde(default = "default_read_uid_timeout_ms")]
    pub read_uid_timeout_ms: u64,
    /// `[poller]` section
    #[serde(default)]
    pub poller: PollerSettings,
    /// `[relay]` section
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Timings and key of the background poller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PollerSettings {
    /// Pause between two reads
    pub interval_ms: u64,
    /// How long the relay stays energised
    pub pulse_ms: u64,
    /// Keys the poller reads with
    pub key: PollerKey,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            pulse_ms: 300,
            key: PollerKey::Default,
        }
    }
}

/// GPIO line of the relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RelaySettings {
    /// GPIO line of the relay
    pub gpio: u32,
    /// Whether driving the line low energises the relay
    pub active_low: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            gpio: 13,
            active_low: true,
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("tags.json")
}

const fn default_read_uid_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Load `path` merged with the environment
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Configuration sources, lowest precedence first
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Key of provisioned tags
    pub const fn custom_key(&self) -> SectorKey {
        self.key
    }

    /// Pause between two poller reads
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms)
    }

    /// How long the relay stays energised
    pub const fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.poller.pulse_ms)
    }

    /// How long provisioning waits for a tag
    pub const fn read_uid_timeout(&self) -> Duration {
        Duration::from_millis(self.read_uid_timeout_ms)
    }
}

mod key_text {
    use relaylock_mifare_core::SectorKey;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(key: &SectorKey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SectorKey, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
