//! Background poller opening the relay for authorised tags

use std::sync::Arc;
use std::time::Duration;

use relaylock_mifare_core::{CardTransport, SectorKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::record::ApplicationRecord;
use crate::relay::RelayActuator;
use crate::session::CardController;
use crate::{Error, Result};

/// Keys the poller reads tags with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerKey {
    /// The factory key only
    #[default]
    Default,
    /// The installation key only
    Custom,
    /// The factory key, then the installation key
    Any,
}

impl PollerKey {
    /// The forced key of the poller's sessions, if any
    pub fn required_key(self, custom_key: &SectorKey) -> Option<SectorKey> {
        match self {
            Self::Default => Some(SectorKey::DEFAULT),
            Self::Custom => Some(*custom_key),
            Self::Any => None,
        }
    }
}

/// Result of one read attempt
#[derive(Debug)]
pub enum PollOutcome {
    /// No tag in the field
    NoCard,
    /// The record grants access; the relay was pulsed
    Granted(ApplicationRecord),
    /// The record does not grant access
    Denied(ApplicationRecord),
    /// The tag could not be read, or the relay could not be driven
    Failed(Error),
}

/// Reads the tag in the field periodically and pulses the relay when its
/// record grants cash register access
#[derive(Debug)]
pub struct Poller<T, R> {
    controller: Arc<CardController<T>>,
    relay: R,
    key: PollerKey,
    interval: Duration,
    pulse: Duration,
}

impl<T, R> Poller<T, R>
where
    T: CardTransport + 'static,
    R: RelayActuator,
{
    /// Poller reading with the factory key every 250 ms, pulsing for 300 ms
    pub fn new(controller: Arc<CardController<T>>, relay: R) -> Self {
        Self {
            controller,
            relay,
            key: PollerKey::Default,
            interval: Duration::from_millis(250),
            pulse: Duration::from_millis(300),
        }
    }

    /// Poller with the timings and key of `config`
    pub fn from_config(controller: Arc<CardController<T>>, relay: R, config: &Config) -> Self {
        Self::new(controller, relay)
            .with_key(config.poller.key)
            .with_interval(config.poll_interval())
            .with_pulse(config.pulse_duration())
    }

    /// Read with other keys
    pub const fn with_key(mut self, key: PollerKey) -> Self {
        self.key = key;
        self
    }

    /// Pause between two reads
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// How long the relay stays energised
    pub const fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    /// The relay
    pub const fn relay(&self) -> &R {
        &self.relay
    }

    /// Read the tag in the field once and act on its record
    pub async fn poll_once(&mut self) -> PollOutcome {
        let record = match self.read().await {
            Ok(record) => record,
            Err(e) if e.is_no_card() => {
                trace!("No card in the field");
                return PollOutcome::NoCard;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read card");
                return PollOutcome::Failed(e);
            }
        };

        let layout = self.controller.flag_layout();
        if !record.flags.grants_cash_register(layout) {
            debug!(uid = %record.uid, flags = %record.flags, "Card does not grant access");
            return PollOutcome::Denied(record);
        }

        info!(
            uid = %record.uid,
            username = %record.credentials.username,
            "Card is authorised to open the cash register"
        );
        match self.relay.pulse(self.pulse).await {
            Ok(()) => PollOutcome::Granted(record),
            Err(e) => {
                warn!(error = %e, "Failed to drive relay");
                PollOutcome::Failed(Error::Relay(e))
            }
        }
    }

    /// Poll until `shutdown` completes
    ///
    /// Shutdown is only observed between reads, so a started relay pulse
    /// always finishes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(interval = ?self.interval, key = ?self.key, "Poller started");

        loop {
            self.poll_once().await;
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Poller stopped");
    }

    async fn read(&self) -> Result<ApplicationRecord> {
        let controller = Arc::clone(&self.controller);
        let key = self.key.required_key(controller.custom_key());
        let record = tokio::task::spawn_blocking(move || controller.read_record(None, key)).await??;
        Ok(record)
    }
}
