//! Administrative operations on tags
//!
//! These are the operations an operator front end drives: provisioning new
//! tags, retiring them, and inspecting the tag in the field. Each card access
//! runs on the blocking thread pool and competes with the [`Poller`] for the
//! reader lock.
//!
//! [`Poller`]: crate::Poller

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relaylock_mifare_core::{CardTransport, CardUid, Error as CardError, SectorKey};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::record::Credentials;
use crate::registry::{RegistryEntry, TagRegistry};
use crate::session::CardController;
use crate::{Error, Result};

/// Result of an administrative operation, as reported to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOutcome {
    /// Whether the operation completed
    pub success: bool,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl AdminOutcome {
    /// A successful outcome
    pub const fn ok() -> Self {
        Self {
            success: true,
            msg: None,
        }
    }

    /// A failed outcome with its reason
    pub fn failure(msg: impl fmt::Display) -> Self {
        Self {
            success: false,
            msg: Some(msg.to_string()),
        }
    }
}

impl<E: fmt::Display> From<std::result::Result<(), E>> for AdminOutcome {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failure(e),
        }
    }
}

/// A tag to provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Username written to the tag
    pub username: String,
    /// External identifier of the user
    #[serde(alias = "collmex_id")]
    pub identifier: String,
    /// Password written to the tag
    pub password: String,
    /// Registration time, stored verbatim in the registry
    pub timestamp: String,
}

impl ProvisionRequest {
    fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.identifier, &self.password)
    }
}

/// Which keys open all record sectors of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProbe {
    /// The factory key
    pub default: bool,
    /// The installation key
    pub custom: bool,
}

/// Administrative front of a [`CardController`] and a [`TagRegistry`]
pub struct Admin<T> {
    controller: Arc<CardController<T>>,
    registry: Arc<dyn TagRegistry>,
    read_uid_timeout: Duration,
    poll_interval: Duration,
}

impl<T: fmt::Debug> fmt::Debug for Admin<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admin")
            .field("controller", &self.controller)
            .field("read_uid_timeout", &self.read_uid_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<T: CardTransport + 'static> Admin<T> {
    /// Admin front waiting up to 10 s for tags
    pub fn new(controller: Arc<CardController<T>>, registry: Arc<dyn TagRegistry>) -> Self {
        Self {
            controller,
            registry,
            read_uid_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Admin front with the timings of `config`
    pub fn from_config(
        controller: Arc<CardController<T>>,
        registry: Arc<dyn TagRegistry>,
        config: &Config,
    ) -> Self {
        Self::new(controller, registry)
            .with_read_uid_timeout(config.read_uid_timeout(), config.poll_interval())
    }

    /// How long [`Admin::read_uid`] waits for a tag, checking every `interval`
    pub const fn with_read_uid_timeout(mut self, timeout: Duration, interval: Duration) -> Self {
        self.read_uid_timeout = timeout;
        self.poll_interval = interval;
        self
    }

    /// The card controller
    pub const fn controller(&self) -> &Arc<CardController<T>> {
        &self.controller
    }

    /// Run a card session on the blocking thread pool
    async fn session<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&CardController<T>) -> relaylock_mifare_core::Result<R> + Send + 'static,
    {
        let controller = Arc::clone(&self.controller);
        Ok(tokio::task::spawn_blocking(move || f(&controller)).await??)
    }

    /// UID of the next tag presented, waiting up to the configured timeout
    pub async fn read_uid(&self) -> Result<CardUid> {
        let deadline = Instant::now() + self.read_uid_timeout;
        loop {
            match self.session(|ctl| ctl.read_uid()).await {
                Err(e) if e.is_no_card() && Instant::now() < deadline => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) if e.is_no_card() => {
                    debug!(timeout = ?self.read_uid_timeout, "No card presented");
                    return Err(CardError::no_card().into());
                }
                result => return result,
            }
        }
    }

    async fn target_uid(&self, uid: Option<CardUid>) -> Result<CardUid> {
        match uid {
            Some(uid) => Ok(uid),
            None => self.read_uid().await,
        }
    }

    /// Set the installation key on a blank tag
    pub async fn set_custom_key(&self, uid: Option<CardUid>) -> AdminOutcome {
        self.session(move |ctl| {
            ctl.rekey_all_sectors(ctl.custom_key(), uid.as_ref(), Some(SectorKey::DEFAULT))
        })
        .await
        .into()
    }

    /// Write a full record with the provisioning flags
    pub async fn write_record(&self, credentials: Credentials, uid: Option<CardUid>) -> AdminOutcome {
        self.session(move |ctl| ctl.write_record(&credentials, uid.as_ref(), None, None))
            .await
            .into()
    }

    /// Clear the record and restore the factory key
    pub async fn erase(&self, uid: Option<CardUid>) -> AdminOutcome {
        self.session(move |ctl| {
            ctl.erase_record(uid.as_ref(), None)?;
            ctl.rekey_all_sectors(&SectorKey::DEFAULT, uid.as_ref(), None)
        })
        .await
        .into()
    }

    /// Which of the two keys open the tag in the field
    pub async fn probe(&self, uid: Option<CardUid>) -> Result<KeyProbe> {
        self.session(move |ctl| {
            Ok(KeyProbe {
                default: ctl.test_authentication(uid.as_ref(), SectorKey::DEFAULT)?,
                custom: ctl.test_authentication(uid.as_ref(), *ctl.custom_key())?,
            })
        })
        .await
    }

    /// Provision the next presented tag and register it
    ///
    /// The tag is rekeyed from the factory key to the installation key, the
    /// record is written and the tag is added to the registry. A failing step
    /// ends the flow; steps already done are not undone.
    #[instrument(level = "info", skip_all, fields(username = %request.username))]
    pub async fn provision(&self, request: ProvisionRequest) -> AdminOutcome {
        let uid = match self.read_uid().await {
            Ok(uid) => uid,
            Err(e) => return fail("read the card", e),
        };
        info!(%uid, "Provisioning card");

        let outcome = self.set_custom_key(Some(uid.clone())).await;
        if !outcome.success {
            return outcome;
        }
        let outcome = self.write_record(request.credentials(), Some(uid.clone())).await;
        if !outcome.success {
            return outcome;
        }

        let entry = RegistryEntry {
            uid: uid.clone(),
            username: request.username,
            identifier: request.identifier,
            timestamp: request.timestamp,
        };
        if let Err(e) = self.registry.add(entry) {
            return fail("register the card", e);
        }
        info!(%uid, "Card provisioned");
        AdminOutcome::ok()
    }

    /// Retire a tag
    ///
    /// Without `uid` the next presented tag is retired. With `reset` the
    /// record is erased and the factory key restored before the tag leaves the
    /// registry.
    #[instrument(level = "info", skip(self))]
    pub async fn deregister(&self, uid: Option<CardUid>, reset: bool) -> AdminOutcome {
        let uid = match self.target_uid(uid).await {
            Ok(uid) => uid,
            Err(e) => return fail("read the card", e),
        };

        if reset {
            let outcome = self.erase(Some(uid.clone())).await;
            if !outcome.success {
                return outcome;
            }
        }
        if let Err(e) = self.registry.remove(&uid) {
            return fail("deregister the card", e);
        }
        info!(%uid, reset, "Card deregistered");
        AdminOutcome::ok()
    }

    /// Rewrite the flags of a tag provisioned with the legacy flag layout
    ///
    /// The record is read with any known key and written back with its flags
    /// converted to the current layout. Without `uid` the next presented tag
    /// is migrated.
    #[instrument(level = "info", skip(self))]
    pub async fn migrate(&self, uid: Option<CardUid>) -> AdminOutcome {
        let uid = match self.target_uid(uid).await {
            Ok(uid) => uid,
            Err(e) => return fail("read the card", e),
        };

        let target = uid.clone();
        let result = self
            .session(move |ctl| {
                let record = ctl.read_record(Some(&target), None)?;
                let flags = record.flags.migrate_legacy();
                ctl.write_record(&record.credentials, Some(&target), None, Some(flags))?;
                Ok((record.flags, flags))
            })
            .await;
        match result {
            Ok((legacy, current)) => {
                info!(%uid, %legacy, %current, "Card flags migrated");
                AdminOutcome::ok()
            }
            Err(e) => fail("migrate the card", e),
        }
    }

    /// Registered tags
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.registry.get_all()?)
    }
}

fn fail(step: &str, error: impl Into<Error>) -> AdminOutcome {
    let error = error.into();
    warn!(error = %error, "Failed to {step}");
    AdminOutcome::failure(error)
}
