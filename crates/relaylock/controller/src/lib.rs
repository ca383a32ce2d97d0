//! Card sessions and the access record protocol of relaylock
//!
//! [`CardController`] owns the one card reader of the installation. Every card
//! access is a session: the reader lock is taken, the tag is detected and
//! selected, the operation runs against each key candidate in turn, and the
//! crypto state is torn down before the lock is released.
//!
//! On top of sessions sit
//!
//! - the four-sector record layout ([`protocol`], [`record`]),
//! - the background [`Poller`] that opens the relay for authorised tags,
//! - the administrative operations used to provision and retire tags ([`Admin`]).
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod admin;
pub mod config;
pub mod poller;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod relay;
pub mod sector;
pub mod session;

mod error;
pub use error::{Error, Result};

pub use admin::{Admin, AdminOutcome, KeyProbe, ProvisionRequest};
pub use config::Config;
pub use poller::{PollOutcome, Poller, PollerKey};
pub use record::{AccessFlags, ApplicationRecord, Credentials, FlagLayout};
pub use registry::{JsonRegistry, RegistryEntry, RegistryError, TagRegistry};
pub use relay::{RelayActuator, SysfsGpioRelay};
pub use sector::SectorSession;
pub use session::CardController;

pub use relaylock_mifare_core as mifare;
