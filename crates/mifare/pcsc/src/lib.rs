//! PC/SC transport for MIFARE Classic cards
//!
//! This crate implements the [`CardTransport`] contract of
//! `relaylock-mifare-core` for contactless readers reachable through PC/SC
//! (ACR122U and compatibles). Card access goes through the storage-card
//! pseudo-APDUs of PC/SC part 3: GET DATA for the UID, LOAD KEYS and GENERAL
//! AUTHENTICATE for sector authentication, READ BINARY and UPDATE BINARY for
//! block I/O.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use relaylock_mifare_core::CardTransport;
//! use relaylock_mifare_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! let mut transport = manager.open_reader(readers[0].name())?;
//!
//! if let Some(tag_type) = transport.request() {
//!     println!("Found {tag_type}");
//!     if let Some(uid) = transport.anticollision() {
//!         println!("UID: {uid}");
//!     }
//! }
//! transport.stop_crypto();
//! # Ok(())
//! # }
//! ```
//!
//! [`CardTransport`]: relaylock_mifare_core::CardTransport
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod apdu;
mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::PcscConfig;
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;
