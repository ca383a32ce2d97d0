//! Core types and traits for MIFARE Classic card access
//!
//! This crate provides the foundational pieces shared by every relaylock crate:
//!
//! - Sector/block addressing for the classic 1K/4K memory layout
//! - Card identifiers, sector keys and sector trailer encoding
//! - The [`CardTransport`] contract a reader driver has to fulfil
//! - The card failure family ([`Error`]) that higher layers translate transport results into
//!
//! With the `mock` feature enabled, [`transport::MockTransport`] simulates a
//! MIFARE Classic 1K tag in memory, which is what the test suites of the
//! higher layers run against.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod key;
pub mod sector;
pub mod tag;
pub mod transport;
pub mod uid;

mod error;
pub use error::{Error, NoCardReason, Result};

pub use key::SectorKey;
pub use sector::{
    BLOCK_SIZE, Block, DATA_BLOCKS_PER_SECTOR, SECTOR_PAYLOAD_SIZE, Sector, SectorTrailer,
    start_block, trailer_block,
};
pub use tag::TagType;
pub use transport::CardTransport;
pub use uid::CardUid;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Block, CardTransport, CardUid, Error, NoCardReason, Result, Sector, SectorKey,
        SectorTrailer, TagType,
    };
}
