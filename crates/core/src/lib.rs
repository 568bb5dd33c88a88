//! `fledger-core`: shared building blocks for the adjustment ledger.
//!
//! This crate contains **pure** primitives (no IO, no async): identifiers, the
//! synchronous error model and the ledger configuration.

pub mod config;
pub mod error;
pub mod id;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use id::{BatchId, IntervalId};
