//! Adjustment ledger domain module.
//!
//! This crate holds the synchronous half of the ledger, implemented purely as
//! deterministic logic (no IO, no async, no clock):
//!
//! - `IntervalStore`: the canonical interval list and the only writer of values
//! - `Selection`: ids chosen for the next batch edit
//! - `ChangeSet` / `AdjustmentCommand`: reversible batch edits
//! - `History`: linear undo/redo over applied Change Sets
//! - `StatusTracker` / `Badge`: per-id pipeline status and the idle fallback

pub mod change;
pub mod history;
pub mod interval;
pub mod selection;
pub mod status;
pub mod store;
pub mod summary;

pub use change::{AdjustmentCommand, ChangeEntry, ChangeSet, IncrementAdjustment, SetAdjustment};
pub use history::History;
pub use interval::{ForecastPoint, Interval, IntervalSnapshot, required_agents};
pub use selection::Selection;
pub use status::{Badge, PipelineStatus, StatusRecord, StatusTracker, fallback_badge};
pub use store::IntervalStore;
pub use summary::AdjustmentSummary;
