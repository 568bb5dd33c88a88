//! `fledger-pipeline`: the asynchronous half of the adjustment ledger.
//!
//! **Responsibility:** drive applied Change Sets through validate → save and
//! fold the outcomes back into the Status Tracker, without ever blocking
//! further editing.
//!
//! - `service`: collaborator traits and wire types
//! - `local` / `http`: in-process and HTTP implementations of those traits
//! - `orchestrator`: per-batch state machine with per-id generation fencing
//! - `session`: the edit-session object tying store, history, selection,
//!   tracker and orchestrator together

pub mod config;
pub mod error;
pub mod http;
pub mod local;
pub mod orchestrator;
pub mod service;
pub mod session;

pub use config::PipelineConfig;
pub use error::{PipelineFailure, ServiceError};
pub use http::HttpAdjustmentsClient;
pub use local::{InMemoryPersistence, ThresholdValidator};
pub use orchestrator::{Orchestrator, Resolution, Stage};
pub use service::{PersistenceService, ValidationResult, ValidationService, ValidationVerdict};
pub use session::{EditSession, RowView};
