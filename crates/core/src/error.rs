//! Ledger error model.

use thiserror::Error;

use crate::id::IntervalId;

/// Result type used across the synchronous editing layer.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Keep this focused on deterministic failures of the editing API (bad input,
/// broken load contracts). Validation/save transport failures are pipeline
/// concerns and never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A value failed validation (e.g. a non-finite adjustment).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A forecast load contained the same interval id twice.
    #[error("duplicate interval id: {0}")]
    DuplicateInterval(IntervalId),

    /// An identifier was invalid (e.g. empty).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The interval is not part of the current store.
    #[error("interval not found: {0}")]
    NotFound(IntervalId),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(id: IntervalId) -> Self {
        Self::NotFound(id)
    }
}

/// Reject NaN and infinities with a field-specific message.
pub fn ensure_finite(field: &str, value: f64) -> LedgerResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LedgerError::validation(format!("{field} must be a finite number")))
    }
}
