//! Pipeline error model.

use std::time::Duration;

use thiserror::Error;

use fledger_core::IntervalId;

/// Shown on every id of a batch whose validation call failed outright.
pub const VALIDATION_FAILED_MESSAGE: &str = "adjustment validation failed";

/// Shown on every id of a batch whose save call failed.
pub const SAVE_FAILED_MESSAGE: &str = "failed to save adjustments";

/// Shown on a batch id the validation service did not answer for.
pub const MISSING_RESULT_MESSAGE: &str = "no validation result returned";

/// Failure talking to a validation or persistence collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout(_))
    }
}

/// Why a batch (or part of it) did not end up `saved`.
///
/// None of these ever escape the orchestrator as an `Err`; they are folded into
/// the Status Tracker and reported on the [`Resolution`](crate::Resolution).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineFailure {
    /// The validation service flagged at least one id as `error`.
    #[error("validation rejected {} interval(s)", .ids.len())]
    ValidationRejected { ids: Vec<IntervalId> },

    /// The validation call itself failed (network, parse, timeout).
    #[error("validation transport failure: {message}")]
    ValidationTransportFailure { message: String },

    /// Validation passed but the save call failed.
    #[error("save transport failure: {message}")]
    SaveTransportFailure { message: String },

    /// Results arrived for ids already superseded by a newer edit (or removed).
    #[error("discarded stale results for {} interval(s)", .ids.len())]
    StaleMutation { ids: Vec<IntervalId> },
}

impl PipelineFailure {
    pub(crate) fn validation_transport(err: &ServiceError) -> Self {
        let message = match err {
            ServiceError::Timeout(after) => format!("validation timed out after {} ms", after.as_millis()),
            _ => VALIDATION_FAILED_MESSAGE.to_string(),
        };
        Self::ValidationTransportFailure { message }
    }

    pub(crate) fn save_transport(err: &ServiceError) -> Self {
        let message = match err {
            ServiceError::Timeout(after) => format!("save timed out after {} ms", after.as_millis()),
            _ => SAVE_FAILED_MESSAGE.to_string(),
        };
        Self::SaveTransportFailure { message }
    }

    /// Message written to the Status Tracker for transport failures.
    pub fn status_message(&self) -> Option<&str> {
        match self {
            PipelineFailure::ValidationTransportFailure { message }
            | PipelineFailure::SaveTransportFailure { message } => Some(message),
            PipelineFailure::ValidationRejected { .. } | PipelineFailure::StaleMutation { .. } => None,
        }
    }
}
