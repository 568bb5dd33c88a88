//! Collaborator boundary: validation and persistence services.
//!
//! Both services receive the post-mutation snapshots of one batch. Validation
//! answers per id; persistence answers once for the whole batch, which is why
//! save failures are batch-wide.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use fledger_adjustments::{IntervalSnapshot, PipelineStatus};
use fledger_core::IntervalId;

use crate::error::ServiceError;

/// Per-id verdict from the validation service.
///
/// Anything other than `"error"` or `"warning"` is read as `ok`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationVerdict {
    Error,
    Warning,
    #[default]
    #[serde(other)]
    Ok,
}

impl ValidationVerdict {
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationVerdict::Error)
    }

    pub fn status(&self) -> PipelineStatus {
        match self {
            ValidationVerdict::Error => PipelineStatus::Error,
            ValidationVerdict::Warning => PipelineStatus::Warning,
            ValidationVerdict::Ok => PipelineStatus::Ok,
        }
    }
}

/// One entry of a validation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: IntervalId,
    #[serde(default)]
    pub status: ValidationVerdict,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok(id: IntervalId) -> Self {
        Self {
            id,
            status: ValidationVerdict::Ok,
            message: None,
        }
    }

    pub fn warning(id: IntervalId, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ValidationVerdict::Warning,
            message: Some(message.into()),
        }
    }

    pub fn error(id: IntervalId, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ValidationVerdict::Error,
            message: Some(message.into()),
        }
    }
}

/// Keep string messages, drop anything else (numbers, objects, null).
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Validates a batch of post-mutation snapshots.
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// One result per requested id is expected; missing ids are treated as
    /// errors by the orchestrator.
    async fn validate(&self, batch: &[IntervalSnapshot]) -> Result<Vec<ValidationResult>, ServiceError>;
}

/// Persists a validated batch. All-or-nothing: a single success/failure.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn save(&self, batch: &[IntervalSnapshot]) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_status_reads_as_ok() {
        let results: Vec<ValidationResult> = serde_json::from_value(json!([
            {"id": "a", "status": "error", "message": "exceeds threshold"},
            {"id": "b", "status": "warning"},
            {"id": "c", "status": "fine"},
            {"id": "d"}
        ]))
        .unwrap();

        let verdicts: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            verdicts,
            vec![
                ValidationVerdict::Error,
                ValidationVerdict::Warning,
                ValidationVerdict::Ok,
                ValidationVerdict::Ok
            ]
        );
        assert_eq!(results[0].message.as_deref(), Some("exceeds threshold"));
    }

    #[test]
    fn non_string_message_is_dropped() {
        let result: ValidationResult =
            serde_json::from_value(json!({"id": "a", "status": "warning", "message": 42})).unwrap();
        assert_eq!(result.message, None);
    }

    #[test]
    fn verdict_maps_to_pipeline_status() {
        assert_eq!(ValidationVerdict::Error.status(), PipelineStatus::Error);
        assert_eq!(ValidationVerdict::Warning.status(), PipelineStatus::Warning);
        assert_eq!(ValidationVerdict::Ok.status(), PipelineStatus::Ok);
    }
}
