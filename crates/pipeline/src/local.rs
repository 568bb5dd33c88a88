//! In-process collaborators: threshold-based validation and in-memory persistence.

use std::sync::Mutex;

use async_trait::async_trait;

use fledger_adjustments::IntervalSnapshot;

use crate::error::ServiceError;
use crate::service::{PersistenceService, ValidationResult, ValidationService};

/// Default `|adjustment|` above which the threshold validator warns.
pub const DEFAULT_WARN_ABOVE: f64 = 20.0;

/// Offline validation: warn on large adjustments, reject out-of-bounds ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdValidator {
    pub warn_above: f64,
    pub min_adjustment: Option<f64>,
    pub max_adjustment: Option<f64>,
}

impl Default for ThresholdValidator {
    fn default() -> Self {
        Self {
            warn_above: DEFAULT_WARN_ABOVE,
            min_adjustment: None,
            max_adjustment: None,
        }
    }
}

impl ThresholdValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_adjustment = Some(min);
        self.max_adjustment = Some(max);
        self
    }

    /// Verdict for a single snapshot. Bounds win over the warning threshold.
    pub fn check(&self, snapshot: &IntervalSnapshot) -> ValidationResult {
        let id = snapshot.id.clone();
        let adjustment = snapshot.adjustment;

        if let Some(min) = self.min_adjustment {
            if adjustment < min {
                return ValidationResult::error(id, format!("minimum adjustment: {min}"));
            }
        }
        if let Some(max) = self.max_adjustment {
            if adjustment > max {
                return ValidationResult::error(id, format!("maximum adjustment: {max}"));
            }
        }
        if adjustment.abs() > self.warn_above {
            return ValidationResult::warning(
                id,
                format!("adjustment exceeds {} - review required", self.warn_above),
            );
        }
        ValidationResult::ok(id)
    }
}

#[async_trait]
impl ValidationService for ThresholdValidator {
    async fn validate(&self, batch: &[IntervalSnapshot]) -> Result<Vec<ValidationResult>, ServiceError> {
        Ok(batch.iter().map(|snapshot| self.check(snapshot)).collect())
    }
}

/// Records every saved batch in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    saved: Mutex<Vec<Vec<IntervalSnapshot>>>,
    fail_with: Mutex<Option<String>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail with a network error (`None` restores success).
    pub fn fail_saves(&self, reason: Option<String>) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = reason;
    }

    /// Every batch saved so far, oldest first.
    pub fn saved_batches(&self) -> Vec<Vec<IntervalSnapshot>> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Most recently saved snapshot for `id`, if any.
    pub fn latest(&self, id: &str) -> Option<IntervalSnapshot> {
        let saved = self.saved.lock().unwrap_or_else(|e| e.into_inner());
        saved
            .iter()
            .rev()
            .flat_map(|batch| batch.iter())
            .find(|snapshot| snapshot.id.as_str() == id)
            .cloned()
    }
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn save(&self, batch: &[IntervalSnapshot]) -> Result<(), ServiceError> {
        if let Some(reason) = self.fail_with.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(ServiceError::Network(reason));
        }
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch.to_vec());
        Ok(())
    }
}
