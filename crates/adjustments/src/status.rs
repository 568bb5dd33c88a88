//! Status Tracker: per-interval pipeline status, plus the idle-state fallback badge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use fledger_core::{IntervalId, LedgerConfig};

use crate::interval::Interval;
use crate::store::IntervalStore;

/// Where an interval stands in the validate-then-save pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// No validate/save has run since load.
    #[default]
    Idle,
    Pending,
    Warning,
    Error,
    Ok,
    Saving,
    Saved,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Pending => "pending",
            PipelineStatus::Warning => "warning",
            PipelineStatus::Error => "error",
            PipelineStatus::Ok => "ok",
            PipelineStatus::Saving => "saving",
            PipelineStatus::Saved => "saved",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineStatus::Idle)
    }

    /// A request is outstanding for this id.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, PipelineStatus::Pending | PipelineStatus::Saving)
    }
}

/// One tracker entry: status and its optional tooltip message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-id status, kept as one record per id so status and message can never
/// drift apart.
///
/// Written by the pipeline orchestrator; everyone else reads. An id without a
/// record is `idle`.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    records: HashMap<IntervalId, StatusRecord>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &IntervalId) -> StatusRecord {
        self.records.get(id).cloned().unwrap_or_default()
    }

    pub fn status(&self, id: &IntervalId) -> PipelineStatus {
        self.records.get(id).map(|r| r.status).unwrap_or_default()
    }

    pub fn message(&self, id: &IntervalId) -> Option<&str> {
        self.records.get(id).and_then(|r| r.message.as_deref())
    }

    /// Replace status and message.
    pub fn set(&mut self, id: &IntervalId, status: PipelineStatus, message: Option<String>) {
        if status.is_idle() {
            self.records.remove(id);
            return;
        }
        self.records.insert(id.clone(), StatusRecord { status, message });
    }

    /// Replace status, keep whatever message is already there.
    pub fn set_status(&mut self, id: &IntervalId, status: PipelineStatus) {
        let message = self.records.get(id).and_then(|r| r.message.clone());
        self.set(id, status, message);
    }

    /// Drop records for ids the store no longer has.
    pub fn retain(&mut self, store: &IntervalStore) {
        self.records.retain(|id, _| store.contains(id));
    }

    /// Ids with a non-idle status.
    pub fn tracked(&self) -> impl Iterator<Item = (&IntervalId, &StatusRecord)> {
        self.records.iter()
    }

    /// Presentational badge: the pipeline status when there is one, otherwise
    /// the data-derived fallback.
    pub fn badge(&self, interval: &Interval, config: &LedgerConfig) -> Badge {
        Badge::from_status(self.status(interval.id())).unwrap_or_else(|| fallback_badge(interval, config))
    }
}

/// What the rendering collaborator shows for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Selected,
    Pending,
    Saving,
    Saved,
    Warning,
    Error,
    Ok,
    /// Fallback: `|adjustment| / predicted >= review_ratio`.
    NeedsReview,
    /// Fallback: `check_ratio <= ratio < review_ratio`.
    Check,
    /// Fallback: informational weekend marker.
    Weekend,
    /// Fallback: nothing to flag.
    Clear,
}

impl Badge {
    /// Pipeline badge for a non-idle status; `None` when idle.
    pub fn from_status(status: PipelineStatus) -> Option<Self> {
        match status {
            PipelineStatus::Idle => None,
            PipelineStatus::Pending => Some(Badge::Pending),
            PipelineStatus::Warning => Some(Badge::Warning),
            PipelineStatus::Error => Some(Badge::Error),
            PipelineStatus::Ok => Some(Badge::Ok),
            PipelineStatus::Saving => Some(Badge::Saving),
            PipelineStatus::Saved => Some(Badge::Saved),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Badge::Selected => "Selected",
            Badge::Pending => "Validating…",
            Badge::Saving => "Saving…",
            Badge::Saved => "Saved",
            Badge::Warning => "Check",
            Badge::Error => "Error",
            Badge::Ok => "OK",
            Badge::NeedsReview => "Needs review",
            Badge::Check => "Check",
            Badge::Weekend => "Weekend",
            Badge::Clear => "OK",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Badge::NeedsReview | Badge::Check | Badge::Weekend | Badge::Clear)
    }
}

/// Badge computed purely from interval data; only meaningful while idle.
pub fn fallback_badge(interval: &Interval, config: &LedgerConfig) -> Badge {
    let ratio = interval.adjustment_ratio();
    if ratio >= config.review_ratio {
        Badge::NeedsReview
    } else if ratio >= config.check_ratio {
        Badge::Check
    } else if interval.is_weekend() {
        Badge::Weekend
    } else {
        Badge::Clear
    }
}
