use chrono::{DateTime, Datelike, FixedOffset, Weekday};
use serde::{Deserialize, Serialize};

use fledger_core::error::ensure_finite;
use fledger_core::{IntervalId, LedgerError, LedgerResult};

/// Confidence assumed for weekend intervals when the source sends none.
const WEEKEND_CONFIDENCE: f64 = 78.0;
/// Confidence assumed for weekday intervals when the source sends none.
const WEEKDAY_CONFIDENCE: f64 = 92.0;

/// One record as supplied by the forecast source.
///
/// `total` and `required_agents` are accepted for wire compatibility but are
/// recomputed on load; the ledger never trusts derived fields from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub id: IntervalId,
    pub timestamp: DateTime<FixedOffset>,
    pub predicted: f64,
    #[serde(default)]
    pub adjustment: f64,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub required_agents: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Derive headcount from total volume: `max(0, round(total * factor))`.
pub fn required_agents(total: f64, staffing_factor: f64) -> u32 {
    let agents = (total * staffing_factor).round();
    if agents <= 0.0 { 0 } else { agents as u32 }
}

/// A forecast time bucket with its human adjustment.
///
/// Fields are private: `total` and `required_agents` are derived and are only
/// rewritten together with `adjustment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    id: IntervalId,
    timestamp: DateTime<FixedOffset>,
    predicted: f64,
    adjustment: f64,
    total: f64,
    required_agents: u32,
    confidence: f64,
    is_weekend: bool,
}

impl Interval {
    /// Build an interval from a source record, normalising derived fields.
    pub fn from_point(point: ForecastPoint, staffing_factor: f64) -> LedgerResult<Self> {
        if point.id.as_str().trim().is_empty() {
            return Err(LedgerError::invalid_id("interval id must not be empty"));
        }
        let predicted = ensure_finite("predicted", point.predicted)?;
        let adjustment = ensure_finite("adjustment", point.adjustment)?;
        let is_weekend = matches!(point.timestamp.weekday(), Weekday::Sat | Weekday::Sun);
        let confidence = match point.confidence {
            Some(c) => ensure_finite("confidence", c)?,
            None if is_weekend => WEEKEND_CONFIDENCE,
            None => WEEKDAY_CONFIDENCE,
        };

        let mut interval = Self {
            id: point.id,
            timestamp: point.timestamp,
            predicted,
            adjustment: 0.0,
            total: predicted,
            required_agents: 0,
            confidence,
            is_weekend,
        };
        interval.set_adjustment(adjustment, staffing_factor);
        Ok(interval)
    }

    pub fn id(&self) -> &IntervalId {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn predicted(&self) -> f64 {
        self.predicted
    }

    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn required_agents(&self) -> u32 {
        self.required_agents
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_weekend(&self) -> bool {
        self.is_weekend
    }

    /// `|adjustment| / max(predicted, 1)`.
    pub fn adjustment_ratio(&self) -> f64 {
        self.adjustment.abs() / self.predicted.max(1.0)
    }

    /// Post-mutation payload sent to validation/persistence.
    pub fn snapshot(&self) -> IntervalSnapshot {
        IntervalSnapshot {
            id: self.id.clone(),
            timestamp: self.timestamp,
            predicted: self.predicted,
            adjustment: self.adjustment,
            total: self.total,
            required_agents: self.required_agents,
        }
    }

    pub(crate) fn set_adjustment(&mut self, adjustment: f64, staffing_factor: f64) {
        self.adjustment = adjustment;
        self.total = self.predicted + adjustment;
        self.required_agents = required_agents(self.total, staffing_factor);
    }
}

/// Immutable copy of an interval's editable state, as shipped downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSnapshot {
    pub id: IntervalId,
    pub timestamp: DateTime<FixedOffset>,
    pub predicted: f64,
    pub adjustment: f64,
    pub total: f64,
    pub required_agents: u32,
}
