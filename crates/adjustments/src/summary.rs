use serde::Serialize;

use crate::interval::Interval;

/// Aggregate figures over the current adjustments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentSummary {
    /// Intervals with a non-zero adjustment.
    pub adjusted: usize,
    pub increased: usize,
    pub decreased: usize,
    /// Sum of all adjustments.
    pub net_adjustment: f64,
    /// `net_adjustment` averaged over every interval (0 for an empty store).
    pub average_adjustment: f64,
}

impl AdjustmentSummary {
    pub fn from_intervals(intervals: &[Interval]) -> Self {
        let mut summary = Self::default();
        for interval in intervals {
            let adjustment = interval.adjustment();
            if adjustment > 0.0 {
                summary.increased += 1;
            } else if adjustment < 0.0 {
                summary.decreased += 1;
            }
            summary.net_adjustment += adjustment;
        }
        summary.adjusted = summary.increased + summary.decreased;
        if !intervals.is_empty() {
            summary.average_adjustment = summary.net_adjustment / intervals.len() as f64;
        }
        summary
    }
}
