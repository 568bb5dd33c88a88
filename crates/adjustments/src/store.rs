//! Interval Store: the canonical list of forecast intervals.

use std::collections::HashMap;

use fledger_core::error::ensure_finite;
use fledger_core::{IntervalId, LedgerError, LedgerResult};

use crate::change::{AdjustmentCommand, ChangeEntry, ChangeSet};
use crate::interval::{ForecastPoint, Interval, IntervalSnapshot};
use crate::summary::AdjustmentSummary;

/// Source of truth for current interval values.
///
/// The store is replaced wholesale on [`load`](Self::load) and otherwise only
/// mutated through [`apply`](Self::apply), which keeps
/// `total == predicted + adjustment` and the staffing derivation in lockstep
/// with every adjustment write.
#[derive(Debug, Clone)]
pub struct IntervalStore {
    intervals: Vec<Interval>,
    index: HashMap<IntervalId, usize>,
    staffing_factor: f64,
    /// Number of non-empty applies (reset on load).
    version: u64,
}

impl IntervalStore {
    pub fn new(staffing_factor: f64) -> Self {
        Self {
            intervals: Vec::new(),
            index: HashMap::new(),
            staffing_factor,
            version: 0,
        }
    }

    /// Replace the entire store.
    ///
    /// The new set is fully built before anything is swapped in, so a rejected
    /// load (duplicate id, non-finite number) leaves the current store intact.
    pub fn load(&mut self, points: impl IntoIterator<Item = ForecastPoint>) -> LedgerResult<()> {
        let mut intervals = Vec::new();
        let mut index = HashMap::new();

        for point in points {
            let interval = Interval::from_point(point, self.staffing_factor)?;
            if index.contains_key(interval.id()) {
                return Err(LedgerError::DuplicateInterval(interval.id().clone()));
            }
            index.insert(interval.id().clone(), intervals.len());
            intervals.push(interval);
        }

        tracing::debug!(intervals = intervals.len(), "interval store loaded");
        self.intervals = intervals;
        self.index = index;
        self.version = 0;
        Ok(())
    }

    pub fn staffing_factor(&self) -> f64 {
        self.staffing_factor
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, id: &IntervalId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &IntervalId) -> Option<&Interval> {
        self.index.get(id).map(|&i| &self.intervals[i])
    }

    /// Intervals in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &IntervalId> {
        self.intervals.iter().map(Interval::id)
    }

    /// Decide the Change Set for a batch command against current values.
    ///
    /// Pure: the store is not touched. Unknown ids are skipped and repeated ids
    /// collapse to their first occurrence.
    pub fn handle(&self, command: &AdjustmentCommand) -> LedgerResult<ChangeSet> {
        match command {
            AdjustmentCommand::Set(cmd) => {
                ensure_finite("value", cmd.value)?;
            }
            AdjustmentCommand::Increment(cmd) => {
                ensure_finite("delta", cmd.delta)?;
            }
        }

        let mut entries = Vec::with_capacity(command.ids().len());
        for id in command.ids() {
            let Some(interval) = self.get(id) else {
                continue;
            };
            let previous = interval.adjustment();
            let next = ensure_finite("adjustment", command.next_adjustment(previous))?;
            entries.push(ChangeEntry::new(id.clone(), previous, next));
        }

        Ok(ChangeSet::new(entries))
    }

    /// Write `next` for every entry whose id still exists.
    ///
    /// Entries for ids that are gone (e.g. after a reload) are skipped. Returns
    /// the entries actually applied, in Change Set order.
    pub fn apply(&mut self, changes: &ChangeSet) -> ChangeSet {
        let mut applied = Vec::with_capacity(changes.len());

        for entry in changes {
            let Some(&i) = self.index.get(&entry.id) else {
                tracing::trace!(id = %entry.id, "skipping change for unknown interval");
                continue;
            };
            self.intervals[i].set_adjustment(entry.next, self.staffing_factor);
            applied.push(entry.clone());
        }

        let applied = ChangeSet::new(applied);
        if !applied.is_empty() {
            self.version += 1;
        }
        applied
    }

    /// Current snapshots for `ids`, skipping unknown ids.
    pub fn snapshots<'a>(&self, ids: impl IntoIterator<Item = &'a IntervalId>) -> Vec<IntervalSnapshot> {
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .map(Interval::snapshot)
            .collect()
    }

    pub fn summary(&self) -> AdjustmentSummary {
        AdjustmentSummary::from_intervals(&self.intervals)
    }
}
