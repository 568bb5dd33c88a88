//! Reversible batch edits and the commands that produce them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use fledger_core::IntervalId;

/// The atomic, reversible unit of an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub id: IntervalId,
    pub previous: f64,
    pub next: f64,
}

impl ChangeEntry {
    pub fn new(id: IntervalId, previous: f64, next: f64) -> Self {
        Self { id, previous, next }
    }

    /// Same id, `previous` and `next` swapped.
    pub fn inverse(&self) -> Self {
        Self {
            id: self.id.clone(),
            previous: self.next,
            next: self.previous,
        }
    }
}

/// Ordered entries produced by one user action.
///
/// Immutable once built; each id appears at most once (first occurrence wins),
/// so applying a Change Set recomputes every id exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn new(entries: impl IntoIterator<Item = ChangeEntry>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &IntervalId> {
        self.entries.iter().map(|e| &e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry reversed, order preserved.
    pub fn inverse(&self) -> Self {
        Self {
            entries: self.entries.iter().map(ChangeEntry::inverse).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Command: set the adjustment of every listed interval to `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAdjustment {
    pub ids: Vec<IntervalId>,
    pub value: f64,
}

impl SetAdjustment {
    /// Clear the adjustment (set it to zero).
    pub fn reset(ids: Vec<IntervalId>) -> Self {
        Self { ids, value: 0.0 }
    }
}

/// Command: add `delta` to the adjustment of every listed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementAdjustment {
    pub ids: Vec<IntervalId>,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdjustmentCommand {
    Set(SetAdjustment),
    Increment(IncrementAdjustment),
}

impl AdjustmentCommand {
    pub fn set(ids: Vec<IntervalId>, value: f64) -> Self {
        Self::Set(SetAdjustment { ids, value })
    }

    pub fn increment(ids: Vec<IntervalId>, delta: f64) -> Self {
        Self::Increment(IncrementAdjustment { ids, delta })
    }

    pub fn ids(&self) -> &[IntervalId] {
        match self {
            AdjustmentCommand::Set(cmd) => &cmd.ids,
            AdjustmentCommand::Increment(cmd) => &cmd.ids,
        }
    }

    /// Next adjustment for an interval currently at `current`.
    pub fn next_adjustment(&self, current: f64) -> f64 {
        match self {
            AdjustmentCommand::Set(cmd) => cmd.value,
            AdjustmentCommand::Increment(cmd) => current + cmd.delta,
        }
    }
}
