//! Undo/Redo Ledger: linear history over applied Change Sets.

use crate::change::ChangeSet;
use crate::store::IntervalStore;

/// Two stacks of Change Sets.
///
/// Recording a new Change Set clears the redo stack (linear history, no
/// branches). Undo applies the inverse and parks the *original* Change Set on
/// the redo stack; redo re-applies it forward.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: Vec<ChangeSet>,
    redo_stack: Vec<ChangeSet>,
    limit: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` Change Sets on the undo stack (oldest dropped first).
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Record a Change Set. Empty sets are ignored and leave redo intact.
    pub fn push(&mut self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        self.undo_stack.push(changes);
        self.redo_stack.clear();

        if let Some(limit) = self.limit {
            if self.undo_stack.len() > limit {
                let overflow = self.undo_stack.len() - limit;
                self.undo_stack.drain(..overflow);
            }
        }
    }

    /// Revert the most recent Change Set.
    ///
    /// Returns the entries actually applied to `store` (the inverse, minus ids
    /// that no longer exist), or `None` when there is nothing to undo.
    pub fn undo(&mut self, store: &mut IntervalStore) -> Option<ChangeSet> {
        let changes = self.undo_stack.pop()?;
        let applied = store.apply(&changes.inverse());
        self.redo_stack.push(changes);
        Some(applied)
    }

    /// Re-apply the most recently undone Change Set.
    pub fn redo(&mut self, store: &mut IntervalStore) -> Option<ChangeSet> {
        let changes = self.redo_stack.pop()?;
        let applied = store.apply(&changes);
        self.undo_stack.push(changes);
        Some(applied)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo stack, oldest first.
    pub fn undo_stack(&self) -> &[ChangeSet] {
        &self.undo_stack
    }

    /// Redo stack, oldest first (the next redo is the last element).
    pub fn redo_stack(&self) -> &[ChangeSet] {
        &self.redo_stack
    }
}
