//! Selection Set: ids chosen for the next batch edit.

use std::collections::HashSet;

use fledger_core::IntervalId;

use crate::interval::Interval;
use crate::store::IntervalStore;

/// Ids currently selected. Always a subset of the store's ids: membership is
/// only granted for ids the store knows, and [`retain`](Self::retain) runs on
/// every reload.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: HashSet<IntervalId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`. Unknown ids are ignored.
    ///
    /// Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: &IntervalId, store: &IntervalStore) -> bool {
        if self.ids.remove(id) {
            return false;
        }
        if !store.contains(id) {
            return false;
        }
        self.ids.insert(id.clone());
        true
    }

    pub fn select_all(&mut self, store: &IntervalStore) {
        self.ids = store.ids().cloned().collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop every id the store no longer has.
    pub fn retain(&mut self, store: &IntervalStore) {
        self.ids.retain(|id| store.contains(id));
    }

    pub fn contains(&self, id: &IntervalId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in store order.
    pub fn ids_in_order(&self, store: &IntervalStore) -> Vec<IntervalId> {
        store.ids().filter(|id| self.ids.contains(*id)).cloned().collect()
    }

    /// Selected intervals in store order.
    pub fn intervals<'a>(&self, store: &'a IntervalStore) -> Vec<&'a Interval> {
        store.iter().filter(|i| self.ids.contains(i.id())).collect()
    }
}
