//! Edit session: one open adjustment view, from load to teardown.
//!
//! The session owns every piece of ledger state and enforces the single-writer
//! rule: edits go through the store, selection changes through the selection,
//! and only the orchestrator writes the Status Tracker. Every synchronous
//! operation completes before the next one starts; pipeline completions are
//! folded in only when the owner pumps them ([`EditSession::process_next`],
//! [`EditSession::drain_ready`], [`EditSession::settle`]).

use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;

use fledger_adjustments::{
    AdjustmentCommand, AdjustmentSummary, Badge, ChangeSet, ForecastPoint, History, Interval, IntervalStore,
    Selection, SetAdjustment, StatusTracker,
};
use fledger_core::{IntervalId, LedgerConfig, LedgerError, LedgerResult};

use crate::config::PipelineConfig;
use crate::http::HttpAdjustmentsClient;
use crate::local::{InMemoryPersistence, ThresholdValidator};
use crate::orchestrator::{Orchestrator, Resolution};
use crate::service::{PersistenceService, ValidationService};

/// Everything the rendering collaborator needs for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView {
    pub interval: Interval,
    pub selected: bool,
    pub badge: Badge,
    /// Display text for `badge`.
    pub label: &'static str,
    pub message: Option<String>,
}

/// Explicit session object for one edit view.
///
/// Dropping (or [`close`](Self::close)-ing) the session abandons every
/// in-flight pipeline; late results are never applied.
#[derive(Debug)]
pub struct EditSession {
    config: LedgerConfig,
    store: IntervalStore,
    selection: Selection,
    history: History,
    tracker: StatusTracker,
    orchestrator: Orchestrator,
}

impl EditSession {
    /// Create a session on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) to pass a handle explicitly.
    pub fn new(
        config: LedgerConfig,
        pipeline: PipelineConfig,
        validator: Arc<dyn ValidationService>,
        persistence: Arc<dyn PersistenceService>,
    ) -> Self {
        Self::with_runtime(Handle::current(), config, pipeline, validator, persistence)
    }

    pub fn with_runtime(
        runtime: Handle,
        config: LedgerConfig,
        pipeline: PipelineConfig,
        validator: Arc<dyn ValidationService>,
        persistence: Arc<dyn PersistenceService>,
    ) -> Self {
        Self {
            store: IntervalStore::new(config.staffing_factor),
            selection: Selection::new(),
            history: History::with_limit(config.history_limit),
            tracker: StatusTracker::new(),
            orchestrator: Orchestrator::new(validator, persistence, pipeline, runtime),
            config,
        }
    }

    /// Create a session wired from configuration: the HTTP API when a base URL
    /// is configured, in-process services otherwise.
    ///
    /// # Panics
    ///
    /// Same precondition as [`new`](Self::new).
    pub fn connect(config: LedgerConfig, pipeline: PipelineConfig) -> Self {
        match HttpAdjustmentsClient::from_config(&pipeline) {
            Some(client) => {
                tracing::info!(api = client.base_url(), "using remote adjustments API");
                let client = Arc::new(client);
                Self::new(config, pipeline, client.clone(), client)
            }
            None => {
                tracing::info!("no adjustments API configured; using local services");
                Self::new(
                    config,
                    pipeline,
                    Arc::new(ThresholdValidator::new()),
                    Arc::new(InMemoryPersistence::new()),
                )
            }
        }
    }

    // ---- Interval Store ----

    /// Replace the store and garbage-collect selection, statuses and fences
    /// for ids that are gone. A rejected load changes nothing.
    pub fn load(&mut self, points: impl IntoIterator<Item = ForecastPoint>) -> LedgerResult<()> {
        self.store.load(points)?;
        self.selection.retain(&self.store);
        self.tracker.retain(&self.store);
        self.orchestrator.forget_missing(&self.store);
        tracing::info!(intervals = self.store.len(), "forecast loaded");
        Ok(())
    }

    pub fn store(&self) -> &IntervalStore {
        &self.store
    }

    pub fn interval(&self, id: &IntervalId) -> LedgerResult<&Interval> {
        self.store.get(id).ok_or_else(|| LedgerError::not_found(id.clone()))
    }

    pub fn summary(&self) -> AdjustmentSummary {
        self.store.summary()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ---- Selection ----

    /// Flip membership of `id`; returns whether it is now selected.
    pub fn toggle_select(&mut self, id: &IntervalId) -> bool {
        self.selection.toggle(id, &self.store)
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.store);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Selected ids in store order.
    pub fn selected_ids(&self) -> Vec<IntervalId> {
        self.selection.ids_in_order(&self.store)
    }

    pub fn selected_intervals(&self) -> Vec<&Interval> {
        self.selection.intervals(&self.store)
    }

    // ---- Edits ----

    /// Set the adjustment of every selected interval to `value`.
    pub fn set_value(&mut self, value: f64) -> LedgerResult<ChangeSet> {
        let ids = self.selected_ids();
        self.execute(AdjustmentCommand::set(ids, value))
    }

    /// Add `delta` to the adjustment of every selected interval.
    pub fn increment(&mut self, delta: f64) -> LedgerResult<ChangeSet> {
        let ids = self.selected_ids();
        self.execute(AdjustmentCommand::increment(ids, delta))
    }

    /// Zero the adjustment of every selected interval.
    pub fn reset_selected(&mut self) -> LedgerResult<ChangeSet> {
        let ids = self.selected_ids();
        self.execute(AdjustmentCommand::Set(SetAdjustment::reset(ids)))
    }

    pub fn set_value_for(&mut self, ids: impl IntoIterator<Item = IntervalId>, value: f64) -> LedgerResult<ChangeSet> {
        self.execute(AdjustmentCommand::set(ids.into_iter().collect(), value))
    }

    pub fn increment_for(&mut self, ids: impl IntoIterator<Item = IntervalId>, delta: f64) -> LedgerResult<ChangeSet> {
        self.execute(AdjustmentCommand::increment(ids.into_iter().collect(), delta))
    }

    /// Decide, record, apply, then hand the applied set to the pipeline.
    ///
    /// Returns the applied Change Set (empty when no known id was targeted).
    fn execute(&mut self, command: AdjustmentCommand) -> LedgerResult<ChangeSet> {
        let changes = self.store.handle(&command)?;
        if changes.is_empty() {
            tracing::debug!("edit touched no known interval");
            return Ok(changes);
        }

        let applied = self.store.apply(&changes);
        self.history.push(applied.clone());
        tracing::debug!(ids = applied.len(), "change set applied");
        self.orchestrator.submit(&applied, &self.store, &mut self.tracker);
        Ok(applied)
    }

    // ---- Undo/Redo ----

    /// Revert the latest Change Set; `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.undo(&mut self.store) {
            Some(applied) => {
                self.orchestrator.submit(&applied, &self.store, &mut self.tracker);
                true
            }
            None => false,
        }
    }

    /// Re-apply the latest undone Change Set; `false` when the redo stack is empty.
    pub fn redo(&mut self) -> bool {
        match self.history.redo(&mut self.store) {
            Some(applied) => {
                self.orchestrator.submit(&applied, &self.store, &mut self.tracker);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    // ---- Status ----

    pub fn status(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Badge for one row: `Selected` overrides the pipeline status, which in
    /// turn hides the idle fallback.
    pub fn badge(&self, id: &IntervalId) -> LedgerResult<Badge> {
        let interval = self.interval(id)?;
        Ok(self.badge_for(interval))
    }

    fn badge_for(&self, interval: &Interval) -> Badge {
        if self.selection.contains(interval.id()) {
            Badge::Selected
        } else {
            self.tracker.badge(interval, &self.config)
        }
    }

    /// One view per interval, in store order.
    pub fn rows(&self) -> Vec<RowView> {
        self.store
            .iter()
            .map(|interval| {
                let badge = self.badge_for(interval);
                RowView {
                    interval: interval.clone(),
                    selected: self.selection.contains(interval.id()),
                    badge,
                    label: badge.label(),
                    message: self.tracker.message(interval.id()).map(str::to_string),
                }
            })
            .collect()
    }

    // ---- Pipeline pumping ----

    /// Batches with an outstanding validate or save call.
    pub fn in_flight(&self) -> usize {
        self.orchestrator.in_flight()
    }

    /// Wait for the next pipeline completion and fold it into the tracker.
    pub async fn process_next(&mut self) -> Option<Resolution> {
        self.orchestrator.next_resolution(&mut self.tracker).await
    }

    /// Fold every completion that has already finished, without waiting.
    pub fn drain_ready(&mut self) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        while let Some(resolution) = self.orchestrator.try_resolution(&mut self.tracker) {
            resolutions.push(resolution);
        }
        resolutions
    }

    /// Run every in-flight pipeline to completion.
    pub async fn settle(&mut self) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        while let Some(resolution) = self.process_next().await {
            resolutions.push(resolution);
        }
        resolutions
    }

    /// Tear the session down, abandoning in-flight pipelines.
    pub fn close(mut self) {
        self.orchestrator.abandon();
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.orchestrator.abandon();
    }
}
