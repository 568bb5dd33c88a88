//! Pipeline Orchestrator: validate → save for each applied Change Set.
//!
//! Every submitted id gets a ticket from one monotonic counter; the id's
//! current ticket is its generation fence. A completion is written to the
//! Status Tracker only for ids whose ticket still matches the one captured at
//! submit time, so a newer edit (or a reload that removed the id) silently
//! wins over an older in-flight result regardless of network arrival order.
//!
//! Collaborator calls run as Tokio tasks; completions are folded back into the
//! tracker by whoever owns the orchestrator, via [`Orchestrator::next_resolution`]
//! or [`Orchestrator::try_resolution`]. The orchestrator is the only writer of
//! pipeline statuses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::{Id as TaskId, JoinError, JoinSet};

use fledger_adjustments::{ChangeSet, IntervalSnapshot, IntervalStore, PipelineStatus, StatusTracker};
use fledger_core::{BatchId, IntervalId};

use crate::config::PipelineConfig;
use crate::error::{MISSING_RESULT_MESSAGE, PipelineFailure, ServiceError};
use crate::service::{PersistenceService, ValidationResult, ValidationService};

/// Pipeline stage a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validation,
    Save,
}

/// Outcome of folding one completion into the Status Tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub batch: BatchId,
    pub stage: Stage,
    /// Ids whose tracker record was written.
    pub updated: Vec<IntervalId>,
    /// Ids whose result was discarded because a newer run (or a reload)
    /// superseded them.
    pub stale: Vec<IntervalId>,
    pub failure: Option<PipelineFailure>,
    /// The batch passed validation and its save call was started.
    pub save_started: bool,
}

impl Resolution {
    fn new(batch: BatchId, stage: Stage) -> Self {
        Self {
            batch,
            stage,
            updated: Vec::new(),
            stale: Vec::new(),
            failure: None,
            save_started: false,
        }
    }

    /// Every current id in the batch reached `saved`.
    pub fn is_saved(&self) -> bool {
        self.stage == Stage::Save && self.failure.is_none() && !self.updated.is_empty()
    }
}

#[derive(Debug)]
enum PipelineEvent {
    Validated {
        batch: BatchId,
        result: Result<Vec<ValidationResult>, ServiceError>,
    },
    Saved {
        batch: BatchId,
        result: Result<(), ServiceError>,
    },
}

#[derive(Debug)]
struct Member {
    snapshot: IntervalSnapshot,
    ticket: u64,
}

#[derive(Debug)]
struct Batch {
    stage: Stage,
    members: Vec<Member>,
}

/// Drives Change Sets through validation and persistence.
pub struct Orchestrator {
    validator: Arc<dyn ValidationService>,
    persistence: Arc<dyn PersistenceService>,
    config: PipelineConfig,
    runtime: Handle,
    /// Current ticket per id with an unresolved run.
    tickets: HashMap<IntervalId, u64>,
    next_ticket: u64,
    batches: HashMap<BatchId, Batch>,
    tasks: JoinSet<PipelineEvent>,
    task_batches: HashMap<TaskId, BatchId>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("in_flight_ids", &self.tickets.len())
            .field("in_flight_batches", &self.batches.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        validator: Arc<dyn ValidationService>,
        persistence: Arc<dyn PersistenceService>,
        config: PipelineConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            validator,
            persistence,
            config,
            runtime,
            tickets: HashMap::new(),
            next_ticket: 0,
            batches: HashMap::new(),
            tasks: JoinSet::new(),
            task_batches: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of batches with an outstanding validate or save call.
    pub fn in_flight(&self) -> usize {
        self.batches.len()
    }

    /// Whether `id` has an unresolved run.
    pub fn is_in_flight(&self, id: &IntervalId) -> bool {
        self.tickets.contains_key(id)
    }

    /// Start a pipeline for the ids of an applied Change Set.
    ///
    /// Every id moves to `pending` before this returns. Ids the store no
    /// longer has are skipped; returns `None` when nothing is left.
    pub fn submit(
        &mut self,
        applied: &ChangeSet,
        store: &IntervalStore,
        tracker: &mut StatusTracker,
    ) -> Option<BatchId> {
        let snapshots = store.snapshots(applied.ids());
        if snapshots.is_empty() {
            return None;
        }

        let batch = BatchId::new();
        let mut members = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            self.next_ticket += 1;
            self.tickets.insert(snapshot.id.clone(), self.next_ticket);
            tracker.set(&snapshot.id, PipelineStatus::Pending, None);
            members.push(Member {
                snapshot: snapshot.clone(),
                ticket: self.next_ticket,
            });
        }

        tracing::info!(batch = %batch, ids = members.len(), "submitting batch for validation");
        self.batches.insert(
            batch,
            Batch {
                stage: Stage::Validation,
                members,
            },
        );
        self.spawn_validation(batch, snapshots);
        Some(batch)
    }

    /// Wait for the next completion and fold it into `tracker`.
    ///
    /// Returns `None` once nothing is in flight.
    pub async fn next_resolution(&mut self, tracker: &mut StatusTracker) -> Option<Resolution> {
        loop {
            let joined = self.tasks.join_next_with_id().await?;
            if let Some(resolution) = self.on_joined(joined, tracker) {
                return Some(resolution);
            }
        }
    }

    /// Fold one already-finished completion, if any, without waiting.
    pub fn try_resolution(&mut self, tracker: &mut StatusTracker) -> Option<Resolution> {
        loop {
            let joined = self.tasks.try_join_next_with_id()?;
            if let Some(resolution) = self.on_joined(joined, tracker) {
                return Some(resolution);
            }
        }
    }

    /// Drop fences for ids the store no longer has; their results become stale.
    pub fn forget_missing(&mut self, store: &IntervalStore) {
        let before = self.tickets.len();
        self.tickets.retain(|id, _| store.contains(id));
        let dropped = before - self.tickets.len();
        if dropped > 0 {
            tracing::debug!(ids = dropped, "fenced off in-flight results for removed intervals");
        }
    }

    /// Abandon every in-flight pipeline. No late result is ever applied.
    pub fn abandon(&mut self) {
        if !self.batches.is_empty() {
            tracing::info!(batches = self.batches.len(), "abandoning in-flight pipelines");
        }
        self.tasks.abort_all();
        self.tasks = JoinSet::new();
        self.task_batches.clear();
        self.batches.clear();
        self.tickets.clear();
    }

    fn spawn_validation(&mut self, batch: BatchId, snapshots: Vec<IntervalSnapshot>) {
        let validator = Arc::clone(&self.validator);
        let timeout = self.config.validate_timeout;
        let task = self.tasks.spawn_on(
            async move {
                let result = match tokio::time::timeout(timeout, validator.validate(&snapshots)).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout(timeout)),
                };
                PipelineEvent::Validated { batch, result }
            },
            &self.runtime,
        );
        self.task_batches.insert(task.id(), batch);
    }

    fn spawn_save(&mut self, batch: BatchId, snapshots: Vec<IntervalSnapshot>) {
        let persistence = Arc::clone(&self.persistence);
        let timeout = self.config.save_timeout;
        let task = self.tasks.spawn_on(
            async move {
                let result = match tokio::time::timeout(timeout, persistence.save(&snapshots)).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout(timeout)),
                };
                PipelineEvent::Saved { batch, result }
            },
            &self.runtime,
        );
        self.task_batches.insert(task.id(), batch);
    }

    fn on_joined(
        &mut self,
        joined: Result<(TaskId, PipelineEvent), JoinError>,
        tracker: &mut StatusTracker,
    ) -> Option<Resolution> {
        let event = match joined {
            Ok((task, event)) => {
                self.task_batches.remove(&task);
                event
            }
            Err(err) => {
                let batch = self.task_batches.remove(&err.id())?;
                if err.is_cancelled() {
                    return None;
                }
                tracing::error!(batch = %batch, error = %err, "pipeline task failed");
                let failure = ServiceError::Network(format!("pipeline task failed: {err}"));
                match self.batches.get(&batch)?.stage {
                    Stage::Validation => PipelineEvent::Validated {
                        batch,
                        result: Err(failure),
                    },
                    Stage::Save => PipelineEvent::Saved {
                        batch,
                        result: Err(failure),
                    },
                }
            }
        };
        self.handle_event(event, tracker)
    }

    fn handle_event(&mut self, event: PipelineEvent, tracker: &mut StatusTracker) -> Option<Resolution> {
        match event {
            PipelineEvent::Validated { batch, result } => {
                let state = self.batches.remove(&batch)?;
                Some(self.on_validated(batch, state, result, tracker))
            }
            PipelineEvent::Saved { batch, result } => {
                let state = self.batches.remove(&batch)?;
                Some(self.on_saved(batch, state, result, tracker))
            }
        }
    }

    fn is_current(&self, member: &Member) -> bool {
        self.tickets.get(&member.snapshot.id) == Some(&member.ticket)
    }

    /// Release the fence of a member that reached a terminal status.
    fn release(&mut self, member: &Member) {
        if self.is_current(member) {
            self.tickets.remove(&member.snapshot.id);
        }
    }

    fn on_validated(
        &mut self,
        batch: BatchId,
        state: Batch,
        result: Result<Vec<ValidationResult>, ServiceError>,
        tracker: &mut StatusTracker,
    ) -> Resolution {
        let mut resolution = Resolution::new(batch, Stage::Validation);

        let results = match result {
            Ok(results) => results,
            Err(err) => {
                let failure = PipelineFailure::validation_transport(&err);
                tracing::warn!(batch = %batch, error = %err, "validation call failed");
                let message = failure.status_message().map(str::to_string);
                for member in &state.members {
                    if self.is_current(member) {
                        tracker.set(&member.snapshot.id, PipelineStatus::Error, message.clone());
                        resolution.updated.push(member.snapshot.id.clone());
                        self.release(member);
                    } else {
                        resolution.stale.push(member.snapshot.id.clone());
                    }
                }
                resolution.failure = Some(failure);
                return resolution;
            }
        };

        // Results for ids outside the batch are ignored; the first answer per id wins.
        let batch_ids: HashSet<&IntervalId> = state.members.iter().map(|m| &m.snapshot.id).collect();
        let mut by_id: HashMap<IntervalId, ValidationResult> = HashMap::with_capacity(results.len());
        for result in results {
            if batch_ids.contains(&result.id) && !by_id.contains_key(&result.id) {
                by_id.insert(result.id.clone(), result);
            }
        }

        let verdicts: Vec<ValidationResult> = state
            .members
            .iter()
            .map(|member| {
                by_id
                    .remove(&member.snapshot.id)
                    .unwrap_or_else(|| ValidationResult::error(member.snapshot.id.clone(), MISSING_RESULT_MESSAGE))
            })
            .collect();

        // Any error blocks the save, stale verdicts included.
        let rejected: Vec<IntervalId> = verdicts
            .iter()
            .filter(|v| v.status.is_error())
            .map(|v| v.id.clone())
            .collect();

        let mut current = Vec::with_capacity(state.members.len());
        for (member, verdict) in state.members.into_iter().zip(verdicts) {
            if !self.is_current(&member) {
                tracing::debug!(batch = %batch, id = %member.snapshot.id, "discarding stale validation result");
                resolution.stale.push(member.snapshot.id);
                continue;
            }
            tracker.set(&member.snapshot.id, verdict.status.status(), verdict.message);
            resolution.updated.push(member.snapshot.id.clone());
            current.push(member);
        }

        if !rejected.is_empty() {
            tracing::warn!(batch = %batch, rejected = rejected.len(), "validation rejected batch; save blocked");
            for member in &current {
                self.release(member);
            }
            resolution.failure = Some(PipelineFailure::ValidationRejected { ids: rejected });
            return resolution;
        }

        if current.is_empty() {
            tracing::debug!(batch = %batch, "every id superseded before save; skipping");
            resolution.failure = Some(PipelineFailure::StaleMutation {
                ids: resolution.stale.clone(),
            });
            return resolution;
        }

        let snapshots: Vec<IntervalSnapshot> = current.iter().map(|m| m.snapshot.clone()).collect();
        for member in &current {
            tracker.set_status(&member.snapshot.id, PipelineStatus::Saving);
        }
        tracing::info!(batch = %batch, ids = current.len(), "validation passed; saving batch");
        self.batches.insert(
            batch,
            Batch {
                stage: Stage::Save,
                members: current,
            },
        );
        self.spawn_save(batch, snapshots);
        resolution.save_started = true;
        resolution
    }

    fn on_saved(
        &mut self,
        batch: BatchId,
        state: Batch,
        result: Result<(), ServiceError>,
        tracker: &mut StatusTracker,
    ) -> Resolution {
        let mut resolution = Resolution::new(batch, Stage::Save);
        let failure = result.err().map(|err| {
            tracing::warn!(batch = %batch, error = %err, timeout = err.is_timeout(), "save call failed");
            PipelineFailure::save_transport(&err)
        });
        let message = failure.as_ref().and_then(|f| f.status_message()).map(str::to_string);

        for member in &state.members {
            if !self.is_current(member) {
                tracing::debug!(batch = %batch, id = %member.snapshot.id, "discarding stale save result");
                resolution.stale.push(member.snapshot.id.clone());
                continue;
            }
            match &failure {
                Some(_) => tracker.set(&member.snapshot.id, PipelineStatus::Error, message.clone()),
                None => tracker.set_status(&member.snapshot.id, PipelineStatus::Saved),
            }
            resolution.updated.push(member.snapshot.id.clone());
            self.release(member);
        }

        if failure.is_none() && resolution.updated.is_empty() {
            resolution.failure = Some(PipelineFailure::StaleMutation {
                ids: resolution.stale.clone(),
            });
        } else {
            if failure.is_none() {
                tracing::info!(batch = %batch, ids = resolution.updated.len(), "batch saved");
            }
            resolution.failure = failure;
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use fledger_adjustments::{AdjustmentCommand, ForecastPoint};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    use crate::error::{SAVE_FAILED_MESSAGE, VALIDATION_FAILED_MESSAGE};
    use crate::local::InMemoryPersistence;

    type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

    /// Validation service whose calls are answered by the test.
    struct ScriptedValidator {
        calls: mpsc::UnboundedSender<(Vec<IntervalSnapshot>, Reply<Vec<ValidationResult>>)>,
    }

    #[async_trait]
    impl ValidationService for ScriptedValidator {
        async fn validate(&self, batch: &[IntervalSnapshot]) -> Result<Vec<ValidationResult>, ServiceError> {
            let (tx, rx) = oneshot::channel();
            let _ = self.calls.send((batch.to_vec(), tx));
            rx.await.unwrap_or_else(|_| Err(ServiceError::Network("reply dropped".into())))
        }
    }

    struct ScriptedPersistence {
        calls: mpsc::UnboundedSender<(Vec<IntervalSnapshot>, Reply<()>)>,
    }

    #[async_trait]
    impl PersistenceService for ScriptedPersistence {
        async fn save(&self, batch: &[IntervalSnapshot]) -> Result<(), ServiceError> {
            let (tx, rx) = oneshot::channel();
            let _ = self.calls.send((batch.to_vec(), tx));
            rx.await.unwrap_or_else(|_| Err(ServiceError::Network("reply dropped".into())))
        }
    }

    struct Harness {
        store: IntervalStore,
        tracker: StatusTracker,
        orchestrator: Orchestrator,
        validations: mpsc::UnboundedReceiver<(Vec<IntervalSnapshot>, Reply<Vec<ValidationResult>>)>,
        saves: mpsc::UnboundedReceiver<(Vec<IntervalSnapshot>, Reply<()>)>,
    }

    fn point(id: &str) -> ForecastPoint {
        ForecastPoint {
            id: IntervalId::from(id),
            timestamp: DateTime::parse_from_rfc3339("2024-03-04T09:00:00+00:00").unwrap(),
            predicted: 100.0,
            adjustment: 0.0,
            total: None,
            required_agents: None,
            confidence: None,
        }
    }

    fn harness(ids: &[&str], config: PipelineConfig) -> Harness {
        let (validate_tx, validations) = mpsc::unbounded_channel();
        let (save_tx, saves) = mpsc::unbounded_channel();
        let mut store = IntervalStore::new(0.18);
        store.load(ids.iter().map(|id| point(id))).unwrap();
        Harness {
            store,
            tracker: StatusTracker::new(),
            orchestrator: Orchestrator::new(
                Arc::new(ScriptedValidator { calls: validate_tx }),
                Arc::new(ScriptedPersistence { calls: save_tx }),
                config,
                Handle::current(),
            ),
            validations,
            saves,
        }
    }

    impl Harness {
        fn edit(&mut self, ids: &[&str], value: f64) -> BatchId {
            let ids = ids.iter().map(|id| IntervalId::from(*id)).collect();
            let changes = self.store.handle(&AdjustmentCommand::set(ids, value)).unwrap();
            let applied = self.store.apply(&changes);
            self.orchestrator
                .submit(&applied, &self.store, &mut self.tracker)
                .unwrap()
        }

        async fn next(&mut self) -> Resolution {
            self.orchestrator.next_resolution(&mut self.tracker).await.unwrap()
        }

        fn status(&self, id: &str) -> PipelineStatus {
            self.tracker.status(&IntervalId::from(id))
        }
    }

    fn all_ok(batch: &[IntervalSnapshot]) -> Vec<ValidationResult> {
        batch.iter().map(|s| ValidationResult::ok(s.id.clone())).collect()
    }

    #[tokio::test]
    async fn submit_marks_pending_synchronously() {
        let mut h = harness(&["x1", "x2", "x3"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 5.0);

        assert_eq!(h.status("x1"), PipelineStatus::Pending);
        assert_eq!(h.status("x2"), PipelineStatus::Pending);
        assert_eq!(h.status("x3"), PipelineStatus::Idle);
        assert_eq!(h.orchestrator.in_flight(), 1);
    }

    #[tokio::test]
    async fn happy_path_validates_then_saves() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        let batch = h.edit(&["x1", "x2"], 5.0);

        let (snapshots, reply) = h.validations.recv().await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.adjustment == 5.0 && s.total == 105.0));
        let mut results = all_ok(&snapshots);
        results[1] = ValidationResult::warning(snapshots[1].id.clone(), "large");
        reply.send(Ok(results)).unwrap();

        let resolution = h.next().await;
        assert_eq!(resolution.batch, batch);
        assert!(resolution.save_started);
        assert_eq!(h.status("x1"), PipelineStatus::Saving);
        assert_eq!(h.status("x2"), PipelineStatus::Saving);

        let (saved, reply) = h.saves.recv().await.unwrap();
        assert_eq!(saved.len(), 2);
        reply.send(Ok(())).unwrap();

        let resolution = h.next().await;
        assert!(resolution.is_saved());
        assert_eq!(h.status("x1"), PipelineStatus::Saved);
        assert_eq!(h.status("x2"), PipelineStatus::Saved);
        // saving/saved keep the validation message
        assert_eq!(h.tracker.message(&IntervalId::from("x2")), Some("large"));
        assert!(!h.orchestrator.is_in_flight(&IntervalId::from("x1")));
        assert!(h.orchestrator.next_resolution(&mut h.tracker).await.is_none());
    }

    #[tokio::test]
    async fn one_error_blocks_the_whole_batch() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 30.0);

        let (_, reply) = h.validations.recv().await.unwrap();
        reply
            .send(Ok(vec![
                ValidationResult::ok(IntervalId::from("x1")),
                ValidationResult::error(IntervalId::from("x2"), "exceeds threshold"),
            ]))
            .unwrap();

        let resolution = h.next().await;
        assert!(!resolution.save_started);
        assert_eq!(
            resolution.failure,
            Some(PipelineFailure::ValidationRejected {
                ids: vec![IntervalId::from("x2")]
            })
        );
        assert_eq!(h.status("x1"), PipelineStatus::Ok);
        assert_eq!(h.status("x2"), PipelineStatus::Error);
        assert_eq!(h.tracker.message(&IntervalId::from("x2")), Some("exceeds threshold"));
        assert!(h.saves.try_recv().is_err());
        assert_eq!(h.orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn missing_and_foreign_results() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 1.0);

        let (_, reply) = h.validations.recv().await.unwrap();
        reply
            .send(Ok(vec![
                ValidationResult::ok(IntervalId::from("x1")),
                ValidationResult::error(IntervalId::from("zz"), "not in batch"),
            ]))
            .unwrap();

        let resolution = h.next().await;
        assert_eq!(
            resolution.failure,
            Some(PipelineFailure::ValidationRejected {
                ids: vec![IntervalId::from("x2")]
            })
        );
        assert_eq!(h.tracker.message(&IntervalId::from("x2")), Some(MISSING_RESULT_MESSAGE));
        assert_eq!(h.tracker.status(&IntervalId::from("zz")), PipelineStatus::Idle);
    }

    #[tokio::test]
    async fn stale_result_arriving_late_is_discarded() {
        let mut h = harness(&["x1"], PipelineConfig::default());
        h.edit(&["x1"], 10.0);
        h.edit(&["x1"], 20.0);

        let first = h.validations.recv().await.unwrap();
        let second = h.validations.recv().await.unwrap();
        let (older, newer) = if first.0[0].adjustment == 10.0 {
            (first, second)
        } else {
            (second, first)
        };

        // Newer run answers first and is authoritative.
        newer
            .1
            .send(Ok(vec![ValidationResult::warning(IntervalId::from("x1"), "newest")]))
            .unwrap();
        let resolution = h.next().await;
        assert!(resolution.save_started);
        assert_eq!(h.status("x1"), PipelineStatus::Saving);

        // Older run answers afterwards with an error; it must not touch x1.
        older
            .1
            .send(Ok(vec![ValidationResult::error(IntervalId::from("x1"), "stale")]))
            .unwrap();
        let resolution = h.next().await;
        assert_eq!(resolution.stale, vec![IntervalId::from("x1")]);
        assert!(resolution.updated.is_empty());
        assert_eq!(h.status("x1"), PipelineStatus::Saving);
        assert_eq!(h.tracker.message(&IntervalId::from("x1")), Some("newest"));

        let (saved, reply) = h.saves.recv().await.unwrap();
        assert_eq!(saved[0].adjustment, 20.0);
        reply.send(Ok(())).unwrap();
        h.next().await;
        assert_eq!(h.status("x1"), PipelineStatus::Saved);
    }

    #[tokio::test]
    async fn save_excludes_ids_superseded_during_validation() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 3.0);
        let (snapshots, reply) = h.validations.recv().await.unwrap();

        // x2 is edited again while the first batch is validating.
        h.edit(&["x2"], 4.0);
        reply.send(Ok(all_ok(&snapshots))).unwrap();

        let resolution = h.next().await;
        assert_eq!(resolution.stale, vec![IntervalId::from("x2")]);
        assert_eq!(h.status("x2"), PipelineStatus::Pending);

        let (saved, _reply) = h.saves.recv().await.unwrap();
        let saved_ids: Vec<_> = saved.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(saved_ids, vec!["x1"]);
    }

    #[tokio::test]
    async fn validation_transport_failure_marks_batch_error() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 3.0);

        let (_, reply) = h.validations.recv().await.unwrap();
        reply.send(Err(ServiceError::Network("connection refused".into()))).unwrap();

        let resolution = h.next().await;
        assert!(matches!(resolution.failure, Some(PipelineFailure::ValidationTransportFailure { .. })));
        for id in ["x1", "x2"] {
            assert_eq!(h.status(id), PipelineStatus::Error);
            assert_eq!(h.tracker.message(&IntervalId::from(id)), Some(VALIDATION_FAILED_MESSAGE));
        }
    }

    #[tokio::test]
    async fn save_failure_marks_every_id_error() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 3.0);

        let (snapshots, reply) = h.validations.recv().await.unwrap();
        reply.send(Ok(all_ok(&snapshots))).unwrap();
        h.next().await;

        let (_, reply) = h.saves.recv().await.unwrap();
        reply.send(Err(ServiceError::Api(503, "unavailable".into()))).unwrap();

        let resolution = h.next().await;
        assert!(matches!(resolution.failure, Some(PipelineFailure::SaveTransportFailure { .. })));
        for id in ["x1", "x2"] {
            assert_eq!(h.status(id), PipelineStatus::Error);
            assert_eq!(h.tracker.message(&IntervalId::from(id)), Some(SAVE_FAILED_MESSAGE));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validation_timeout_is_a_transport_failure() {
        let config = PipelineConfig::default().with_validate_timeout(Duration::from_millis(500));
        let mut h = harness(&["x1"], config);
        h.edit(&["x1"], 3.0);

        // Hold the reply open so the call never completes.
        let _held = h.validations.recv().await.unwrap();

        let resolution = h.next().await;
        assert_eq!(
            resolution.failure,
            Some(PipelineFailure::ValidationTransportFailure {
                message: "validation timed out after 500 ms".to_string()
            })
        );
        assert_eq!(h.status("x1"), PipelineStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn save_timeout_is_a_transport_failure() {
        let config = PipelineConfig::default().with_save_timeout(Duration::from_millis(300));
        let mut h = harness(&["x1"], config);
        h.edit(&["x1"], 3.0);

        let (snapshots, reply) = h.validations.recv().await.unwrap();
        reply.send(Ok(all_ok(&snapshots))).unwrap();
        assert!(h.next().await.save_started);

        // Hold the save reply open so the call never completes.
        let _held = h.saves.recv().await.unwrap();

        let resolution = h.next().await;
        assert_eq!(
            resolution.failure,
            Some(PipelineFailure::SaveTransportFailure {
                message: "save timed out after 300 ms".to_string()
            })
        );
        assert_eq!(h.status("x1"), PipelineStatus::Error);
        assert_eq!(h.tracker.message(&IntervalId::from("x1")), Some("save timed out after 300 ms"));
    }

    struct PanickingValidator;

    #[async_trait]
    impl ValidationService for PanickingValidator {
        async fn validate(&self, _batch: &[IntervalSnapshot]) -> Result<Vec<ValidationResult>, ServiceError> {
            panic!("validator crashed")
        }
    }

    #[tokio::test]
    async fn panicking_validator_marks_the_batch_error() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let mut store = IntervalStore::new(0.18);
        store.load(vec![point("x1"), point("x2")]).unwrap();
        let mut tracker = StatusTracker::new();
        let mut orchestrator = Orchestrator::new(
            Arc::new(PanickingValidator),
            persistence.clone(),
            PipelineConfig::default(),
            Handle::current(),
        );

        let ids = vec![IntervalId::from("x1"), IntervalId::from("x2")];
        let changes = store.handle(&AdjustmentCommand::set(ids, 4.0)).unwrap();
        let applied = store.apply(&changes);
        let batch = orchestrator.submit(&applied, &store, &mut tracker).unwrap();

        let resolution = orchestrator.next_resolution(&mut tracker).await.unwrap();
        assert_eq!(resolution.batch, batch);
        assert!(!resolution.save_started);
        assert_eq!(
            resolution.failure,
            Some(PipelineFailure::ValidationTransportFailure {
                message: VALIDATION_FAILED_MESSAGE.to_string()
            })
        );
        for id in ["x1", "x2"] {
            assert_eq!(tracker.status(&IntervalId::from(id)), PipelineStatus::Error);
            assert_eq!(tracker.message(&IntervalId::from(id)), Some(VALIDATION_FAILED_MESSAGE));
        }
        assert_eq!(orchestrator.in_flight(), 0);
        assert!(persistence.saved_batches().is_empty());
    }

    #[tokio::test]
    async fn reload_discards_results_for_removed_ids() {
        let mut h = harness(&["x1", "x2"], PipelineConfig::default());
        h.edit(&["x1", "x2"], 3.0);
        let (snapshots, reply) = h.validations.recv().await.unwrap();

        h.store.load(vec![point("x2")]).unwrap();
        h.tracker.retain(&h.store);
        h.orchestrator.forget_missing(&h.store);
        reply.send(Ok(all_ok(&snapshots))).unwrap();

        let resolution = h.next().await;
        assert_eq!(resolution.stale, vec![IntervalId::from("x1")]);
        assert_eq!(h.tracker.status(&IntervalId::from("x1")), PipelineStatus::Idle);
        assert_eq!(h.status("x2"), PipelineStatus::Saving);
    }

    #[tokio::test]
    async fn abandon_drops_every_late_result() {
        let mut h = harness(&["x1"], PipelineConfig::default());
        h.edit(&["x1"], 3.0);
        let (snapshots, reply) = h.validations.recv().await.unwrap();

        h.orchestrator.abandon();
        let _ = reply.send(Ok(all_ok(&snapshots)));

        assert!(h.orchestrator.next_resolution(&mut h.tracker).await.is_none());
        assert_eq!(h.status("x1"), PipelineStatus::Pending);
        assert_eq!(h.orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn in_memory_services_run_to_saved() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let mut store = IntervalStore::new(0.18);
        store.load(vec![point("x1")]).unwrap();
        let mut tracker = StatusTracker::new();
        let mut orchestrator = Orchestrator::new(
            Arc::new(crate::local::ThresholdValidator::new()),
            persistence.clone(),
            PipelineConfig::default(),
            Handle::current(),
        );

        let changes = store
            .handle(&AdjustmentCommand::set(vec![IntervalId::from("x1")], 30.0))
            .unwrap();
        let applied = store.apply(&changes);
        orchestrator.submit(&applied, &store, &mut tracker);

        while orchestrator.next_resolution(&mut tracker).await.is_some() {}

        assert_eq!(tracker.status(&IntervalId::from("x1")), PipelineStatus::Saved);
        assert!(tracker.message(&IntervalId::from("x1")).is_some());
        assert_eq!(persistence.latest("x1").map(|s| s.required_agents), Some(23));
    }
}
