//! Task lifecycle: start, run, cancel and recover synchronization tasks.
//!
//! # Module Structure
//!
//! - [`builder`] - Composition root: [`SyncOrchestratorBuilder`]
//! - `reconcile` - Per-entity pipeline: lookup, decide, write, record
//! - `webhook` - Single-entity reconciliation triggered by a platform event
//!
//! A task walks its phases (entity type × pass origin) in order. Each phase
//! lists every entity of its origin platform, then hands them to the
//! [`BatchProcessor`]; the [`ProgressTracker`] writes a checkpoint after
//! every batch.

mod builder;
mod reconcile;
mod webhook;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::batch::{BatchProcessor, CancelToken};
use super::errors::{Result, SyncEngineError};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::resolver::ConflictResolver;
use super::task::{ErrorCode, SyncError, SyncPhase, SyncResult, SyncTask};
use super::tracker::ProgressTracker;
use super::types::SyncOptions;
use crate::entity::platform_side::PlatformSide;
use crate::entity::task_status::TaskStatus;
use crate::platform::{AuthProvider, Page, PlatformClient, PlatformEntity, Translator};
use crate::retry::RetryPolicy;
use crate::store::{EntityMappingStore, TaskStore};

pub use builder::SyncOrchestratorBuilder;

/// Default limit for task listings.
pub const DEFAULT_TASK_LIST_LIMIT: u64 = 20;

/// Handle to a spawned task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: Uuid,
    status: watch::Receiver<TaskStatus>,
    cancel: CancelToken,
    join: JoinHandle<Result<SyncTask>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Latest observed status.
    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// A receiver for status transitions.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.clone()
    }

    /// Request cancellation at the next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to reach a terminal state.
    pub async fn wait(self) -> Result<SyncTask> {
        self.join
            .await
            .map_err(|e| SyncEngineError::Join(e.to_string()))?
    }
}

/// Where a recovered task picks up.
#[derive(Debug, Clone)]
struct ResumePoint {
    phase: SyncPhase,
    after: Option<String>,
    /// Entities of `phase` that already have a result on the interrupted task.
    processed: HashSet<String>,
}

impl ResumePoint {
    /// Drop the entities the interrupted task already settled.
    fn apply(&self, entities: Vec<PlatformEntity>) -> Vec<PlatformEntity> {
        if let Some(after) = &self.after {
            if let Some(pos) = entities.iter().position(|e| &e.id == after) {
                return entities.into_iter().skip(pos + 1).collect();
            }
            tracing::warn!(
                entity_id = %after,
                "Checkpointed entity no longer listed, filtering by recorded results"
            );
        }
        entities
            .into_iter()
            .filter(|e| !self.processed.contains(&e.id))
            .collect()
    }
}

/// Per-task values shared by every item of the task.
pub(crate) struct TaskContext {
    pub task_id: Uuid,
    pub options: SyncOptions,
    pub policy: RetryPolicy,
}

enum RunOutcome {
    Completed,
    Cancelled,
}

/// Removes a task from the running table when its body ends, even by panic.
struct RunningGuard {
    orchestrator: Arc<SyncOrchestrator>,
    task_id: Uuid,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.orchestrator.running_table().remove(&self.task_id);
    }
}

/// Top-level coordinator of synchronization tasks.
///
/// Construct with [`SyncOrchestrator::builder`]. Most methods take
/// `self: &Arc<Self>` because task bodies run as independent tokio tasks.
pub struct SyncOrchestrator {
    source: Arc<dyn PlatformClient>,
    target: Arc<dyn PlatformClient>,
    source_auth: Option<Arc<dyn AuthProvider>>,
    target_auth: Option<Arc<dyn AuthProvider>>,
    translator: Arc<dyn Translator>,
    mappings: EntityMappingStore,
    tasks: Arc<dyn TaskStore>,
    resolver: ConflictResolver,
    on_progress: Option<Arc<ProgressCallback>>,
    webhook_options: SyncOptions,
    running: Mutex<HashMap<Uuid, CancelToken>>,
}

impl SyncOrchestrator {
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::default()
    }

    fn running_table(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancelToken>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn client(&self, side: PlatformSide) -> &Arc<dyn PlatformClient> {
        match side {
            PlatformSide::Source => &self.source,
            PlatformSide::Target => &self.target,
        }
    }

    pub(crate) fn auth(&self, side: PlatformSide) -> Option<&dyn AuthProvider> {
        match side {
            PlatformSide::Source => self.source_auth.as_deref(),
            PlatformSide::Target => self.target_auth.as_deref(),
        }
    }

    pub(crate) fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    pub fn mappings(&self) -> &EntityMappingStore {
        &self.mappings
    }

    /// Validate `options`, create a task and start it in the background.
    #[tracing::instrument(skip(self, options), fields(direction = %options.direction))]
    pub async fn start_sync(self: &Arc<Self>, options: SyncOptions) -> Result<TaskHandle> {
        options.validate().map_err(SyncEngineError::Validation)?;
        self.launch(SyncTask::new(options), None).await
    }

    async fn launch(
        self: &Arc<Self>,
        task: SyncTask,
        resume: Option<ResumePoint>,
    ) -> Result<TaskHandle> {
        let task_id = task.id;
        let tracker = Arc::new(ProgressTracker::new(
            task,
            Arc::clone(&self.tasks),
            self.on_progress.clone(),
        ));
        tracker.create().await?;
        tracker.start().await?;

        let status = tracker.subscribe();
        let cancel = CancelToken::new();
        self.running_table().insert(task_id, cancel.clone());

        let guard = RunningGuard {
            orchestrator: Arc::clone(self),
            task_id,
        };
        let body_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let orchestrator = Arc::clone(&guard.orchestrator);
            let finished = orchestrator.run_task(&tracker, resume, &body_cancel).await;
            drop(guard);
            finished
        });

        Ok(TaskHandle {
            task_id,
            status,
            cancel,
            join,
        })
    }

    /// Run every phase, then settle the task status. Never leaves the task open.
    async fn run_task(
        self: &Arc<Self>,
        tracker: &Arc<ProgressTracker>,
        resume: Option<ResumePoint>,
        cancel: &CancelToken,
    ) -> Result<SyncTask> {
        match self.run_phases(tracker, resume, cancel).await {
            Ok(RunOutcome::Completed) => tracker.complete(TaskStatus::Completed, None).await,
            Ok(RunOutcome::Cancelled) => {
                let error = SyncError::fatal(ErrorCode::Cancelled, "cancelled by request");
                tracker.complete(TaskStatus::Failed, Some(error)).await
            }
            Err(err) => {
                let error = SyncError::fatal(error_code(&err), err.to_string());
                tracker.complete(TaskStatus::Failed, Some(error)).await
            }
        }
    }

    async fn run_phases(
        self: &Arc<Self>,
        tracker: &Arc<ProgressTracker>,
        resume: Option<ResumePoint>,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let task = tracker.snapshot().await;
        let phases = SyncPhase::plan(&task.options);
        let skip = match &resume {
            Some(point) => phases.iter().position(|p| *p == point.phase).unwrap_or(0),
            None => 0,
        };

        let ctx = Arc::new(TaskContext {
            task_id: task.id,
            policy: RetryPolicy::from_options(&task.options),
            options: task.options.clone(),
        });

        for phase in phases.into_iter().skip(skip) {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let listed = self.fetch_all(&ctx, phase).await?;
            let resumed = resume.as_ref().filter(|r| r.phase == phase);
            let (entities, total, resume_after) = match resumed {
                Some(point) => {
                    let remaining = point.apply(listed);
                    // The interrupted task already counted this phase.
                    (remaining, 0, point.after.clone())
                }
                None => {
                    let total = listed.len() as u64;
                    (listed, total, None)
                }
            };

            emit(
                self.progress(),
                SyncProgress::FetchComplete {
                    task_id: ctx.task_id,
                    entity_type: phase.entity_type,
                    origin: phase.origin,
                    total: entities.len(),
                },
            );
            tracker.enter_phase(phase, total, resume_after).await?;

            let processor = BatchProcessor::new(ctx.task_id, ctx.options.batch_size)
                .with_inter_batch_delay(std::time::Duration::from_millis(
                    ctx.options.inter_batch_delay_ms,
                ));
            let this = Arc::clone(self);
            let item_ctx = Arc::clone(&ctx);
            let per_item = Arc::new(move |entity: PlatformEntity| {
                let this = Arc::clone(&this);
                let ctx = Arc::clone(&item_ctx);
                async move { this.reconcile_entity(&ctx, phase, entity).await }
            });

            let outcome = processor
                .run(entities, per_item, tracker.as_ref(), cancel)
                .await?;
            if outcome.cancelled {
                return Ok(RunOutcome::Cancelled);
            }
        }

        Ok(RunOutcome::Completed)
    }

    /// List every entity of a phase, page by page, until a short page.
    async fn fetch_all(
        &self,
        ctx: &TaskContext,
        phase: SyncPhase,
    ) -> Result<Vec<PlatformEntity>> {
        let client = self.client(phase.origin);
        let auth = self.auth(phase.origin);
        let filter = &ctx.options.filter;
        let mut page = Page::first(ctx.options.page_size);
        let mut entities = Vec::new();

        emit(
            self.progress(),
            SyncProgress::FetchingEntities {
                task_id: ctx.task_id,
                entity_type: phase.entity_type,
                origin: phase.origin,
            },
        );

        loop {
            let operation = format!(
                "fetch {} page {} from {}",
                phase.entity_type.collection(),
                page.number,
                client.name()
            );
            let batch = ctx
                .policy
                .execute_with_auth(
                    &operation,
                    || client.fetch_entities(phase.entity_type, filter, page),
                    auth,
                    self.progress(),
                )
                .await?;

            let count = batch.len();
            emit(
                self.progress(),
                SyncProgress::FetchedPage {
                    task_id: ctx.task_id,
                    entity_type: phase.entity_type,
                    page: page.number,
                    count,
                },
            );
            entities.extend(batch);

            if count < page.per_page as usize {
                break;
            }
            page = page.next();
        }

        tracing::debug!(
            task_id = %ctx.task_id,
            %phase,
            count = entities.len(),
            "Listed entities"
        );
        Ok(entities)
    }

    /// Latest persisted state of a task.
    pub async fn get_sync_task(&self, id: Uuid) -> Result<Option<SyncTask>> {
        Ok(self.tasks.get_task(id).await?)
    }

    /// Most recently created tasks first.
    pub async fn list_tasks(&self, limit: u64) -> Result<Vec<SyncTask>> {
        Ok(self.tasks.list_tasks(limit).await?)
    }

    /// Per-entity results of a task in the order they were recorded.
    pub async fn results_for_task(&self, id: Uuid) -> Result<Vec<SyncResult>> {
        Ok(self.tasks.results_for_task(id).await?)
    }

    /// Whether a task body is running in this process.
    pub fn is_running(&self, id: Uuid) -> bool {
        self.running_table().contains_key(&id)
    }

    /// Signal a running task to stop at its next batch boundary.
    ///
    /// Returns `false` when no such task runs in this process.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.running_table().get(&id) {
            Some(token) => {
                tracing::info!(task_id = %id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every running task. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let running = self.running_table();
        for token in running.values() {
            token.cancel();
        }
        running.len()
    }

    /// Continue an interrupted task from its last checkpoint as a new task.
    #[tracing::instrument(skip(self))]
    pub async fn recover_sync_operation(self: &Arc<Self>, id: Uuid) -> Result<TaskHandle> {
        let mut previous = self
            .tasks
            .get_task(id)
            .await?
            .ok_or(SyncEngineError::TaskNotFound(id))?;

        if self.is_running(id) {
            return Err(SyncEngineError::TaskStillRunning(id));
        }
        if previous.status == TaskStatus::Completed {
            return Err(SyncEngineError::NothingToRecover(id));
        }
        let checkpoint = self
            .tasks
            .load_checkpoint(id)
            .await?
            .ok_or(SyncEngineError::NothingToRecover(id))?;
        if !SyncPhase::plan(&previous.options).contains(&checkpoint.phase) {
            tracing::warn!(
                task_id = %id,
                phase = %checkpoint.phase,
                "Checkpoint phase not part of the task"
            );
            return Err(SyncEngineError::NothingToRecover(id));
        }

        if !previous.status.is_terminal() {
            // Left behind by a process that died mid-run.
            let now = chrono::Utc::now();
            previous.status = TaskStatus::Failed;
            previous.errors.push(SyncError::fatal(
                ErrorCode::Interrupted,
                "process stopped before the task finished",
            ));
            previous.completed_at = Some(now);
            previous.updated_at = now;
            self.tasks.save_task(&previous).await?;
            tracing::warn!(task_id = %id, "Marked interrupted task as failed");
        }

        let processed = self
            .tasks
            .results_for_task(id)
            .await?
            .into_iter()
            .filter(|r| r.entity_type == checkpoint.phase.entity_type)
            .map(|r| r.entity_id)
            .collect();

        let mut task = SyncTask::new(previous.options.clone());
        task.recovered_from = Some(id);
        task.counters = checkpoint.counters;

        tracing::info!(
            task_id = %task.id,
            recovered_from = %id,
            phase = %checkpoint.phase,
            after = ?checkpoint.last_processed_entity_id,
            "Recovering sync task"
        );

        self.launch(
            task,
            Some(ResumePoint {
                phase: checkpoint.phase,
                after: checkpoint.last_processed_entity_id,
                processed,
            }),
        )
        .await
    }
}

/// Error code recorded on a task that failed outside per-entity processing.
fn error_code(err: &SyncEngineError) -> ErrorCode {
    match err {
        SyncEngineError::Platform(e) => ErrorCode::from(e),
        SyncEngineError::Store(_) => ErrorCode::Store,
        SyncEngineError::Validation(_) | SyncEngineError::Webhook(_) => ErrorCode::Validation,
        SyncEngineError::Cancelled(_) => ErrorCode::Cancelled,
        _ => ErrorCode::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::conflict_strategy::ConflictStrategy;
    use crate::entity::entity_type::EntityType;
    use crate::entity::sync_direction::SyncDirection;
    use crate::platform::{CatalogTranslator, Payload, PlatformError};
    use crate::store::{EntityMapping, MappingStore, MemoryStore};
    use crate::sync::task::{Checkpoint, ConflictResolution, Severity};
    use crate::sync::{SkipReason, SyncAction};
    use crate::testing::{CallKind, MemoryPlatform};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};

    fn fields(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    struct Fixture {
        source: MemoryPlatform,
        target: MemoryPlatform,
        store: Arc<MemoryStore>,
        orchestrator: Arc<SyncOrchestrator>,
    }

    fn fixture() -> Fixture {
        let source = MemoryPlatform::new("source");
        let target = MemoryPlatform::new("target");
        let store = Arc::new(MemoryStore::new());
        let orchestrator = SyncOrchestrator::builder()
            .source(Arc::new(source.clone()))
            .target(Arc::new(target.clone()))
            .translator(Arc::new(CatalogTranslator::new()))
            .store(Arc::clone(&store))
            .build()
            .expect("all collaborators set");
        Fixture {
            source,
            target,
            store,
            orchestrator,
        }
    }

    fn options(direction: SyncDirection) -> SyncOptions {
        SyncOptions {
            entity_types: vec![EntityType::Product],
            direction,
            retry_count: 3,
            retry_delay_ms: 1,
            ..SyncOptions::default()
        }
    }

    async fn run(fx: &Fixture, options: SyncOptions) -> SyncTask {
        fx.orchestrator
            .start_sync(options)
            .await
            .expect("options are valid")
            .wait()
            .await
            .expect("task body settles")
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_a_task_exists() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .start_sync(SyncOptions {
                batch_size: 0,
                ..SyncOptions::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncEngineError::Validation(_)));
        assert!(fx.orchestrator.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn creates_missing_counterparts_and_records_mappings() {
        let fx = fixture();
        fx.source.insert(
            EntityType::Product,
            "p-1",
            fields(json!({"name": "Mug", "price": 19.99, "quantity": 100})),
        );

        let task = run(&fx, options(SyncDirection::SourceToTarget)).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.counters.entity_count, 1);
        assert_eq!(task.counters.created, 1);
        assert_eq!(task.counters.succeeded, 1);

        let created = fx.target.get(EntityType::Product, "target-1").unwrap();
        assert_eq!(created.fields["price"], json!(1999));
        assert_eq!(created.fields["inventory_quantity"], json!(100));
        assert_eq!(created.fields["title"], json!("Mug"));
        assert_eq!(created.fields["external_ref"], json!("p-1"));

        let mapping = fx
            .orchestrator
            .mappings()
            .lookup_by_source(EntityType::Product, "p-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.target_id, "target-1");

        let results = fx.orchestrator.results_for_task(task.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, SyncAction::CreateInTarget);
        assert_eq!(results[0].target_id.as_deref(), Some("target-1"));
    }

    #[tokio::test]
    async fn bidirectional_reverse_pass_does_not_bounce_fresh_records() {
        let fx = fixture();
        fx.source
            .insert(EntityType::Product, "p-1", fields(json!({"price": 5.0})));
        fx.target
            .insert(EntityType::Product, "t-1", fields(json!({"price": 700})));

        let task = run(&fx, options(SyncDirection::Bidirectional)).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.counters.created, 2);
        // The reverse pass also lists the record the forward pass created.
        assert_eq!(task.counters.skipped, 1);
        assert_eq!(fx.store.count(EntityType::Product).await.unwrap(), 2);
        assert_eq!(fx.source.entities(EntityType::Product).len(), 2);
        assert_eq!(fx.target.entities(EntityType::Product).len(), 2);

        let created_in_source = fx
            .orchestrator
            .mappings()
            .lookup_by_target(EntityType::Product, "t-1")
            .await
            .unwrap()
            .unwrap();
        let record = fx
            .source
            .get(EntityType::Product, &created_in_source.source_id)
            .unwrap();
        assert_eq!(record.fields["price"], json!(7.0));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fx = fixture();
        fx.source.insert(EntityType::Product, "p-1", Payload::new());
        fx.target
            .fail_next(CallKind::Create, 2, PlatformError::transient(503, "unavailable"));

        let task = run(&fx, options(SyncDirection::SourceToTarget)).await;

        assert_eq!(task.counters.created, 1);
        assert_eq!(task.counters.failed, 0);
        assert_eq!(fx.target.calls().create, 3);
    }

    #[tokio::test]
    async fn permanent_failure_fails_only_its_entity() {
        let fx = fixture();
        for id in ["p-1", "p-2", "p-3"] {
            fx.source.insert(EntityType::Product, id, Payload::new());
        }
        fx.target
            .fail_next(CallKind::Create, 1, PlatformError::permanent(422, "bad sku"));

        let task = run(&fx, options(SyncDirection::SourceToTarget)).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.counters.failed, 1);
        assert_eq!(task.counters.created, 2);
        let error = task.error_with_code(ErrorCode::Permanent).unwrap();
        assert!(error.entity_id.is_some());
        assert!(!error.retryable);
        assert_eq!(fx.store.count(EntityType::Product).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn listing_failure_fails_the_task() {
        let fx = fixture();
        fx.source
            .fail_next(CallKind::Fetch, 1, PlatformError::permanent(403, "forbidden"));

        let handle = fx
            .orchestrator
            .start_sync(options(SyncDirection::SourceToTarget))
            .await
            .unwrap();
        let mut status = handle.subscribe();
        let task_id = handle.task_id();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.errors[0].severity, Severity::Fatal);
        assert_eq!(task.errors[0].code, ErrorCode::Permanent);
        assert_eq!(*status.borrow_and_update(), TaskStatus::Failed);

        let stored = fx.orchestrator.get_sync_task(task_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(!fx.orchestrator.is_running(task_id));
    }

    #[tokio::test]
    async fn skip_existing_makes_no_calls_for_mapped_entities() {
        let fx = fixture();
        fx.source.insert(EntityType::Product, "p-1", Payload::new());
        run(&fx, options(SyncDirection::SourceToTarget)).await;
        let before = fx.target.calls();

        let task = run(
            &fx,
            SyncOptions {
                skip_existing: true,
                ..options(SyncDirection::SourceToTarget)
            },
        )
        .await;

        assert_eq!(task.counters.skipped, 1);
        assert_eq!(fx.target.calls().get, before.get);
        assert_eq!(fx.target.calls().writes(), before.writes());
        let results = fx.orchestrator.results_for_task(task.id).await.unwrap();
        assert_eq!(results[0].action, SyncAction::Skip(SkipReason::AlreadyMapped));
    }

    #[tokio::test]
    async fn missing_counterpart_is_a_warning() {
        let fx = fixture();
        fx.source.insert(EntityType::Product, "p-1", Payload::new());
        fx.store
            .upsert(EntityMapping::new(
                EntityType::Product,
                "p-1",
                "gone",
                Utc::now() - Duration::hours(1),
            ))
            .await
            .unwrap();

        let task = run(&fx, options(SyncDirection::SourceToTarget)).await;

        assert_eq!(task.counters.skipped, 1);
        let warning = task.error_with_code(ErrorCode::CounterpartMissing).unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(fx.target.calls().writes(), 0);
    }

    #[tokio::test]
    async fn manual_strategy_records_unresolved_conflicts() {
        let fx = fixture();
        let synced = Utc::now() - Duration::hours(1);
        fx.source.insert_at(
            EntityType::Product,
            "p-1",
            fields(json!({"price": 10.0})),
            synced + Duration::minutes(5),
        );
        fx.target.insert_at(
            EntityType::Product,
            "t-1",
            fields(json!({"price": 1200})),
            synced + Duration::minutes(6),
        );
        fx.store
            .upsert(EntityMapping::new(EntityType::Product, "p-1", "t-1", synced))
            .await
            .unwrap();

        let task = run(
            &fx,
            SyncOptions {
                conflict_strategy: ConflictStrategy::Manual,
                ..options(SyncDirection::SourceToTarget)
            },
        )
        .await;

        assert_eq!(task.conflicts.len(), 1);
        assert_eq!(task.conflicts[0].field, "price");
        assert_eq!(task.conflicts[0].resolution, ConflictResolution::Unresolved);
        assert_eq!(fx.target.calls().writes(), 0);
    }

    #[tokio::test]
    async fn advanced_status_reaches_both_platforms() {
        let fx = fixture();
        let synced = Utc::now() - Duration::hours(1);
        // Source shipped first; Target's later edit still says open.
        fx.source.insert_at(
            EntityType::Order,
            "o-1",
            fields(json!({"status": "shipped", "total": 10.0, "external_ref": "t-1"})),
            synced + Duration::minutes(5),
        );
        fx.target.insert_at(
            EntityType::Order,
            "t-1",
            fields(json!({"status": "open", "total_price": 1200, "external_ref": "o-1"})),
            synced + Duration::minutes(9),
        );
        fx.store
            .upsert(EntityMapping::new(EntityType::Order, "o-1", "t-1", synced))
            .await
            .unwrap();

        let sync_orders = || SyncOptions {
            entity_types: vec![EntityType::Order],
            conflict_strategy: ConflictStrategy::NewestWins,
            ..options(SyncDirection::Bidirectional)
        };
        let task = run(&fx, sync_orders()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        let status = task.conflicts.iter().find(|c| c.field == "status").unwrap();
        assert_eq!(status.resolution, ConflictResolution::StatusRank);

        let source = fx.source.get(EntityType::Order, "o-1").unwrap();
        let target = fx.target.get(EntityType::Order, "t-1").unwrap();
        assert_eq!(source.fields["status"], json!("shipped"));
        assert_eq!(target.fields["status"], json!("shipped"));
        // Everything else follows the newer side.
        assert_eq!(source.fields["total"], json!(12.0));
        assert_eq!(target.fields["total_price"], json!(1200));
        assert_eq!(target.fields["external_ref"], json!("o-1"));

        let writes = (fx.source.calls().writes(), fx.target.calls().writes());
        let again = run(&fx, sync_orders()).await;
        assert!(again.conflicts.is_empty());
        assert_eq!(
            (fx.source.calls().writes(), fx.target.calls().writes()),
            writes
        );
    }

    #[tokio::test]
    async fn one_way_pass_does_not_backfill_the_read_side() {
        let fx = fixture();
        let synced = Utc::now() - Duration::hours(1);
        fx.source.insert_at(
            EntityType::Order,
            "o-1",
            fields(json!({"status": "open", "total": 10.0})),
            synced + Duration::minutes(9),
        );
        fx.target.insert_at(
            EntityType::Order,
            "t-1",
            fields(json!({"status": "shipped", "total_price": 1200})),
            synced + Duration::minutes(5),
        );
        fx.store
            .upsert(EntityMapping::new(EntityType::Order, "o-1", "t-1", synced))
            .await
            .unwrap();

        run(
            &fx,
            SyncOptions {
                entity_types: vec![EntityType::Order],
                ..options(SyncDirection::SourceToTarget)
            },
        )
        .await;

        let target = fx.target.get(EntityType::Order, "t-1").unwrap();
        assert_eq!(target.fields["status"], json!("shipped"));
        assert_eq!(target.fields["total_price"], json!(1000));
        assert_eq!(fx.source.calls().writes(), 0);
        assert_eq!(
            fx.source.get(EntityType::Order, "o-1").unwrap().fields["status"],
            json!("open")
        );
    }

    #[tokio::test]
    async fn recovery_requires_an_unfinished_task() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .recover_sync_operation(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncEngineError::TaskNotFound(_)));

        let task = run(&fx, options(SyncDirection::SourceToTarget)).await;
        let err = fx
            .orchestrator
            .recover_sync_operation(task.id)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncEngineError::NothingToRecover(_)));
    }

    #[tokio::test]
    async fn stale_in_progress_task_is_marked_interrupted_and_resumed() {
        let fx = fixture();
        for i in 1..=4 {
            fx.source
                .insert(EntityType::Product, &format!("p-{i}"), Payload::new());
        }

        // A task a previous process left behind after settling p-1 and p-2.
        let mut stale = SyncTask::new(SyncOptions {
            batch_size: 2,
            ..options(SyncDirection::SourceToTarget)
        });
        stale.status = TaskStatus::InProgress;
        stale.counters.entity_count = 4;
        fx.store.save_task(&stale).await.unwrap();
        fx.store
            .save_checkpoint(&Checkpoint {
                task_id: stale.id,
                phase: SyncPhase {
                    entity_type: EntityType::Product,
                    origin: PlatformSide::Source,
                },
                last_processed_entity_id: Some("p-2".to_string()),
                counters: stale.counters,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let handle = fx.orchestrator.recover_sync_operation(stale.id).await.unwrap();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.recovered_from, Some(stale.id));
        assert_eq!(task.counters.entity_count, 4);
        assert_eq!(task.counters.created, 2);
        let ids: Vec<_> = fx
            .orchestrator
            .results_for_task(task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.entity_id)
            .collect();
        assert_eq!(ids, vec!["p-3", "p-4"]);

        let old = fx.orchestrator.get_sync_task(stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, TaskStatus::Failed);
        assert!(old.error_with_code(ErrorCode::Interrupted).is_some());
    }

    #[tokio::test]
    async fn webhook_links_reference_and_updates_counterpart() {
        let fx = fixture();
        let earlier = Utc::now() - Duration::minutes(10);
        fx.target.insert_at(
            EntityType::Product,
            "t-9",
            fields(json!({"price": 500})),
            earlier,
        );
        fx.source
            .insert(EntityType::Product, "p-1", fields(json!({"price": 6.5})));

        let result = fx
            .orchestrator
            .ingest_webhook(
                PlatformSide::Source,
                br#"{"entity_type":"product","entity_id":"p-1","reference_id":"t-9"}"#,
            )
            .await
            .unwrap();

        assert_eq!(result.action, SyncAction::UpdateTarget);
        assert!(result.success);
        assert_eq!(
            fx.target.get(EntityType::Product, "t-9").unwrap().fields["price"],
            json!(650)
        );
        assert_eq!(fx.target.calls().create, 0);

        let task = fx.orchestrator.get_sync_task(result.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.counters.updated, 1);
    }

    #[tokio::test]
    async fn webhook_for_unknown_entity_fails_its_task() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .ingest_webhook(
                PlatformSide::Target,
                br#"{"entity_type":"order","entity_id":"nope"}"#,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncEngineError::Webhook(_)));

        let tasks = fx.orchestrator.list_tasks(1).await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0].error_with_code(ErrorCode::Validation).is_some());
    }

    #[tokio::test]
    async fn cancel_reports_unknown_tasks() {
        let fx = fixture();
        assert!(!fx.orchestrator.cancel(Uuid::new_v4()));
        assert_eq!(fx.orchestrator.cancel_all(), 0);
    }
}
