//! Task bookkeeping: counters, status transitions and checkpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, watch};

use super::batch::{BatchDelta, BatchObserver};
use super::errors::Result;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::task::{Checkpoint, SyncError, SyncPhase, SyncTask, TaskCounters};
use crate::entity::task_status::TaskStatus;
use crate::store::TaskStore;

struct TrackerState {
    task: SyncTask,
    checkpoint: Option<Checkpoint>,
}

/// Owns the mutable state of one running task and persists it.
///
/// After each batch the results are written first, then the checkpoint,
/// then the task row. A crash between those writes can only cause a batch
/// to be processed again on recovery, which mapping upserts tolerate.
pub struct ProgressTracker {
    store: Arc<dyn TaskStore>,
    on_progress: Option<Arc<ProgressCallback>>,
    status: watch::Sender<TaskStatus>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(
        task: SyncTask,
        store: Arc<dyn TaskStore>,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        let (status, _) = watch::channel(task.status);
        Self {
            store,
            on_progress,
            status,
            state: Mutex::new(TrackerState {
                task,
                checkpoint: None,
            }),
        }
    }

    /// Receiver that observes every status transition.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    fn emit(&self, event: SyncProgress) {
        emit(self.on_progress.as_deref(), event);
    }

    /// Persist the task in `Pending`.
    pub async fn create(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.store.save_task(&state.task).await?;
        Ok(())
    }

    /// Move the task to `InProgress`.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.task.status = TaskStatus::InProgress;
        state.task.started_at = Some(now);
        state.task.updated_at = now;
        self.store.save_task(&state.task).await?;
        self.status.send_replace(TaskStatus::InProgress);

        tracing::info!(
            task_id = %state.task.id,
            direction = %state.task.direction(),
            recovered_from = ?state.task.recovered_from,
            "Sync task started"
        );
        self.emit(SyncProgress::TaskStarted {
            task_id: state.task.id,
            direction: state.task.direction(),
            entity_types: state.task.entity_types().to_vec(),
            recovered_from: state.task.recovered_from,
        });
        Ok(())
    }

    /// Begin a phase with `total` entities to process.
    ///
    /// Writes a checkpoint right away so that a task interrupted before its
    /// first batch settles can still be recovered. `resume_after` carries the
    /// resume point of a recovered phase.
    pub async fn enter_phase(
        &self,
        phase: SyncPhase,
        total: u64,
        resume_after: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.task.counters.entity_count += total;
        state.task.updated_at = now;

        let checkpoint = Checkpoint {
            task_id: state.task.id,
            phase,
            last_processed_entity_id: resume_after,
            counters: state.task.counters,
            updated_at: now,
        };
        self.store.save_checkpoint(&checkpoint).await?;
        self.store.save_task(&state.task).await?;
        state.checkpoint = Some(checkpoint);

        tracing::debug!(task_id = %state.task.id, %phase, total, "Entered phase");
        Ok(())
    }

    /// Fold one settled batch into the task and persist it.
    pub async fn update(&self, delta: &BatchDelta) -> Result<TaskCounters> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        self.store.append_results(&delta.results).await?;

        state.task.counters.absorb(&delta.counts);
        state.task.errors.extend(delta.errors.iter().cloned());
        state.task.conflicts.extend(delta.conflicts.iter().cloned());
        state.task.updated_at = now;

        let counters = state.task.counters;
        if let Some(checkpoint) = state.checkpoint.as_mut() {
            if delta.last_entity_id.is_some() {
                checkpoint.last_processed_entity_id = delta.last_entity_id.clone();
            }
            checkpoint.counters = counters;
            checkpoint.updated_at = now;
            self.store.save_checkpoint(checkpoint).await?;
        }
        self.store.save_task(&state.task).await?;

        tracing::debug!(
            task_id = %state.task.id,
            batch_index = delta.batch_index,
            processed = counters.processed,
            failed = counters.failed,
            "Checkpoint written"
        );
        self.emit(SyncProgress::BatchComplete {
            task_id: state.task.id,
            batch_index: delta.batch_index,
            delta: delta.counts,
            totals: counters,
        });
        Ok(counters)
    }

    /// Move the task to a terminal status and return its final state.
    pub async fn complete(&self, status: TaskStatus, error: Option<SyncError>) -> Result<SyncTask> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(error) = error {
            state.task.errors.push(error);
        }
        state.task.status = status;
        state.task.completed_at = Some(now);
        state.task.updated_at = now;

        let saved = self.store.save_task(&state.task).await;
        self.status.send_replace(status);

        let task = &state.task;
        match status {
            TaskStatus::Completed => tracing::info!(
                task_id = %task.id,
                processed = task.counters.processed,
                succeeded = task.counters.succeeded,
                failed = task.counters.failed,
                skipped = task.counters.skipped,
                "Sync task completed"
            ),
            _ => tracing::error!(
                task_id = %task.id,
                status = %status,
                errors = task.errors.len(),
                "Sync task failed"
            ),
        }
        self.emit(SyncProgress::TaskFinished {
            task_id: task.id,
            status,
            counters: task.counters,
        });

        saved?;
        Ok(task.clone())
    }

    /// Cumulative counters so far.
    pub async fn current_progress(&self) -> TaskCounters {
        self.state.lock().await.task.counters
    }

    /// Copy of the task as it stands.
    pub async fn snapshot(&self) -> SyncTask {
        self.state.lock().await.task.clone()
    }
}

#[async_trait]
impl BatchObserver for ProgressTracker {
    async fn on_batch_start(&self, batch_index: usize, size: usize) {
        let task_id = self.state.lock().await.task.id;
        self.emit(SyncProgress::BatchStarted {
            task_id,
            batch_index,
            size,
        });
    }

    async fn on_batch(&self, delta: &BatchDelta) -> Result<()> {
        self.update(delta).await.map(|_| ())
    }
}
