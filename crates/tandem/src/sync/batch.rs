//! Fixed-size batch execution with per-item failure isolation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::Result;
use super::task::{ErrorCode, Severity, SyncConflict, SyncError, SyncResult, TaskCounters};
use crate::platform::PlatformEntity;

/// Cooperative cancellation flag, checked at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What processing one entity produced.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub result: SyncResult,
    pub errors: Vec<SyncError>,
    pub conflicts: Vec<SyncConflict>,
}

impl ItemReport {
    pub fn new(result: SyncResult) -> Self {
        Self {
            result,
            errors: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

/// Everything one settled batch contributed.
#[derive(Debug, Clone, Default)]
pub struct BatchDelta {
    /// Zero-based index within the run.
    pub batch_index: usize,
    /// Results in input order.
    pub results: Vec<SyncResult>,
    pub errors: Vec<SyncError>,
    pub conflicts: Vec<SyncConflict>,
    pub counts: TaskCounters,
    /// Id of the last entity of the batch in input order.
    pub last_entity_id: Option<String>,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub counts: TaskCounters,
    pub errors: Vec<SyncError>,
    pub conflicts: Vec<SyncConflict>,
    pub results: Vec<SyncResult>,
    pub last_entity_id: Option<String>,
    /// Batches that ran to completion.
    pub batches: usize,
    /// The run stopped at a batch boundary because of cancellation.
    pub cancelled: bool,
}

impl BatchResult {
    fn absorb(&mut self, delta: BatchDelta) {
        self.counts.absorb(&delta.counts);
        self.results.extend(delta.results);
        self.errors.extend(delta.errors);
        self.conflicts.extend(delta.conflicts);
        if delta.last_entity_id.is_some() {
            self.last_entity_id = delta.last_entity_id;
        }
        self.batches += 1;
    }
}

/// Receives batch boundaries. An error from `on_batch` stops the run.
#[async_trait]
pub trait BatchObserver: Send + Sync {
    async fn on_batch_start(&self, _batch_index: usize, _size: usize) {}

    async fn on_batch(&self, delta: &BatchDelta) -> Result<()>;
}

/// Observer that ignores every batch.
pub struct NoopObserver;

#[async_trait]
impl BatchObserver for NoopObserver {
    async fn on_batch(&self, _delta: &BatchDelta) -> Result<()> {
        Ok(())
    }
}

/// Runs entities in consecutive batches.
///
/// Items of one batch are spawned together; the next batch starts only after
/// every item of the current one settled. Concurrency towards a platform is
/// bounded by its rate limiter, not here.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    task_id: Uuid,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl BatchProcessor {
    pub fn new(task_id: Uuid, batch_size: usize) -> Self {
        Self {
            task_id,
            batch_size: batch_size.max(1),
            inter_batch_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn run<F, Fut>(
        &self,
        entities: Vec<PlatformEntity>,
        per_item: Arc<F>,
        observer: &dyn BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult>
    where
        F: Fn(PlatformEntity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemReport> + Send + 'static,
    {
        let mut outcome = BatchResult::default();
        let mut remaining = entities.into_iter();
        let mut batch_index = 0usize;

        loop {
            let batch: Vec<PlatformEntity> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            if batch_index > 0 && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }

            if cancel.is_cancelled() {
                tracing::info!(task_id = %self.task_id, batch_index, "Cancelled at batch boundary");
                outcome.cancelled = true;
                break;
            }

            observer.on_batch_start(batch_index, batch.len()).await;
            tracing::debug!(
                task_id = %self.task_id,
                batch_index,
                size = batch.len(),
                "Running batch"
            );

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|entity| {
                    let per_item = Arc::clone(&per_item);
                    tokio::spawn(async move { (*per_item)(entity).await })
                })
                .collect();

            let mut delta = BatchDelta {
                batch_index,
                last_entity_id: batch.last().map(|e| e.id.clone()),
                ..BatchDelta::default()
            };

            for (entity, handle) in batch.iter().zip(handles) {
                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::error!(
                            task_id = %self.task_id,
                            entity_id = %entity.id,
                            error = %e,
                            "Entity task terminated abnormally"
                        );
                        self.panic_report(entity, &e)
                    }
                };
                delta.counts.record(&report.result);
                delta.results.push(report.result);
                delta.errors.extend(report.errors);
                delta.conflicts.extend(report.conflicts);
            }

            observer.on_batch(&delta).await?;
            outcome.absorb(delta);
            batch_index += 1;
        }

        Ok(outcome)
    }

    fn panic_report(&self, entity: &PlatformEntity, err: &tokio::task::JoinError) -> ItemReport {
        let result =
            SyncResult::new(self.task_id, entity.entity_type, &entity.id).failed(ErrorCode::Panic);
        let error = SyncError::new(
            ErrorCode::Panic,
            Severity::Error,
            format!("entity task terminated abnormally: {err}"),
        )
        .for_entity(entity.entity_type, &entity.id);

        ItemReport {
            result,
            errors: vec![error],
            conflicts: Vec::new(),
        }
    }
}
