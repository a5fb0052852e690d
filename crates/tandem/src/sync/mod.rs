//! The synchronization engine.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncOptions` and engine-wide constants
//! - `task` - Task records: `SyncTask`, `SyncResult`, `SyncError`, `Checkpoint`
//! - `progress` - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - `resolver` - Pure per-entity decisions: `ConflictResolver`
//! - `batch` - Batched concurrent execution: `BatchProcessor`
//! - `tracker` - Counters, status and checkpoints: `ProgressTracker`
//! - [`orchestrator`] - Task lifecycle: `SyncOrchestrator`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem::platform::CatalogTranslator;
//! use tandem::store::DatabaseStore;
//! use tandem::sync::{SyncOptions, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::builder()
//!     .source(source_client)
//!     .target(target_client)
//!     .translator(Arc::new(CatalogTranslator::new()))
//!     .store(Arc::new(DatabaseStore::new(db)))
//!     .build()?;
//!
//! let handle = orchestrator.start_sync(SyncOptions::default()).await?;
//! let task = handle.wait().await?;
//! println!("{} created, {} updated", task.counters.created, task.counters.updated);
//! ```

mod batch;
mod errors;
pub mod orchestrator;
mod progress;
mod resolver;
mod task;
mod tracker;
pub mod types;

pub use batch::{
    BatchDelta, BatchObserver, BatchProcessor, BatchResult, CancelToken, ItemReport, NoopObserver,
};
pub use errors::{Result, SyncEngineError};
pub use orchestrator::{
    DEFAULT_TASK_LIST_LIMIT, SyncOrchestrator, SyncOrchestratorBuilder, TaskHandle,
};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use resolver::{ConflictResolver, Decision, ReconcileInput, Snapshot, StatusRanking};
pub use task::{
    Checkpoint, ConflictResolution, ErrorCode, Severity, SkipReason, SyncAction, SyncConflict,
    SyncError, SyncPhase, SyncResult, SyncTask, TaskCounters,
};
pub use tracker::ProgressTracker;
pub use types::{
    DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS,
    MAX_BACKOFF_MS, MAX_BATCH_SIZE, MAX_RETRY_COUNT, SyncOptions,
};
