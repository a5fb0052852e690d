//! Progress reporting types for sync operations.
//!
//! The engine emits [`SyncProgress`] events through an optional callback so
//! that front ends can render progress without the engine knowing how.

use uuid::Uuid;

use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;
use crate::entity::sync_direction::SyncDirection;
use crate::entity::task_status::TaskStatus;

use super::task::{ConflictResolution, SyncAction, TaskCounters};

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A task moved to `InProgress`.
    TaskStarted {
        task_id: Uuid,
        direction: SyncDirection,
        entity_types: Vec<EntityType>,
        /// Task this one resumes, for recovery tasks.
        recovered_from: Option<Uuid>,
    },

    /// Starting to list entities for a phase.
    FetchingEntities {
        task_id: Uuid,
        entity_type: EntityType,
        origin: PlatformSide,
    },

    /// Fetched one page of entities.
    FetchedPage {
        task_id: Uuid,
        entity_type: EntityType,
        /// Page number (1-indexed).
        page: u32,
        count: usize,
    },

    /// Finished listing entities for a phase.
    FetchComplete {
        task_id: Uuid,
        entity_type: EntityType,
        origin: PlatformSide,
        /// Entities to process in this phase (after resume filtering).
        total: usize,
    },

    /// A batch is about to run.
    BatchStarted {
        task_id: Uuid,
        /// Zero-based index within the phase.
        batch_index: usize,
        size: usize,
    },

    /// Every item of a batch settled and the checkpoint was written.
    BatchComplete {
        task_id: Uuid,
        batch_index: usize,
        /// Counts of this batch only.
        delta: TaskCounters,
        /// Cumulative counts of the task.
        totals: TaskCounters,
    },

    /// An entity was reconciled (including skips).
    EntitySynced {
        task_id: Uuid,
        entity_type: EntityType,
        entity_id: String,
        action: SyncAction,
    },

    /// An entity failed; the task carries on.
    EntityFailed {
        task_id: Uuid,
        entity_type: EntityType,
        entity_id: String,
        error: String,
    },

    /// Two sides disagreed on a field.
    ConflictDetected {
        task_id: Uuid,
        entity_type: EntityType,
        entity_id: String,
        field: String,
        resolution: ConflictResolution,
    },

    /// Waiting before retrying a failed call.
    RetryBackoff {
        /// What is being retried, e.g. `create product on target`.
        operation: String,
        /// Attempt that just failed (1-indexed).
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A task reached a terminal state.
    TaskFinished {
        task_id: Uuid,
        status: TaskStatus,
        counters: TaskCounters,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// This is a convenience function to avoid repetitive `if let Some(cb) = ...` patterns.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
