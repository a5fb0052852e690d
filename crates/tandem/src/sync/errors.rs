use thiserror::Error;
use uuid::Uuid;

use crate::platform::PlatformError;
use crate::store::StoreError;

/// Errors surfaced by the sync orchestrator API.
///
/// Per-entity failures never appear here; they are recorded on the task as
/// `SyncError`s. These are the failures of the API call itself.
#[derive(Debug, Error)]
pub enum SyncEngineError {
    /// Options were rejected before a task was created.
    #[error("Invalid sync options: {0}")]
    Validation(String),

    /// A required builder field was not set.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Sync task not found: {0}")]
    TaskNotFound(Uuid),

    /// The task has no checkpoint or already completed.
    #[error("Nothing to recover for task {0}")]
    NothingToRecover(Uuid),

    #[error("Task {0} is still running")]
    TaskStillRunning(Uuid),

    #[error("Task {0} was cancelled")]
    Cancelled(Uuid),

    #[error("Invalid webhook: {0}")]
    Webhook(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The spawned task body panicked or was aborted.
    #[error("Sync task terminated abnormally: {0}")]
    Join(String),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, SyncEngineError>;
