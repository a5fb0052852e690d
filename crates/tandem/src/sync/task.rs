//! Task-level records: the task itself, per-entity results, errors,
//! conflicts and the resume checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::conflict_strategy::ConflictStrategy;
use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;
use crate::entity::sync_direction::SyncDirection;
use crate::entity::task_status::TaskStatus;
use crate::platform::PlatformError;

use super::types::SyncOptions;

/// Cumulative counts of a task (or of one batch, as a delta).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskCounters {
    /// Entities fetched for processing across all phases.
    pub entity_count: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
}

impl TaskCounters {
    /// Count one settled entity.
    pub fn record(&mut self, result: &SyncResult) {
        self.processed += 1;
        if !result.success {
            self.failed += 1;
            return;
        }
        match result.action {
            SyncAction::CreateInTarget | SyncAction::CreateInSource => {
                self.succeeded += 1;
                self.created += 1;
            }
            SyncAction::UpdateTarget | SyncAction::UpdateSource => {
                self.succeeded += 1;
                self.updated += 1;
            }
            SyncAction::Skip(_) | SyncAction::Conflict => self.skipped += 1,
        }
    }

    /// Add another set of counts onto this one.
    pub fn absorb(&mut self, other: &TaskCounters) {
        self.entity_count += other.entity_count;
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.created += other.created;
        self.updated += other.updated;
    }
}

/// Why an entity was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A mapping exists and the task skips mapped entities.
    AlreadyMapped,
    /// Neither side changed since the last sync.
    Unchanged,
    /// The mapped counterpart no longer exists on the other platform.
    CounterpartMissing,
    /// The needed write would go against the task direction.
    DirectionNotAllowed,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::AlreadyMapped => "already_mapped",
            SkipReason::Unchanged => "unchanged",
            SkipReason::CounterpartMissing => "counterpart_missing",
            SkipReason::DirectionNotAllowed => "direction_not_allowed",
        }
    }
}

/// Per-entity action decided by the conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    CreateInTarget,
    CreateInSource,
    UpdateTarget,
    UpdateSource,
    Skip(SkipReason),
    /// Unresolved conflict, left for external resolution.
    Conflict,
}

impl SyncAction {
    /// Platform this action writes to, if any.
    #[must_use]
    pub fn writes_to(self) -> Option<PlatformSide> {
        match self {
            SyncAction::CreateInTarget | SyncAction::UpdateTarget => Some(PlatformSide::Target),
            SyncAction::CreateInSource | SyncAction::UpdateSource => Some(PlatformSide::Source),
            SyncAction::Skip(_) | SyncAction::Conflict => None,
        }
    }

    #[must_use]
    pub fn is_create(self) -> bool {
        matches!(self, SyncAction::CreateInTarget | SyncAction::CreateInSource)
    }

    /// Create on `side`.
    #[must_use]
    pub fn create_in(side: PlatformSide) -> Self {
        match side {
            PlatformSide::Source => SyncAction::CreateInSource,
            PlatformSide::Target => SyncAction::CreateInTarget,
        }
    }

    /// Update on `side`.
    #[must_use]
    pub fn update(side: PlatformSide) -> Self {
        match side {
            PlatformSide::Source => SyncAction::UpdateSource,
            PlatformSide::Target => SyncAction::UpdateTarget,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncAction::CreateInTarget => write!(f, "create_in_target"),
            SyncAction::CreateInSource => write!(f, "create_in_source"),
            SyncAction::UpdateTarget => write!(f, "update_target"),
            SyncAction::UpdateSource => write!(f, "update_source"),
            SyncAction::Skip(reason) => write!(f, "skip:{}", reason.as_str()),
            SyncAction::Conflict => write!(f, "conflict"),
        }
    }
}

impl std::str::FromStr for SyncAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_in_target" => Ok(SyncAction::CreateInTarget),
            "create_in_source" => Ok(SyncAction::CreateInSource),
            "update_target" => Ok(SyncAction::UpdateTarget),
            "update_source" => Ok(SyncAction::UpdateSource),
            "conflict" => Ok(SyncAction::Conflict),
            "skip:already_mapped" => Ok(SyncAction::Skip(SkipReason::AlreadyMapped)),
            "skip:unchanged" => Ok(SyncAction::Skip(SkipReason::Unchanged)),
            "skip:counterpart_missing" => Ok(SyncAction::Skip(SkipReason::CounterpartMissing)),
            "skip:direction_not_allowed" => Ok(SyncAction::Skip(SkipReason::DirectionNotAllowed)),
            _ => Err(format!("Unknown sync action: {}", s)),
        }
    }
}

/// Machine-readable classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Authentication,
    RateLimited,
    Transient,
    Timeout,
    Network,
    Permanent,
    InvalidPayload,
    MappingConflict,
    CounterpartMissing,
    Store,
    Panic,
    Cancelled,
    Interrupted,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Authentication => "AUTHENTICATION",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Transient => "TRANSIENT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Permanent => "PERMANENT",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::MappingConflict => "MAPPING_CONFLICT",
            ErrorCode::CounterpartMissing => "COUNTERPART_MISSING",
            ErrorCode::Store => "STORE",
            ErrorCode::Panic => "PANIC",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Interrupted => "INTERRUPTED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("Unknown error code: {}", s))
    }
}

impl From<&PlatformError> for ErrorCode {
    fn from(err: &PlatformError) -> Self {
        match err {
            PlatformError::Authentication { .. } => ErrorCode::Authentication,
            PlatformError::RateLimited { .. } => ErrorCode::RateLimited,
            PlatformError::Transient { .. } => ErrorCode::Transient,
            PlatformError::Timeout { .. } => ErrorCode::Timeout,
            PlatformError::Network { .. } => ErrorCode::Network,
            PlatformError::Permanent { status: 401, .. } => ErrorCode::Authentication,
            PlatformError::Permanent { .. } => ErrorCode::Permanent,
            PlatformError::InvalidPayload { .. } => ErrorCode::InvalidPayload,
            PlatformError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// An error recorded on a task. Never dropped silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SyncError {
    pub fn new(code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
            retryable: false,
            entity_type: None,
            entity_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// A failure of one entity caused by a platform call.
    pub fn from_platform(err: &PlatformError, entity_type: EntityType, entity_id: &str) -> Self {
        Self {
            retryable: err.is_retryable(),
            ..Self::new(ErrorCode::from(err), Severity::Error, err.to_string())
        }
        .for_entity(entity_type, entity_id)
    }

    /// A task-level failure outside per-entity processing.
    pub fn fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Fatal, message)
    }

    #[must_use]
    pub fn for_entity(mut self, entity_type: EntityType, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id.to_string());
        self
    }
}

/// How a conflicting field was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    SourceWins,
    TargetWins,
    /// The more advanced status value won, regardless of strategy.
    StatusRank,
    /// Left for external resolution (manual strategy).
    Unresolved,
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictResolution::SourceWins => write!(f, "SOURCE_WINS"),
            ConflictResolution::TargetWins => write!(f, "TARGET_WINS"),
            ConflictResolution::StatusRank => write!(f, "STATUS_RANK"),
            ConflictResolution::Unresolved => write!(f, "UNRESOLVED"),
        }
    }
}

/// A field that differed between the two sides of a mapped pair.
///
/// Values are given in the Source format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub entity_type: EntityType,
    /// Identifier on the platform the pass read from.
    pub entity_id: String,
    pub field: String,
    pub source_value: Value,
    pub target_value: Value,
    pub resolution: ConflictResolution,
    pub detected_at: DateTime<Utc>,
}

/// Outcome of one entity in one task. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub id: Uuid,
    pub task_id: Uuid,
    pub entity_type: EntityType,
    /// Identifier on the platform the pass read from.
    pub entity_id: String,
    pub action: SyncAction,
    pub success: bool,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(task_id: Uuid, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            entity_type,
            entity_id: entity_id.into(),
            action: SyncAction::Skip(SkipReason::Unchanged),
            success: true,
            source_id: None,
            target_id: None,
            error_code: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: SyncAction) -> Self {
        self.action = action;
        self
    }

    #[must_use]
    pub fn with_ids(mut self, source_id: Option<String>, target_id: Option<String>) -> Self {
        self.source_id = source_id;
        self.target_id = target_id;
        self
    }

    #[must_use]
    pub fn failed(mut self, code: ErrorCode) -> Self {
        self.success = false;
        self.error_code = Some(code);
        self
    }
}

/// A pass over one entity type, reading from `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPhase {
    pub entity_type: EntityType,
    pub origin: PlatformSide,
}

impl SyncPhase {
    /// Phases of a task in execution order: entity types in order, each with
    /// the passes of the direction.
    #[must_use]
    pub fn plan(options: &SyncOptions) -> Vec<SyncPhase> {
        options
            .entity_types
            .iter()
            .flat_map(|&entity_type| {
                options
                    .direction
                    .passes()
                    .iter()
                    .map(move |&origin| SyncPhase {
                        entity_type,
                        origin,
                    })
            })
            .collect()
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}->{}",
            self.entity_type,
            self.origin,
            self.origin.opposite()
        )
    }
}

/// Everything needed to resume a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: Uuid,
    pub phase: SyncPhase,
    /// Last entity of the last fully settled batch of `phase`.
    pub last_processed_entity_id: Option<String>,
    pub counters: TaskCounters,
    pub updated_at: DateTime<Utc>,
}

/// One synchronization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: Uuid,
    pub options: SyncOptions,
    pub status: TaskStatus,
    pub counters: TaskCounters,
    pub errors: Vec<SyncError>,
    pub conflicts: Vec<SyncConflict>,
    /// Task whose checkpoint this one resumed.
    pub recovered_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncTask {
    /// A new task in `Pending`.
    pub fn new(options: SyncOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            options,
            status: TaskStatus::Pending,
            counters: TaskCounters::default(),
            errors: Vec::new(),
            conflicts: Vec::new(),
            recovered_from: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn direction(&self) -> SyncDirection {
        self.options.direction
    }

    #[must_use]
    pub fn conflict_strategy(&self) -> ConflictStrategy {
        self.options.conflict_strategy
    }

    #[must_use]
    pub fn entity_types(&self) -> &[EntityType] {
        &self.options.entity_types
    }

    /// First error with the given code, if any.
    #[must_use]
    pub fn error_with_code(&self, code: ErrorCode) -> Option<&SyncError> {
        self.errors.iter().find(|e| e.code == code)
    }
}
