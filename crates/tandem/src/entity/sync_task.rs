//! SyncTask entity - one row per sync run.
//!
//! Options, counters, errors and conflicts are stored as JSON documents so a
//! task can be reloaded whole for inspection or recovery.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::conflict_strategy::ConflictStrategy;
use super::sync_direction::SyncDirection;
use super::task_status::TaskStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub status: TaskStatus,

    pub direction: SyncDirection,

    pub conflict_strategy: ConflictStrategy,

    /// The `SyncOptions` the task was started with.
    #[sea_orm(column_type = "Json")]
    pub options: serde_json::Value,

    /// Cumulative `TaskCounters`.
    #[sea_orm(column_type = "Json")]
    pub counters: serde_json::Value,

    /// Ordered list of `SyncError` records.
    #[sea_orm(column_type = "Json")]
    pub errors: serde_json::Value,

    /// Ordered list of `SyncConflict` records.
    #[sea_orm(column_type = "Json")]
    pub conflicts: serde_json::Value,

    /// Task whose checkpoint this task resumed from.
    pub recovered_from: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
