//! SyncCheckpoint entity - the resume point of a task, rewritten after every batch.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::entity_type::EntityType;
use super::platform_side::PlatformSide;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// One checkpoint per task.
    #[sea_orm(primary_key, auto_increment = false)]
    pub task_id: Uuid,

    /// Entity type of the phase in progress.
    pub entity_type: EntityType,

    /// Platform the phase reads from.
    pub origin: PlatformSide,

    /// Last entity of the last fully settled batch.
    pub last_processed_entity_id: Option<String>,

    /// Cumulative `TaskCounters` at the time of the checkpoint.
    #[sea_orm(column_type = "Json")]
    pub counters: serde_json::Value,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
