//! SyncResult entity - append-only per-entity outcomes of a task.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::entity_type::EntityType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub task_id: Uuid,

    pub entity_type: EntityType,

    /// Identifier of the entity on the platform the pass read it from.
    pub entity_id: String,

    /// Action taken, e.g. `create_in_target` or `skip:already_mapped`.
    pub action: String,

    pub success: bool,

    pub source_id: Option<String>,
    pub target_id: Option<String>,

    /// Error code when `success` is false.
    pub error_code: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
