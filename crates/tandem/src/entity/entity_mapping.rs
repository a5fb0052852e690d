//! EntityMapping entity - the cross-platform identity index.
//!
//! One row links a Source identifier to a Target identifier for one entity
//! type. Both `(entity_type, source_id)` and `(entity_type, target_id)` are
//! unique, so each identifier resolves to at most one mapping.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::entity_type::EntityType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entity_mappings")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub entity_type: EntityType,

    /// Identifier on the Source platform.
    pub source_id: String,

    /// Identifier on the Target platform.
    pub target_id: String,

    /// When the pair was last reconciled. The only column that changes after insert.
    pub last_synced_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
