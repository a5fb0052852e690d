//! Common re-exports for convenient entity usage.

pub use super::conflict_strategy::ConflictStrategy;
pub use super::entity_mapping::{
    ActiveModel as EntityMappingActiveModel, Column as EntityMappingColumn,
    Entity as EntityMappingEntity, Model as EntityMappingModel,
};
pub use super::entity_type::EntityType;
pub use super::platform_side::PlatformSide;
pub use super::sync_checkpoint::{
    ActiveModel as SyncCheckpointActiveModel, Column as SyncCheckpointColumn,
    Entity as SyncCheckpointEntity, Model as SyncCheckpointModel,
};
pub use super::sync_direction::SyncDirection;
pub use super::sync_result::{
    ActiveModel as SyncResultActiveModel, Column as SyncResultColumn,
    Entity as SyncResultEntity, Model as SyncResultModel,
};
pub use super::sync_task::{
    ActiveModel as SyncTaskActiveModel, Column as SyncTaskColumn, Entity as SyncTaskEntity,
    Model as SyncTaskModel,
};
pub use super::task_status::TaskStatus;
