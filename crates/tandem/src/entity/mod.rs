//! SeaORM entity definitions for the tandem database schema.

pub mod conflict_strategy;
pub mod entity_mapping;
pub mod entity_type;
pub mod platform_side;
pub mod prelude;
pub mod sync_checkpoint;
pub mod sync_direction;
pub mod sync_result;
pub mod sync_task;
pub mod task_status;
