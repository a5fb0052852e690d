//! Durable state of the engine: the identity mapping index and task records.
//!
//! Storage sits behind two traits so the engine does not care where state
//! lives. [`DatabaseStore`] persists through sea-orm (SQLite or Postgres);
//! [`MemoryStore`] keeps everything in process and serves as a test double.
//!
//! Mapping uniqueness is enforced twice: [`EntityMappingStore`] serializes
//! work per `(entity type, side, id)` inside the process, and the backends
//! reject a second mapping for an already-mapped id.

mod database;
mod errors;
mod locks;
mod mapping;
mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::entity_type::EntityType;
use crate::sync::{Checkpoint, SyncResult, SyncTask};

pub use database::DatabaseStore;
pub use errors::{Result, StoreError};
pub use locks::KeyedLocks;
pub use mapping::{CreateGuard, EntityMapping, EntityMappingStore, MappingGuard, MappingKey};
pub use memory::MemoryStore;

/// Persistent bidirectional index between Source and Target identifiers.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn lookup_by_source(
        &self,
        entity_type: EntityType,
        source_id: &str,
    ) -> Result<Option<EntityMapping>>;

    async fn lookup_by_target(
        &self,
        entity_type: EntityType,
        target_id: &str,
    ) -> Result<Option<EntityMapping>>;

    /// Insert `mapping`, or advance `last_synced_at` of the identical pair.
    ///
    /// Returns the stored mapping. Fails with [`StoreError::MappingConflict`]
    /// when either id is already mapped to a different counterpart.
    async fn upsert(&self, mapping: EntityMapping) -> Result<EntityMapping>;

    /// Number of mappings of `entity_type`.
    async fn count(&self, entity_type: EntityType) -> Result<u64>;
}

/// Storage for tasks, their results and checkpoints.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a task.
    async fn save_task(&self, task: &SyncTask) -> Result<()>;

    async fn get_task(&self, id: Uuid) -> Result<Option<SyncTask>>;

    /// Most recently created tasks first.
    async fn list_tasks(&self, limit: u64) -> Result<Vec<SyncTask>>;

    /// Append per-entity results. Existing results are never modified.
    async fn append_results(&self, results: &[SyncResult]) -> Result<()>;

    /// Results of a task in insertion order.
    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<SyncResult>>;

    /// Insert or replace the checkpoint of `checkpoint.task_id`.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    async fn load_checkpoint(&self, task_id: Uuid) -> Result<Option<Checkpoint>>;
}
