use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{EntityMapping, MappingStore, Result, StoreError, TaskStore};
use crate::entity::entity_type::EntityType;
use crate::sync::{Checkpoint, SyncResult, SyncTask};

#[derive(Default)]
struct State {
    mappings: Vec<EntityMapping>,
    tasks: HashMap<Uuid, SyncTask>,
    results: Vec<SyncResult>,
    checkpoints: HashMap<Uuid, Checkpoint>,
}

/// In-process implementation of both stores.
///
/// Applies the same uniqueness rules as the database schema. State is lost
/// when the value drops.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn lookup_by_source(
        &self,
        entity_type: EntityType,
        source_id: &str,
    ) -> Result<Option<EntityMapping>> {
        Ok(self.with_state(|s| {
            s.mappings
                .iter()
                .find(|m| m.entity_type == entity_type && m.source_id == source_id)
                .cloned()
        }))
    }

    async fn lookup_by_target(
        &self,
        entity_type: EntityType,
        target_id: &str,
    ) -> Result<Option<EntityMapping>> {
        Ok(self.with_state(|s| {
            s.mappings
                .iter()
                .find(|m| m.entity_type == entity_type && m.target_id == target_id)
                .cloned()
        }))
    }

    async fn upsert(&self, mapping: EntityMapping) -> Result<EntityMapping> {
        self.with_state(|s| {
            let by_source = s
                .mappings
                .iter()
                .position(|m| {
                    m.entity_type == mapping.entity_type && m.source_id == mapping.source_id
                });
            let by_target = s
                .mappings
                .iter()
                .position(|m| {
                    m.entity_type == mapping.entity_type && m.target_id == mapping.target_id
                });

            match (by_source, by_target) {
                (Some(i), Some(j)) if i == j => {
                    let existing = &mut s.mappings[i];
                    if mapping.last_synced_at > existing.last_synced_at {
                        existing.last_synced_at = mapping.last_synced_at;
                    }
                    Ok(existing.clone())
                }
                (Some(i), _) => Err(StoreError::mapping_conflict(
                    mapping.entity_type,
                    &mapping.source_id,
                    &mapping.target_id,
                    format!("source already mapped to {}", s.mappings[i].target_id),
                )),
                (None, Some(j)) => Err(StoreError::mapping_conflict(
                    mapping.entity_type,
                    &mapping.source_id,
                    &mapping.target_id,
                    format!("target already mapped to {}", s.mappings[j].source_id),
                )),
                (None, None) => {
                    s.mappings.push(mapping.clone());
                    Ok(mapping)
                }
            }
        })
    }

    async fn count(&self, entity_type: EntityType) -> Result<u64> {
        Ok(self.with_state(|s| {
            s.mappings
                .iter()
                .filter(|m| m.entity_type == entity_type)
                .count() as u64
        }))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save_task(&self, task: &SyncTask) -> Result<()> {
        self.with_state(|s| {
            s.tasks.insert(task.id, task.clone());
        });
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<SyncTask>> {
        Ok(self.with_state(|s| s.tasks.get(&id).cloned()))
    }

    async fn list_tasks(&self, limit: u64) -> Result<Vec<SyncTask>> {
        Ok(self.with_state(|s| {
            let mut tasks: Vec<SyncTask> = s.tasks.values().cloned().collect();
            tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            tasks.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            tasks
        }))
    }

    async fn append_results(&self, results: &[SyncResult]) -> Result<()> {
        self.with_state(|s| s.results.extend_from_slice(results));
        Ok(())
    }

    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<SyncResult>> {
        Ok(self.with_state(|s| {
            s.results
                .iter()
                .filter(|r| r.task_id == task_id)
                .cloned()
                .collect()
        }))
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.with_state(|s| {
            s.checkpoints.insert(checkpoint.task_id, checkpoint.clone());
        });
        Ok(())
    }

    async fn load_checkpoint(&self, task_id: Uuid) -> Result<Option<Checkpoint>> {
        Ok(self.with_state(|s| s.checkpoints.get(&task_id).cloned()))
    }
}
