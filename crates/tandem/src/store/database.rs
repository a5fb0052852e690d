use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
    sea_query::{Alias, Expr, OnConflict},
};
use uuid::Uuid;

use super::{EntityMapping, MappingStore, Result, StoreError, TaskStore};
use crate::entity::entity_type::EntityType;
use crate::entity::{entity_mapping, sync_checkpoint, sync_result, sync_task};
use crate::sync::{Checkpoint, ErrorCode, SyncAction, SyncPhase, SyncResult, SyncTask};

/// sea-orm backed implementation of both stores.
///
/// Expects the schema created by the bundled migrations.
#[derive(Debug)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ─── Conversions ─────────────────────────────────────────────────────────────

fn mapping_from_model(model: entity_mapping::Model) -> EntityMapping {
    EntityMapping {
        id: model.id,
        entity_type: model.entity_type,
        source_id: model.source_id,
        target_id: model.target_id,
        last_synced_at: model.last_synced_at.with_timezone(&Utc),
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn mapping_active_model(mapping: &EntityMapping) -> entity_mapping::ActiveModel {
    entity_mapping::ActiveModel {
        id: Set(mapping.id),
        entity_type: Set(mapping.entity_type),
        source_id: Set(mapping.source_id.clone()),
        target_id: Set(mapping.target_id.clone()),
        last_synced_at: Set(mapping.last_synced_at.fixed_offset()),
        created_at: Set(mapping.created_at.fixed_offset()),
    }
}

fn task_active_model(task: &SyncTask) -> Result<sync_task::ActiveModel> {
    Ok(sync_task::ActiveModel {
        id: Set(task.id),
        status: Set(task.status),
        direction: Set(task.direction()),
        conflict_strategy: Set(task.conflict_strategy()),
        options: Set(serde_json::to_value(&task.options)?),
        counters: Set(serde_json::to_value(task.counters)?),
        errors: Set(serde_json::to_value(&task.errors)?),
        conflicts: Set(serde_json::to_value(&task.conflicts)?),
        recovered_from: Set(task.recovered_from),
        created_at: Set(task.created_at.fixed_offset()),
        started_at: Set(task.started_at.map(|t| t.fixed_offset())),
        updated_at: Set(task.updated_at.fixed_offset()),
        completed_at: Set(task.completed_at.map(|t| t.fixed_offset())),
    })
}

fn task_from_model(model: sync_task::Model) -> Result<SyncTask> {
    Ok(SyncTask {
        id: model.id,
        options: serde_json::from_value(model.options)?,
        status: model.status,
        counters: serde_json::from_value(model.counters)?,
        errors: serde_json::from_value(model.errors)?,
        conflicts: serde_json::from_value(model.conflicts)?,
        recovered_from: model.recovered_from,
        created_at: model.created_at.with_timezone(&Utc),
        started_at: model.started_at.map(|t| t.with_timezone(&Utc)),
        updated_at: model.updated_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn result_active_model(result: &SyncResult) -> sync_result::ActiveModel {
    sync_result::ActiveModel {
        id: Set(result.id),
        task_id: Set(result.task_id),
        entity_type: Set(result.entity_type),
        entity_id: Set(result.entity_id.clone()),
        action: Set(result.action.to_string()),
        success: Set(result.success),
        source_id: Set(result.source_id.clone()),
        target_id: Set(result.target_id.clone()),
        error_code: Set(result.error_code.map(|c| c.to_string())),
        created_at: Set(result.created_at.fixed_offset()),
    }
}

fn result_from_model(model: sync_result::Model) -> Result<SyncResult> {
    let action = model.action.parse::<SyncAction>().map_err(StoreError::corrupt)?;
    let error_code = model
        .error_code
        .as_deref()
        .map(str::parse::<ErrorCode>)
        .transpose()
        .map_err(StoreError::corrupt)?;

    Ok(SyncResult {
        id: model.id,
        task_id: model.task_id,
        entity_type: model.entity_type,
        entity_id: model.entity_id,
        action,
        success: model.success,
        source_id: model.source_id,
        target_id: model.target_id,
        error_code,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn checkpoint_active_model(checkpoint: &Checkpoint) -> Result<sync_checkpoint::ActiveModel> {
    Ok(sync_checkpoint::ActiveModel {
        task_id: Set(checkpoint.task_id),
        entity_type: Set(checkpoint.phase.entity_type),
        origin: Set(checkpoint.phase.origin),
        last_processed_entity_id: Set(checkpoint.last_processed_entity_id.clone()),
        counters: Set(serde_json::to_value(checkpoint.counters)?),
        updated_at: Set(checkpoint.updated_at.fixed_offset()),
    })
}

fn checkpoint_from_model(model: sync_checkpoint::Model) -> Result<Checkpoint> {
    Ok(Checkpoint {
        task_id: model.task_id,
        phase: SyncPhase {
            entity_type: model.entity_type,
            origin: model.origin,
        },
        last_processed_entity_id: model.last_processed_entity_id,
        counters: serde_json::from_value(model.counters)?,
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

// ─── Mapping store ───────────────────────────────────────────────────────────

/// ON CONFLICT clause for mapping upserts.
///
/// The `(entity_type, source_id)` key conflicts when the source id is already
/// mapped. Only an identical pair with an older `last_synced_at` is touched;
/// anything else is left alone and detected by the re-read that follows.
fn mapping_on_conflict(target_id: &str) -> OnConflict {
    use entity_mapping::{Column, Entity as EntityMappings};

    OnConflict::columns([Column::EntityType, Column::SourceId])
        .update_column(Column::LastSyncedAt)
        .action_and_where(
            Condition::all()
                .add(Expr::col((EntityMappings, Column::TargetId)).eq(target_id))
                .add(
                    Expr::col((EntityMappings, Column::LastSyncedAt))
                        .lt(Expr::col((Alias::new("excluded"), Column::LastSyncedAt))),
                )
                .into(),
        )
        .to_owned()
}

#[async_trait]
impl MappingStore for DatabaseStore {
    async fn lookup_by_source(
        &self,
        entity_type: EntityType,
        source_id: &str,
    ) -> Result<Option<EntityMapping>> {
        use entity_mapping::{Column, Entity as EntityMappings};

        let model = EntityMappings::find()
            .filter(Column::EntityType.eq(entity_type))
            .filter(Column::SourceId.eq(source_id))
            .one(&self.db)
            .await?;
        Ok(model.map(mapping_from_model))
    }

    async fn lookup_by_target(
        &self,
        entity_type: EntityType,
        target_id: &str,
    ) -> Result<Option<EntityMapping>> {
        use entity_mapping::{Column, Entity as EntityMappings};

        let model = EntityMappings::find()
            .filter(Column::EntityType.eq(entity_type))
            .filter(Column::TargetId.eq(target_id))
            .one(&self.db)
            .await?;
        Ok(model.map(mapping_from_model))
    }

    async fn upsert(&self, mapping: EntityMapping) -> Result<EntityMapping> {
        use entity_mapping::Entity as EntityMappings;

        let inserted = EntityMappings::insert(mapping_active_model(&mapping))
            .on_conflict(mapping_on_conflict(&mapping.target_id))
            .exec_without_returning(&self.db)
            .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // The source key is handled by ON CONFLICT, so this is the target key.
                let holder = self
                    .lookup_by_target(mapping.entity_type, &mapping.target_id)
                    .await?
                    .map(|m| m.source_id)
                    .unwrap_or_default();
                return Err(StoreError::mapping_conflict(
                    mapping.entity_type,
                    &mapping.source_id,
                    &mapping.target_id,
                    format!("target already mapped to {holder}"),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let stored = self
            .lookup_by_source(mapping.entity_type, &mapping.source_id)
            .await?
            .ok_or_else(|| {
                StoreError::corrupt(format!(
                    "mapping for {} {} vanished after upsert",
                    mapping.entity_type, mapping.source_id
                ))
            })?;

        if stored.target_id != mapping.target_id {
            return Err(StoreError::mapping_conflict(
                mapping.entity_type,
                &mapping.source_id,
                &mapping.target_id,
                format!("source already mapped to {}", stored.target_id),
            ));
        }

        Ok(stored)
    }

    async fn count(&self, entity_type: EntityType) -> Result<u64> {
        use entity_mapping::{Column, Entity as EntityMappings};

        Ok(EntityMappings::find()
            .filter(Column::EntityType.eq(entity_type))
            .count(&self.db)
            .await?)
    }
}

// ─── Task store ──────────────────────────────────────────────────────────────

#[async_trait]
impl TaskStore for DatabaseStore {
    async fn save_task(&self, task: &SyncTask) -> Result<()> {
        use sync_task::{Column, Entity as SyncTasks};

        SyncTasks::insert(task_active_model(task)?)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::Status,
                        Column::Direction,
                        Column::ConflictStrategy,
                        Column::Options,
                        Column::Counters,
                        Column::Errors,
                        Column::Conflicts,
                        Column::RecoveredFrom,
                        Column::StartedAt,
                        Column::UpdatedAt,
                        Column::CompletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<SyncTask>> {
        use sync_task::Entity as SyncTasks;

        SyncTasks::find_by_id(id)
            .one(&self.db)
            .await?
            .map(task_from_model)
            .transpose()
    }

    async fn list_tasks(&self, limit: u64) -> Result<Vec<SyncTask>> {
        use sync_task::{Column, Entity as SyncTasks};

        SyncTasks::find()
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(task_from_model)
            .collect()
    }

    async fn append_results(&self, results: &[SyncResult]) -> Result<()> {
        use sync_result::Entity as SyncResults;

        if results.is_empty() {
            return Ok(());
        }

        SyncResults::insert_many(results.iter().map(result_active_model))
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<SyncResult>> {
        use sync_result::{Column, Entity as SyncResults};

        SyncResults::find()
            .filter(Column::TaskId.eq(task_id))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(result_from_model)
            .collect()
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        use sync_checkpoint::{Column, Entity as SyncCheckpoints};

        SyncCheckpoints::insert(checkpoint_active_model(checkpoint)?)
            .on_conflict(
                OnConflict::column(Column::TaskId)
                    .update_columns([
                        Column::EntityType,
                        Column::Origin,
                        Column::LastProcessedEntityId,
                        Column::Counters,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn load_checkpoint(&self, task_id: Uuid) -> Result<Option<Checkpoint>> {
        use sync_checkpoint::Entity as SyncCheckpoints;

        SyncCheckpoints::find_by_id(task_id)
            .one(&self.db)
            .await?
            .map(checkpoint_from_model)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::platform_side::PlatformSide;
    use crate::sync::{SkipReason, SyncOptions, TaskCounters};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[test]
    fn task_round_trips_through_model() {
        let mut task = SyncTask::new(SyncOptions::default());
        task.counters.processed = 7;
        task.started_at = Some(Utc::now());

        let active = task_active_model(&task).unwrap();
        let model = sync_task::Model {
            id: active.id.unwrap(),
            status: active.status.unwrap(),
            direction: active.direction.unwrap(),
            conflict_strategy: active.conflict_strategy.unwrap(),
            options: active.options.unwrap(),
            counters: active.counters.unwrap(),
            errors: active.errors.unwrap(),
            conflicts: active.conflicts.unwrap(),
            recovered_from: active.recovered_from.unwrap(),
            created_at: active.created_at.unwrap(),
            started_at: active.started_at.unwrap(),
            updated_at: active.updated_at.unwrap(),
            completed_at: active.completed_at.unwrap(),
        };
        assert_eq!(task_from_model(model).unwrap(), task);
    }

    #[test]
    fn result_with_unknown_action_is_corrupt() {
        let model = sync_result::Model {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            entity_type: EntityType::Product,
            entity_id: "p-1".to_string(),
            action: "teleport".to_string(),
            success: true,
            source_id: None,
            target_id: None,
            error_code: None,
            created_at: Utc::now().fixed_offset(),
        };
        assert!(matches!(
            result_from_model(model),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn result_columns_use_textual_codes() {
        let result = SyncResult::new(Uuid::new_v4(), EntityType::Order, "o-1")
            .with_action(SyncAction::Skip(SkipReason::AlreadyMapped))
            .failed(ErrorCode::RateLimited);
        let active = result_active_model(&result);
        assert_eq!(active.action.unwrap(), "skip:already_mapped");
        assert_eq!(active.error_code.unwrap().as_deref(), Some("RATE_LIMITED"));
    }

    #[tokio::test]
    async fn lookup_by_source_maps_row() {
        let now = Utc::now().fixed_offset();
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![entity_mapping::Model {
                id: Uuid::new_v4(),
                entity_type: EntityType::Product,
                source_id: "s-1".to_string(),
                target_id: "t-1".to_string(),
                last_synced_at: now,
                created_at: now,
            }]])
            .into_connection();
        let store = DatabaseStore::new(db);

        let mapping = store
            .lookup_by_source(EntityType::Product, "s-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.target_id, "t-1");
        assert_eq!(mapping.last_synced_at, now.with_timezone(&Utc));
    }

    #[tokio::test]
    async fn upsert_reports_conflict_when_source_has_other_target() {
        let now = Utc::now().fixed_offset();
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 0,
                last_insert_id: 0,
            }])
            .append_query_results([vec![entity_mapping::Model {
                id: Uuid::new_v4(),
                entity_type: EntityType::Product,
                source_id: "s-1".to_string(),
                target_id: "t-9".to_string(),
                last_synced_at: now,
                created_at: now,
            }]])
            .into_connection();
        let store = DatabaseStore::new(db);

        let err = store
            .upsert(EntityMapping::new(EntityType::Product, "s-1", "t-1", Utc::now()))
            .await
            .unwrap_err();
        assert!(err.is_mapping_conflict());
        assert!(err.to_string().contains("t-9"));
    }

    #[tokio::test]
    async fn append_results_skips_empty_batches() {
        // No exec results queued: any statement would fail.
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let store = DatabaseStore::new(db);
        store.append_results(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn load_checkpoint_decodes_counters() {
        let task_id = Uuid::new_v4();
        let counters = TaskCounters {
            entity_count: 25,
            processed: 10,
            succeeded: 10,
            created: 10,
            ..TaskCounters::default()
        };
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![sync_checkpoint::Model {
                task_id,
                entity_type: EntityType::Order,
                origin: PlatformSide::Target,
                last_processed_entity_id: Some("o-10".to_string()),
                counters: serde_json::to_value(counters).unwrap(),
                updated_at: Utc::now().fixed_offset(),
            }]])
            .into_connection();
        let store = DatabaseStore::new(db);

        let checkpoint = store.load_checkpoint(task_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.counters, counters);
        assert_eq!(checkpoint.phase.origin, PlatformSide::Target);
        assert_eq!(checkpoint.last_processed_entity_id.as_deref(), Some("o-10"));
    }
}
