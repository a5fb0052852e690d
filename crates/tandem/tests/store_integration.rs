//! Integration tests for the database-backed stores.
//!
//! Run against a migrated in-memory SQLite database so the unique indexes
//! and the conditional upsert are exercised for real.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use chrono::{Duration, Utc};
use tandem::connect_and_migrate;
use tandem::entity::prelude::{EntityType, PlatformSide, TaskStatus};
use tandem::store::{DatabaseStore, EntityMapping, MappingStore, StoreError, TaskStore};
use tandem::sync::{
    Checkpoint, ErrorCode, SyncAction, SyncOptions, SyncPhase, SyncResult, SyncTask,
};

async fn setup_store() -> DatabaseStore {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    DatabaseStore::new(db)
}

#[tokio::test]
async fn test_upsert_inserts_and_looks_up_both_ways() {
    let store = setup_store().await;
    let at = Utc::now();

    let stored = store
        .upsert(EntityMapping::new(EntityType::Product, "p-1", "t-1", at))
        .await
        .unwrap();

    let by_source = store
        .lookup_by_source(EntityType::Product, "p-1")
        .await
        .unwrap()
        .unwrap();
    let by_target = store
        .lookup_by_target(EntityType::Product, "t-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_source.id, stored.id);
    assert_eq!(by_target.id, stored.id);
    assert!(
        store
            .lookup_by_source(EntityType::Order, "p-1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_upsert_only_moves_last_synced_forward() {
    let store = setup_store().await;
    let at = Utc::now();
    let first = store
        .upsert(EntityMapping::new(EntityType::Product, "p-1", "t-1", at))
        .await
        .unwrap();

    let older = store
        .upsert(EntityMapping::new(
            EntityType::Product,
            "p-1",
            "t-1",
            at - Duration::minutes(5),
        ))
        .await
        .unwrap();
    assert_eq!(older.id, first.id);
    assert_eq!(older.last_synced_at.timestamp_millis(), at.timestamp_millis());

    let newer = store
        .upsert(EntityMapping::new(
            EntityType::Product,
            "p-1",
            "t-1",
            at + Duration::minutes(5),
        ))
        .await
        .unwrap();
    assert_eq!(newer.id, first.id);
    assert!(newer.last_synced_at > at);
    assert_eq!(store.count(EntityType::Product).await.unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_rejects_remapping_either_side() {
    let store = setup_store().await;
    let at = Utc::now();
    store
        .upsert(EntityMapping::new(EntityType::Order, "o-1", "t-1", at))
        .await
        .unwrap();

    let err = store
        .upsert(EntityMapping::new(EntityType::Order, "o-1", "t-2", at))
        .await
        .unwrap_err();
    assert!(err.is_mapping_conflict(), "{err}");

    let err = store
        .upsert(EntityMapping::new(EntityType::Order, "o-2", "t-1", at))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MappingConflict { .. }), "{err}");

    // The same identifiers are free under another entity type.
    store
        .upsert(EntityMapping::new(EntityType::Product, "o-1", "t-2", at))
        .await
        .unwrap();
    assert_eq!(store.count(EntityType::Order).await.unwrap(), 1);
}

#[tokio::test]
async fn test_tasks_results_and_checkpoints_round_trip() {
    let store = setup_store().await;

    let mut older = SyncTask::new(SyncOptions::default());
    older.created_at = Utc::now() - Duration::hours(1);
    store.save_task(&older).await.unwrap();

    let mut task = SyncTask::new(SyncOptions {
        entity_types: vec![EntityType::Order, EntityType::Product],
        ..SyncOptions::default()
    });
    store.save_task(&task).await.unwrap();
    task.status = TaskStatus::InProgress;
    task.counters.entity_count = 2;
    store.save_task(&task).await.unwrap();

    let listed = store.list_tasks(10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, task.id);
    assert_eq!(listed[0].status, TaskStatus::InProgress);
    assert_eq!(listed[0].options.entity_types, task.options.entity_types);

    let results = vec![
        SyncResult::new(task.id, EntityType::Order, "o-1")
            .with_action(SyncAction::CreateInTarget)
            .with_ids(Some("o-1".to_string()), Some("t-1".to_string())),
        SyncResult::new(task.id, EntityType::Order, "o-2")
            .with_action(SyncAction::CreateInTarget)
            .failed(ErrorCode::Permanent),
    ];
    store.append_results(&results).await.unwrap();
    store.append_results(&[]).await.unwrap();
    let loaded = store.results_for_task(task.id).await.unwrap();
    assert_eq!(loaded.len(), 2);
    let failed = loaded.iter().find(|r| r.entity_id == "o-2").unwrap();
    assert_eq!(failed.error_code, Some(ErrorCode::Permanent));
    assert!(!failed.success);
    let created = loaded.iter().find(|r| r.entity_id == "o-1").unwrap();
    assert_eq!(created.target_id.as_deref(), Some("t-1"));

    let mut checkpoint = Checkpoint {
        task_id: task.id,
        phase: SyncPhase {
            entity_type: EntityType::Order,
            origin: PlatformSide::Source,
        },
        last_processed_entity_id: Some("o-2".to_string()),
        counters: task.counters,
        updated_at: Utc::now(),
    };
    store.save_checkpoint(&checkpoint).await.unwrap();
    checkpoint.phase.entity_type = EntityType::Product;
    checkpoint.last_processed_entity_id = None;
    store.save_checkpoint(&checkpoint).await.unwrap();

    let loaded = store.load_checkpoint(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.phase, checkpoint.phase);
    assert_eq!(loaded.last_processed_entity_id, None);
    assert!(store.load_checkpoint(older.id).await.unwrap().is_none());
}
