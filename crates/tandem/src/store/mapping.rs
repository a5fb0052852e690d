use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{KeyedLocks, MappingStore, Result};
use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;

/// A persisted correspondence between a Source and a Target entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub source_id: String,
    pub target_id: String,
    /// Timestamp of the last successful write through this mapping.
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl EntityMapping {
    pub fn new(
        entity_type: EntityType,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        last_synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            source_id: source_id.into(),
            target_id: target_id.into(),
            last_synced_at,
            created_at: Utc::now(),
        }
    }

    /// Build a mapping from an id on `side` and its counterpart on the other side.
    pub fn between(
        entity_type: EntityType,
        side: PlatformSide,
        id: impl Into<String>,
        counterpart_id: impl Into<String>,
        last_synced_at: DateTime<Utc>,
    ) -> Self {
        match side {
            PlatformSide::Source => Self::new(entity_type, id, counterpart_id, last_synced_at),
            PlatformSide::Target => Self::new(entity_type, counterpart_id, id, last_synced_at),
        }
    }

    /// The id this mapping holds for `side`.
    pub fn id_on(&self, side: PlatformSide) -> &str {
        match side {
            PlatformSide::Source => &self.source_id,
            PlatformSide::Target => &self.target_id,
        }
    }
}

/// Lock key: one entity on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub entity_type: EntityType,
    pub side: PlatformSide,
    pub id: String,
}

/// Exclusive hold on a [`MappingKey`]. Released on drop.
#[derive(Debug)]
pub struct MappingGuard {
    key: MappingKey,
    _guard: OwnedMutexGuard<()>,
}

impl MappingGuard {
    pub fn key(&self) -> &MappingKey {
        &self.key
    }
}

/// Exclusive right to create unmapped entities of one type. Released on drop.
#[derive(Debug)]
pub struct CreateGuard {
    entity_type: EntityType,
    _guard: OwnedMutexGuard<()>,
}

impl CreateGuard {
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }
}

/// Mapping index with per-entity serialization.
///
/// Callers take [`lock`](Self::lock) around a whole lookup-write-record
/// sequence so that two workers reconciling the same entity cannot both
/// decide to create it.
///
/// The entity lock only covers one side's id. A pass reading the other
/// platform sees the counterpart under a different key, so creates also go
/// through [`lock_creates`](Self::lock_creates): whoever holds it looks the
/// mapping up again before writing, and records the mapping before letting
/// go. Take the entity lock first; never take an entity lock while holding
/// the create lock.
pub struct EntityMappingStore {
    backend: Arc<dyn MappingStore>,
    locks: KeyedLocks<MappingKey>,
    creates: KeyedLocks<EntityType>,
}

impl EntityMappingStore {
    pub fn new(backend: Arc<dyn MappingStore>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
            creates: KeyedLocks::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn MappingStore> {
        &self.backend
    }

    /// Wait for exclusive access to one entity.
    pub async fn lock(
        &self,
        entity_type: EntityType,
        side: PlatformSide,
        id: &str,
    ) -> MappingGuard {
        let key = MappingKey {
            entity_type,
            side,
            id: id.to_string(),
        };
        let guard = self.locks.lock(key.clone()).await;
        MappingGuard { key, _guard: guard }
    }

    /// Wait for the right to create an unmapped `entity_type` entity.
    pub async fn lock_creates(&self, entity_type: EntityType) -> CreateGuard {
        let guard = self.creates.lock(entity_type).await;
        CreateGuard {
            entity_type,
            _guard: guard,
        }
    }

    /// Find the mapping holding `id` on `side`.
    pub async fn lookup(
        &self,
        entity_type: EntityType,
        side: PlatformSide,
        id: &str,
    ) -> Result<Option<EntityMapping>> {
        match side {
            PlatformSide::Source => self.backend.lookup_by_source(entity_type, id).await,
            PlatformSide::Target => self.backend.lookup_by_target(entity_type, id).await,
        }
    }

    pub async fn lookup_by_source(
        &self,
        entity_type: EntityType,
        source_id: &str,
    ) -> Result<Option<EntityMapping>> {
        self.backend.lookup_by_source(entity_type, source_id).await
    }

    pub async fn lookup_by_target(
        &self,
        entity_type: EntityType,
        target_id: &str,
    ) -> Result<Option<EntityMapping>> {
        self.backend.lookup_by_target(entity_type, target_id).await
    }

    pub async fn upsert(&self, mapping: EntityMapping) -> Result<EntityMapping> {
        self.backend.upsert(mapping).await
    }

    pub async fn count(&self, entity_type: EntityType) -> Result<u64> {
        self.backend.count(entity_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn between_orients_ids_by_side() {
        let now = Utc::now();
        let a = EntityMapping::between(EntityType::Order, PlatformSide::Source, "s", "t", now);
        let b = EntityMapping::between(EntityType::Order, PlatformSide::Target, "t", "s", now);
        assert_eq!((a.source_id.as_str(), a.target_id.as_str()), ("s", "t"));
        assert_eq!((b.source_id.as_str(), b.target_id.as_str()), ("s", "t"));
        assert_eq!(b.id_on(PlatformSide::Target), "t");
        assert_eq!(b.id_on(PlatformSide::Source), "s");
    }

    #[tokio::test]
    async fn lookup_dispatches_on_side() {
        let store = EntityMappingStore::new(Arc::new(MemoryStore::new()));
        store
            .upsert(EntityMapping::new(EntityType::Product, "s-1", "t-1", Utc::now()))
            .await
            .unwrap();

        let by_source = store
            .lookup(EntityType::Product, PlatformSide::Source, "s-1")
            .await
            .unwrap()
            .unwrap();
        let by_target = store
            .lookup(EntityType::Product, PlatformSide::Target, "t-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_source, by_target);

        assert!(store
            .lookup(EntityType::Product, PlatformSide::Target, "s-1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .lookup(EntityType::Order, PlatformSide::Source, "s-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lock_keys_are_scoped_by_side() {
        let store = EntityMappingStore::new(Arc::new(MemoryStore::new()));
        let held = store.lock(EntityType::Product, PlatformSide::Source, "x").await;
        assert_eq!(held.key().id, "x");

        // Same id on the other side is a different entity.
        let other = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.lock(EntityType::Product, PlatformSide::Target, "x"),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn create_lock_spans_both_sides_of_a_type() {
        let store = Arc::new(EntityMappingStore::new(Arc::new(MemoryStore::new())));
        let _source_entity = store
            .lock(EntityType::Product, PlatformSide::Source, "s-1")
            .await;
        let creating = store.lock_creates(EntityType::Product).await;
        assert_eq!(creating.entity_type(), EntityType::Product);

        // A pass from the other side holds a different entity key but must
        // still wait for the create in flight.
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let _target_entity =
                    store.lock(EntityType::Product, PlatformSide::Target, "t-1").await;
                let _creating = store.lock_creates(EntityType::Product).await;
                store
                    .lookup(EntityType::Product, PlatformSide::Target, "t-1")
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        store
            .upsert(EntityMapping::new(EntityType::Product, "s-1", "t-1", Utc::now()))
            .await
            .unwrap();
        drop(creating);

        let seen = waiter.await.expect("task should not panic");
        assert_eq!(seen.map(|m| m.source_id), Some("s-1".to_string()));

        // Other types are not held up.
        let orders = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.lock_creates(EntityType::Order),
        )
        .await;
        assert!(orders.is_ok());
    }
}
