//! In-memory platform double for tests and local experiments.
//!
//! [`MemoryPlatform`] implements [`PlatformClient`] over a shared map, counts
//! every call and can be told to fail upcoming calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::entity_type::EntityType;
use crate::platform::{
    EntityFilter, Page, Payload, PlatformClient, PlatformEntity, PlatformError, Result,
};

/// Kind of call, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Fetch,
    Get,
    Create,
    Update,
}

/// Number of calls made, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
}

impl CallCounts {
    /// Creates plus updates.
    pub fn writes(&self) -> usize {
        self.create + self.update
    }
}

#[derive(Default)]
struct Inner {
    entities: HashMap<EntityType, Vec<PlatformEntity>>,
    calls: CallCounts,
    failures: HashMap<CallKind, Vec<PlatformError>>,
    next_id: u64,
}

impl Inner {
    fn record(&mut self, kind: CallKind) -> Result<()> {
        match kind {
            CallKind::Fetch => self.calls.fetch += 1,
            CallKind::Get => self.calls.get += 1,
            CallKind::Create => self.calls.create += 1,
            CallKind::Update => self.calls.update += 1,
        }
        match self.failures.get_mut(&kind) {
            Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
            _ => Ok(()),
        }
    }

    fn upsert(&mut self, entity: PlatformEntity) {
        let list = self.entities.entry(entity.entity_type).or_default();
        match list.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => list.push(entity),
        }
    }
}

/// A platform that lives in memory.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Clone)]
pub struct MemoryPlatform {
    name: String,
    write_delay: Duration,
    ack_delay: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryPlatform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            write_delay: Duration::ZERO,
            ack_delay: Duration::ZERO,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Delay every create and update by `delay`.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Hold back the reply to every create and update by `delay` after the
    /// write is already visible to readers.
    #[must_use]
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a record, stamped with the current time.
    pub fn insert(&self, entity_type: EntityType, id: &str, fields: Payload) {
        self.insert_at(entity_type, id, fields, Utc::now());
    }

    /// Insert or replace a record with an explicit modification time.
    pub fn insert_at(
        &self,
        entity_type: EntityType,
        id: &str,
        fields: Payload,
        updated_at: DateTime<Utc>,
    ) {
        self.lock()
            .upsert(PlatformEntity::new(id, entity_type, updated_at, fields));
    }

    /// All records of a type, in insertion order.
    pub fn entities(&self, entity_type: EntityType) -> Vec<PlatformEntity> {
        self.lock()
            .entities
            .get(&entity_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<PlatformEntity> {
        self.lock()
            .entities
            .get(&entity_type)
            .and_then(|list| list.iter().find(|e| e.id == id).cloned())
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Make the next `times` calls of `kind` fail with `error`.
    pub fn fail_next(&self, kind: CallKind, times: usize, error: PlatformError) {
        self.lock()
            .failures
            .entry(kind)
            .or_default()
            .extend(std::iter::repeat_n(error, times));
    }

    async fn write_pause(&self) {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
    }

    async fn ack_pause(&self) {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
    }
}

#[async_trait]
impl PlatformClient for MemoryPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<PlatformEntity>> {
        let mut inner = self.lock();
        inner.record(CallKind::Fetch)?;
        Ok(inner
            .entities
            .get(&entity_type)
            .map(|list| {
                list.iter()
                    .filter(|e| filter.matches(e))
                    .skip(page.offset())
                    .take(page.per_page as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_entity_by_id(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<PlatformEntity>> {
        self.lock().record(CallKind::Get)?;
        Ok(self.get(entity_type, id))
    }

    async fn create_entity(
        &self,
        entity_type: EntityType,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        self.lock().record(CallKind::Create)?;
        self.write_pause().await;

        let entity = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let entity = PlatformEntity::new(
                format!("{}-{}", self.name, inner.next_id),
                entity_type,
                Utc::now(),
                payload.clone(),
            );
            inner.upsert(entity.clone());
            entity
        };
        self.ack_pause().await;
        Ok(entity)
    }

    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        self.lock().record(CallKind::Update)?;
        self.write_pause().await;

        let entity = {
            let mut inner = self.lock();
            let exists = inner
                .entities
                .get(&entity_type)
                .is_some_and(|list| list.iter().any(|e| e.id == id));
            if !exists {
                return Err(PlatformError::permanent(
                    404,
                    format!("{entity_type} {id} not found"),
                ));
            }
            let entity = PlatformEntity::new(id, entity_type, Utc::now(), payload.clone());
            inner.upsert(entity.clone());
            entity
        };
        self.ack_pause().await;
        Ok(entity)
    }
}
