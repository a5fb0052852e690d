use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::entity_type::EntityType;

use super::errors::Result;

/// Field map of a record in one platform's own wire format.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A record as returned by a platform (platform-agnostic envelope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEntity {
    /// Identifier in the owning platform's id space.
    pub id: String,
    pub entity_type: EntityType,
    /// Last modification time as reported by the platform.
    pub updated_at: DateTime<Utc>,
    /// Business fields in the platform's format.
    #[serde(default)]
    pub fields: Payload,
}

impl PlatformEntity {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        entity_type: EntityType,
        updated_at: DateTime<Utc>,
        fields: Payload,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            updated_at,
            fields,
        }
    }

    /// Look up a string field.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// One page of a paginated listing. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub per_page: u32,
}

impl Page {
    #[must_use]
    pub fn first(per_page: u32) -> Self {
        Self {
            number: 1,
            per_page,
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            number: self.number + 1,
            per_page: self.per_page,
        }
    }

    /// Zero-based offset of the first record on this page.
    #[must_use]
    pub fn offset(self) -> usize {
        (self.number.saturating_sub(1) as usize) * self.per_page as usize
    }
}

/// Restricts which records a listing returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Only records modified at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_since: Option<DateTime<Utc>>,
    /// Extra platform-specific query parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl EntityFilter {
    #[must_use]
    pub fn matches(&self, entity: &PlatformEntity) -> bool {
        self.updated_since
            .is_none_or(|since| entity.updated_at >= since)
    }
}

/// Trait for Source and Target platform clients.
///
/// # Implementation Notes
///
/// Implementors should:
/// - Return one page per `fetch_entities` call, in a stable order
/// - Return `Ok(None)` from `get_entity_by_id` when the record does not exist
/// - Convert transport and HTTP failures to `PlatformError`
///
/// Retries, throttling and per-call timeouts are layered on top by the
/// engine and by [`RateLimitedClient`](super::RateLimitedClient).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Short name used in logs and progress output.
    fn name(&self) -> &str;

    /// Fetch one page of records of `entity_type`.
    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<PlatformEntity>>;

    /// Fetch a single record.
    async fn get_entity_by_id(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<PlatformEntity>>;

    /// Create a record and return it with its new identifier.
    async fn create_entity(
        &self,
        entity_type: EntityType,
        payload: &Payload,
    ) -> Result<PlatformEntity>;

    /// Replace the fields of an existing record.
    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &Payload,
    ) -> Result<PlatformEntity>;
}

/// Source of bearer credentials for a platform.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current access token.
    async fn access_token(&self) -> Result<String>;

    /// Refresh the credential if the provider is able to.
    ///
    /// Called once after a platform rejects a request with 401.
    async fn refresh_if_needed(&self) -> Result<()>;
}

/// An [`AuthProvider`] with a fixed, pre-issued token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn refresh_if_needed(&self) -> Result<()> {
        // Nothing to refresh; the retry after this call surfaces a second 401.
        Ok(())
    }
}

/// Converts business fields between the Source and Target formats.
///
/// Implementations must be pure: no I/O, same input gives same output.
pub trait Translator: Send + Sync {
    /// Build a Target-format payload from a Source record.
    fn to_target_format(&self, source: &PlatformEntity) -> Result<Payload>;

    /// Build a Source-format payload from a Target record.
    fn to_source_format(&self, target: &PlatformEntity) -> Result<Payload>;
}
