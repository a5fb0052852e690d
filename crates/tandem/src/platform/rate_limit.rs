use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::entity::entity_type::EntityType;

use super::errors::{PlatformError, Result};
use super::types::{EntityFilter, Page, Payload, PlatformClient, PlatformEntity};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default per-platform limits.
pub mod rate_limits {
    /// Sustained request rate.
    pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 600;
    /// Requests that may be issued back to back before throttling starts.
    pub const DEFAULT_BURST: u32 = 10;
    /// Outbound calls allowed in flight at once.
    pub const DEFAULT_MAX_CONCURRENT: usize = 8;
    /// Timeout of a single outbound call.
    pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
}

/// Limits applied to one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub max_concurrent: usize,
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: rate_limits::DEFAULT_REQUESTS_PER_MINUTE,
            burst: rate_limits::DEFAULT_BURST,
            max_concurrent: rate_limits::DEFAULT_MAX_CONCURRENT,
            call_timeout: Duration::from_secs(rate_limits::DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Token-bucket throttle plus an in-flight cap for one platform.
///
/// Clones share the same bucket and permits, so every task that talks to a
/// platform draws from the same budget.
///
/// # Example
///
/// ```ignore
/// use tandem::platform::{ApiRateLimiter, RateLimitConfig};
///
/// let limiter = ApiRateLimiter::new(&RateLimitConfig::default());
///
/// // Before each API call:
/// let _permit = limiter.acquire().await?;
/// client.fetch_entities(entity_type, &filter, page).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    bucket: Arc<GovernorRateLimiter>,
    permits: Arc<Semaphore>,
}

impl ApiRateLimiter {
    /// Create a limiter from `config`. Zero values are raised to 1.
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            bucket: Arc::new(RateLimiter::direct(quota)),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Wait for an in-flight slot, then for a token.
    ///
    /// The returned permit holds the slot until dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PlatformError::internal("rate limiter closed"))?;
        self.bucket.until_ready().await;
        Ok(permit)
    }

    /// Number of in-flight slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A rate-limited wrapper around any `PlatformClient`.
///
/// Every call waits for the limiter, then runs under its own timeout. A
/// timeout surfaces as [`PlatformError::Timeout`], which the retry policy
/// treats as transient.
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: ApiRateLimiter,
    call_timeout: Duration,
}

impl<C> RateLimitedClient<C> {
    pub fn new(inner: C, config: &RateLimitConfig) -> Self {
        Self::with_limiter(inner, ApiRateLimiter::new(config), config.call_timeout)
    }

    /// Wrap `inner` with an existing (possibly shared) limiter.
    pub fn with_limiter(inner: C, limiter: ApiRateLimiter, call_timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            call_timeout,
        }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn limiter(&self) -> &ApiRateLimiter {
        &self.limiter
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let _permit = self.limiter.acquire().await?;
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl<C: PlatformClient> PlatformClient for RateLimitedClient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<PlatformEntity>> {
        self.guarded(self.inner.fetch_entities(entity_type, filter, page))
            .await
    }

    async fn get_entity_by_id(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<PlatformEntity>> {
        self.guarded(self.inner.get_entity_by_id(entity_type, id))
            .await
    }

    async fn create_entity(
        &self,
        entity_type: EntityType,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        self.guarded(self.inner.create_entity(entity_type, payload))
            .await
    }

    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        self.guarded(self.inner.update_entity(entity_type, id, payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryPlatform;

    fn config(max_concurrent: usize, timeout_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: 60_000,
            burst: 1_000,
            max_concurrent,
            call_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn default_config_uses_constants() {
        let config = RateLimitConfig::default();
        assert_eq!(
            config.requests_per_minute,
            rate_limits::DEFAULT_REQUESTS_PER_MINUTE
        );
        assert_eq!(config.max_concurrent, rate_limits::DEFAULT_MAX_CONCURRENT);
    }

    #[tokio::test]
    async fn acquire_holds_slot_until_permit_dropped() {
        let limiter = ApiRateLimiter::new(&config(2, 1_000));
        assert_eq!(limiter.available_slots(), 2);

        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available_slots(), 0);

        drop(first);
        assert_eq!(limiter.available_slots(), 1);
    }

    #[tokio::test]
    async fn zero_concurrency_is_raised_to_one() {
        let limiter = ApiRateLimiter::new(&config(0, 1_000));
        assert_eq!(limiter.available_slots(), 1);
    }

    #[tokio::test]
    async fn clones_share_the_same_slots() {
        let limiter = ApiRateLimiter::new(&config(1, 1_000));
        let clone = limiter.clone();
        let _permit = limiter.acquire().await.unwrap();
        assert_eq!(clone.available_slots(), 0);
    }

    #[tokio::test]
    async fn rate_limited_client_delegates_calls() {
        let platform = MemoryPlatform::new("source");
        platform.insert(EntityType::Product, "p-1", Payload::new());
        let client = RateLimitedClient::new(platform, &config(4, 1_000));

        let found = client
            .get_entity_by_id(EntityType::Product, "p-1")
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some("p-1".to_string()));
        assert_eq!(client.name(), "source");
        assert_eq!(client.inner().calls().get, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient_error() {
        let platform = MemoryPlatform::new("target").with_write_delay(Duration::from_secs(5));
        let client = RateLimitedClient::new(platform, &config(4, 100));

        let err = client
            .create_entity(EntityType::Product, &Payload::new())
            .await
            .expect_err("call should time out");
        assert_eq!(err, PlatformError::Timeout { after_ms: 100 });
        assert!(err.is_retryable());
    }
}
