//! Tandem - bidirectional entity synchronization between two platforms.
//!
//! Products and orders are reconciled between a "Source" and a "Target"
//! platform that each have their own identifiers, rate limits and update
//! cadence. The engine keeps a durable identity mapping, resolves conflicting
//! edits, runs rate-limited batches with per-entity failure isolation and
//! checkpoints every batch so interrupted runs can resume.
//!
//! # Features
//!
//! - `sqlite` / `postgres` - Database backends for [`store::DatabaseStore`].
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `http` - [`platform::RestPlatformClient`] over reqwest.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem::{connect_and_migrate, SyncOptions, SyncOrchestrator};
//! use tandem::platform::CatalogTranslator;
//! use tandem::store::DatabaseStore;
//!
//! let db = connect_and_migrate("sqlite://tandem.db?mode=rwc").await?;
//!
//! let orchestrator = SyncOrchestrator::builder()
//!     .source(source)
//!     .target(target)
//!     .translator(Arc::new(CatalogTranslator::new()))
//!     .store(Arc::new(DatabaseStore::new(db)))
//!     .build()?;
//!
//! let task = orchestrator.start_sync(SyncOptions::default()).await?.wait().await?;
//! ```

pub mod db;
pub mod entity;
pub mod http;
pub mod platform;
pub mod retry;
pub mod store;
pub mod sync;
pub mod testing;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use platform::{
    ApiRateLimiter, AuthProvider, CatalogTranslator, PlatformClient, PlatformEntity,
    PlatformError, RateLimitConfig, RateLimitedClient, Translator,
};
pub use retry::RetryPolicy;
pub use store::{DatabaseStore, EntityMapping, MemoryStore, StoreError};
pub use sync::{
    SyncEngineError, SyncOptions, SyncOrchestrator, SyncProgress, SyncResult, SyncTask,
    TaskHandle,
};
