//! Platform-agnostic interfaces for the Source and Target systems.
//!
//! This module defines the [`PlatformClient`] trait every platform adapter
//! implements, the [`AuthProvider`] and [`Translator`] capabilities, and the
//! throttling wrapper that bounds outbound calls per platform.
//!
//! # Example
//!
//! ```ignore
//! use tandem::platform::{EntityFilter, Page, PlatformClient};
//!
//! async fn first_page<C: PlatformClient>(client: &C) -> Result<(), PlatformError> {
//!     let entities = client
//!         .fetch_entities(EntityType::Product, &EntityFilter::default(), Page::first(50))
//!         .await?;
//!     for entity in entities {
//!         println!("{} updated {}", entity.id, entity.updated_at);
//!     }
//!     Ok(())
//! }
//! ```

mod errors;
mod rate_limit;
#[cfg(feature = "http")]
mod rest;
mod translate;
mod types;

pub use errors::{PlatformError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, RateLimitConfig, RateLimitedClient, rate_limits};
#[cfg(feature = "http")]
pub use rest::RestPlatformClient;
pub use translate::{CatalogTranslator, EXTERNAL_REF_FIELD};
pub use types::{
    AuthProvider, EntityFilter, Page, Payload, PlatformClient, PlatformEntity,
    StaticTokenProvider, Translator,
};

pub use crate::sync::ProgressCallback;
