//! Sync task options and engine-wide constants.

use serde::{Deserialize, Serialize};

use crate::entity::conflict_strategy::ConflictStrategy;
use crate::entity::entity_type::EntityType;
use crate::entity::sync_direction::SyncDirection;
use crate::platform::EntityFilter;

/// Default number of entities per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default page size when listing entities.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default number of retries per outbound call.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default base delay of the retry backoff, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Upper bound on `retry_count`.
pub const MAX_RETRY_COUNT: u32 = 10;

/// Upper bound on `batch_size`.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Options a sync task is started with.
///
/// Stored on the task so that recovery can re-fetch the same entity lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Entity types to synchronize, processed in order.
    pub entity_types: Vec<EntityType>,
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    /// Entities per batch. Items of one batch run concurrently.
    pub batch_size: usize,
    /// Page size used when listing entities.
    pub page_size: u32,
    pub filter: EntityFilter,
    /// Skip entities that already have a mapping without looking at their counterpart.
    pub skip_existing: bool,
    /// Retries per outbound call for retryable errors.
    pub retry_count: u32,
    /// Base delay of the retry backoff.
    pub retry_delay_ms: u64,
    /// Pause between batches.
    pub inter_batch_delay_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            entity_types: vec![EntityType::Product],
            direction: SyncDirection::default(),
            conflict_strategy: ConflictStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            filter: EntityFilter::default(),
            skip_existing: false,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            inter_batch_delay_ms: 0,
        }
    }
}

impl SyncOptions {
    /// Check the options before a task is created.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.entity_types.is_empty() {
            return Err("at least one entity type is required".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch size must be greater than zero".to_string());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "batch size {} exceeds the maximum of {}",
                self.batch_size, MAX_BATCH_SIZE
            ));
        }
        if self.page_size == 0 {
            return Err("page size must be greater than zero".to_string());
        }
        if self.retry_count > MAX_RETRY_COUNT {
            return Err(format!(
                "retry count {} exceeds the maximum of {}",
                self.retry_count, MAX_RETRY_COUNT
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = SyncOptions::default();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.direction, SyncDirection::SourceToTarget);
        assert!(!options.skip_existing);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let cases = [
            SyncOptions {
                entity_types: Vec::new(),
                ..Default::default()
            },
            SyncOptions {
                batch_size: 0,
                ..Default::default()
            },
            SyncOptions {
                batch_size: MAX_BATCH_SIZE + 1,
                ..Default::default()
            },
            SyncOptions {
                page_size: 0,
                ..Default::default()
            },
            SyncOptions {
                retry_count: MAX_RETRY_COUNT + 1,
                ..Default::default()
            },
        ];

        for options in cases {
            assert!(options.validate().is_err(), "{options:?} should be rejected");
        }
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SyncOptions =
            serde_json::from_str(r#"{"entity_types": ["order"], "direction": "BIDIRECTIONAL"}"#)
                .unwrap();
        assert_eq!(options.entity_types, vec![EntityType::Order]);
        assert_eq!(options.direction, SyncDirection::Bidirectional);
        assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
    }
}
