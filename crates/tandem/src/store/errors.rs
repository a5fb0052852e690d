use sea_orm::DbErr;
use thiserror::Error;

use crate::entity::entity_type::EntityType;

/// Errors that can occur in the mapping and task stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One of the ids is already mapped to a different counterpart.
    #[error("Mapping conflict for {entity_type} {source_id} <-> {target_id}: {message}")]
    MappingConflict {
        entity_type: EntityType,
        source_id: String,
        target_id: String,
        message: String,
    },

    /// A stored value could not be interpreted.
    #[error("Corrupt stored value: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub fn mapping_conflict(
        entity_type: EntityType,
        source_id: &str,
        target_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::MappingConflict {
            entity_type,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            message: message.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_mapping_conflict(&self) -> bool {
        matches!(self, Self::MappingConflict { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
