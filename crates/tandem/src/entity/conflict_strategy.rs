//! How a true conflict between two independently-updated records is settled.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    /// The Source record always wins.
    #[sea_orm(string_value = "source_wins")]
    SourceWins,
    /// The Target record always wins.
    #[sea_orm(string_value = "target_wins")]
    TargetWins,
    /// The record with the later `updated_at` wins; ties go to Source.
    #[sea_orm(string_value = "newest_wins")]
    #[default]
    NewestWins,
    /// Nothing is written; every differing field is recorded as unresolved.
    #[sea_orm(string_value = "manual")]
    Manual,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::SourceWins => write!(f, "source-wins"),
            ConflictStrategy::TargetWins => write!(f, "target-wins"),
            ConflictStrategy::NewestWins => write!(f, "newest-wins"),
            ConflictStrategy::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "source-wins" | "source" => Ok(ConflictStrategy::SourceWins),
            "target-wins" | "target" => Ok(ConflictStrategy::TargetWins),
            "newest-wins" | "newest" => Ok(ConflictStrategy::NewestWins),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(format!("Unknown conflict strategy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_newest_wins() {
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::NewestWins);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "NEWEST_WINS".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::NewestWins
        );
        assert_eq!(
            "source".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::SourceWins
        );
        assert_eq!(
            "manual".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::Manual
        );
        assert!("coin-flip".parse::<ConflictStrategy>().is_err());
    }
}
