//! Direction in which a sync task moves data.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::platform_side::PlatformSide;

/// Direction of a sync task.
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
pub enum SyncDirection {
    #[sea_orm(string_value = "source_to_target")]
    #[default]
    SourceToTarget,
    #[sea_orm(string_value = "target_to_source")]
    TargetToSource,
    #[sea_orm(string_value = "bidirectional")]
    Bidirectional,
}

impl SyncDirection {
    /// Origins of the passes this direction runs, in execution order.
    ///
    /// A bidirectional task runs the Source pass first, then the Target pass.
    #[must_use]
    pub fn passes(self) -> &'static [PlatformSide] {
        match self {
            SyncDirection::SourceToTarget => &[PlatformSide::Source],
            SyncDirection::TargetToSource => &[PlatformSide::Target],
            SyncDirection::Bidirectional => &[PlatformSide::Source, PlatformSide::Target],
        }
    }

    /// Whether a task running in this direction may write to `side`.
    #[must_use]
    pub fn writes_to(self, side: PlatformSide) -> bool {
        match self {
            SyncDirection::SourceToTarget => side == PlatformSide::Target,
            SyncDirection::TargetToSource => side == PlatformSide::Source,
            SyncDirection::Bidirectional => true,
        }
    }

    #[must_use]
    pub fn is_bidirectional(self) -> bool {
        self == SyncDirection::Bidirectional
    }

    /// One-way direction whose pass originates on `side`.
    #[must_use]
    pub fn from_origin(side: PlatformSide) -> Self {
        match side {
            PlatformSide::Source => SyncDirection::SourceToTarget,
            PlatformSide::Target => SyncDirection::TargetToSource,
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::SourceToTarget => write!(f, "source-to-target"),
            SyncDirection::TargetToSource => write!(f, "target-to-source"),
            SyncDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "source-to-target" | "s2t" => Ok(SyncDirection::SourceToTarget),
            "target-to-source" | "t2s" => Ok(SyncDirection::TargetToSource),
            "bidirectional" | "both" => Ok(SyncDirection::Bidirectional),
            _ => Err(format!("Unknown sync direction: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidirectional_runs_source_pass_first() {
        assert_eq!(
            SyncDirection::Bidirectional.passes(),
            &[PlatformSide::Source, PlatformSide::Target]
        );
        assert_eq!(
            SyncDirection::TargetToSource.passes(),
            &[PlatformSide::Target]
        );
    }

    #[test]
    fn one_way_never_writes_origin() {
        assert!(SyncDirection::SourceToTarget.writes_to(PlatformSide::Target));
        assert!(!SyncDirection::SourceToTarget.writes_to(PlatformSide::Source));
        assert!(!SyncDirection::TargetToSource.writes_to(PlatformSide::Target));
        assert!(SyncDirection::Bidirectional.writes_to(PlatformSide::Source));
    }

    #[test]
    fn from_str_accepts_snake_and_kebab_case() {
        assert_eq!(
            "SOURCE_TO_TARGET".parse::<SyncDirection>().unwrap(),
            SyncDirection::SourceToTarget
        );
        assert_eq!(
            "target-to-source".parse::<SyncDirection>().unwrap(),
            SyncDirection::TargetToSource
        );
        assert_eq!(
            "both".parse::<SyncDirection>().unwrap(),
            SyncDirection::Bidirectional
        );
        assert!("sideways".parse::<SyncDirection>().is_err());
    }
}
