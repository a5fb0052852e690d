//! Which of the two connected platforms a record or identifier belongs to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One end of a synchronization link.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PlatformSide {
    #[sea_orm(string_value = "source")]
    Source,
    #[sea_orm(string_value = "target")]
    Target,
}

impl PlatformSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            PlatformSide::Source => PlatformSide::Target,
            PlatformSide::Target => PlatformSide::Source,
        }
    }
}

impl std::fmt::Display for PlatformSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformSide::Source => write!(f, "source"),
            PlatformSide::Target => write!(f, "target"),
        }
    }
}

impl std::str::FromStr for PlatformSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source" => Ok(PlatformSide::Source),
            "target" => Ok(PlatformSide::Target),
            _ => Err(format!("Unknown platform side: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_flips_side() {
        assert_eq!(PlatformSide::Source.opposite(), PlatformSide::Target);
        assert_eq!(PlatformSide::Target.opposite(), PlatformSide::Source);
    }

    #[test]
    fn from_str_round_trips_display() {
        for side in [PlatformSide::Source, PlatformSide::Target] {
            assert_eq!(side.to_string().parse::<PlatformSide>().unwrap(), side);
        }
        assert!("middle".parse::<PlatformSide>().is_err());
    }
}
