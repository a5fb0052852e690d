//! Kinds of records the engine knows how to synchronize.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Record kinds exchanged between the two platforms.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "order")]
    Order,
}

impl EntityType {
    /// Collection name used in REST resource paths (`products`, `orders`).
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            EntityType::Product => "products",
            EntityType::Order => "orders",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Product => write!(f, "product"),
            EntityType::Order => write!(f, "order"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" | "products" => Ok(EntityType::Product),
            "order" | "orders" => Ok(EntityType::Order),
            _ => Err(format!("Unknown entity type: {}", s)),
        }
    }
}
