//! Reference field translation between the Source and Target catalog formats.
//!
//! The Source platform stores money as decimal amounts (`19.99`) and stock as
//! `quantity`; the Target platform stores money as integer minor units
//! (`1999`) and stock as `inventory_quantity`. Fields without a rule are
//! copied verbatim. Each side keeps the other side's id in `external_ref`.

use serde_json::{Number, Value};

use crate::entity::entity_type::EntityType;

use super::errors::{PlatformError, Result};
use super::types::{Payload, PlatformEntity, Translator};

/// Field carrying the counterpart's identifier.
pub const EXTERNAL_REF_FIELD: &str = "external_ref";

const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Same value, possibly renamed.
    Copy,
    /// Decimal amount on Source, integer minor units on Target.
    Money,
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    source: &'static str,
    target: &'static str,
    kind: FieldKind,
}

const PRODUCT_RULES: &[FieldRule] = &[
    FieldRule {
        source: "price",
        target: "price",
        kind: FieldKind::Money,
    },
    FieldRule {
        source: "compare_at_price",
        target: "compare_at_price",
        kind: FieldKind::Money,
    },
    FieldRule {
        source: "quantity",
        target: "inventory_quantity",
        kind: FieldKind::Copy,
    },
    FieldRule {
        source: "name",
        target: "title",
        kind: FieldKind::Copy,
    },
];

const ORDER_RULES: &[FieldRule] = &[
    FieldRule {
        source: "total",
        target: "total_price",
        kind: FieldKind::Money,
    },
    FieldRule {
        source: "subtotal",
        target: "subtotal_price",
        kind: FieldKind::Money,
    },
];

fn rules_for(entity_type: EntityType) -> &'static [FieldRule] {
    match entity_type {
        EntityType::Product => PRODUCT_RULES,
        EntityType::Order => ORDER_RULES,
    }
}

/// Translator for products and orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogTranslator;

impl CatalogTranslator {
    pub fn new() -> Self {
        Self
    }

    fn translate(entity: &PlatformEntity, to_target: bool) -> Result<Payload> {
        let rules = rules_for(entity.entity_type);
        let mut out = Payload::new();

        for (name, value) in &entity.fields {
            if name == EXTERNAL_REF_FIELD {
                continue;
            }

            let rule = rules.iter().find(|r| {
                if to_target {
                    r.source == name
                } else {
                    r.target == name
                }
            });

            match rule {
                None => {
                    out.insert(name.clone(), value.clone());
                }
                Some(rule) => {
                    let (key, converted) = if to_target {
                        (rule.target, convert_to_target(rule, value)?)
                    } else {
                        (rule.source, convert_to_source(rule, value)?)
                    };
                    out.insert(key.to_string(), converted);
                }
            }
        }

        out.insert(
            EXTERNAL_REF_FIELD.to_string(),
            Value::String(entity.id.clone()),
        );
        Ok(out)
    }
}

impl Translator for CatalogTranslator {
    fn to_target_format(&self, source: &PlatformEntity) -> Result<Payload> {
        Self::translate(source, true)
    }

    fn to_source_format(&self, target: &PlatformEntity) -> Result<Payload> {
        Self::translate(target, false)
    }
}

fn convert_to_target(rule: &FieldRule, value: &Value) -> Result<Value> {
    match (rule.kind, value) {
        (_, Value::Null) | (FieldKind::Copy, _) => Ok(value.clone()),
        (FieldKind::Money, _) => {
            let amount = decimal_amount(rule.source, value)?;
            let minor = (amount * MINOR_UNITS_PER_MAJOR).round();
            if !minor.is_finite() || minor.abs() > i64::MAX as f64 {
                return Err(PlatformError::invalid_payload(format!(
                    "{} out of range: {}",
                    rule.source, value
                )));
            }
            Ok(Value::Number(Number::from(minor as i64)))
        }
    }
}

fn convert_to_source(rule: &FieldRule, value: &Value) -> Result<Value> {
    match (rule.kind, value) {
        (_, Value::Null) | (FieldKind::Copy, _) => Ok(value.clone()),
        (FieldKind::Money, _) => {
            let minor = value.as_i64().ok_or_else(|| {
                PlatformError::invalid_payload(format!(
                    "{} must be an integer amount of minor units, got {}",
                    rule.target, value
                ))
            })?;
            let amount = minor as f64 / MINOR_UNITS_PER_MAJOR;
            Number::from_f64(amount).map(Value::Number).ok_or_else(|| {
                PlatformError::invalid_payload(format!("{} out of range: {}", rule.target, minor))
            })
        }
    }
}

fn decimal_amount(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PlatformError::invalid_payload(format!("{} must be a decimal amount, got {}", field, value))
    })
}
