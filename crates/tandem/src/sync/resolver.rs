//! Per-entity action selection and field-level conflict resolution.
//!
//! Pure decision logic: every input is already fetched and translated, and
//! nothing here performs I/O. Both sides are compared in the Source format.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::task::{ConflictResolution, SkipReason, SyncAction, SyncConflict};
use crate::entity::conflict_strategy::ConflictStrategy;
use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;
use crate::entity::sync_direction::SyncDirection;
use crate::platform::{EXTERNAL_REF_FIELD, Payload};
use crate::store::EntityMapping;

/// Fields that never take part in comparison.
const IGNORED_FIELDS: &[&str] = &[EXTERNAL_REF_FIELD, "id", "created_at", "updated_at"];

/// Ordinal rankings of status-valued fields, per entity type and field.
///
/// A value further along the list is "more advanced" and wins a conflict
/// whatever the strategy.
#[derive(Debug, Clone)]
pub struct StatusRanking {
    orders: HashMap<(EntityType, String), Vec<String>>,
}

impl StatusRanking {
    /// No ranked fields at all.
    pub fn empty() -> Self {
        Self {
            orders: HashMap::new(),
        }
    }

    /// Rank `field` of `entity_type` by `order`, least advanced first.
    #[must_use]
    pub fn with_field<I, S>(mut self, entity_type: EntityType, field: &str, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order = order
            .into_iter()
            .map(|s| s.into().to_ascii_lowercase())
            .collect();
        self.orders.insert((entity_type, field.to_string()), order);
        self
    }

    pub fn is_ranked(&self, entity_type: EntityType, field: &str) -> bool {
        self.orders.contains_key(&(entity_type, field.to_string()))
    }

    /// Position of `value` in the ranking of `field`, if both are known.
    pub fn rank(&self, entity_type: EntityType, field: &str, value: &Value) -> Option<usize> {
        let order = self.orders.get(&(entity_type, field.to_string()))?;
        let value = value.as_str()?.to_ascii_lowercase();
        order.iter().position(|v| *v == value)
    }
}

impl Default for StatusRanking {
    fn default() -> Self {
        Self::empty()
            .with_field(
                EntityType::Order,
                "status",
                ["draft", "open", "shipped", "completed", "canceled"],
            )
            .with_field(
                EntityType::Order,
                "fulfillment_status",
                ["unfulfilled", "partial", "fulfilled"],
            )
    }
}

/// One side of a mapped pair, in Source format.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub id: &'a str,
    pub updated_at: DateTime<Utc>,
    pub fields: &'a Payload,
}

/// Everything the resolver needs to pick an action for one entity.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub entity_type: EntityType,
    /// Identifier on the platform the pass reads from.
    pub entity_id: &'a str,
    pub origin: PlatformSide,
    pub direction: SyncDirection,
    pub strategy: ConflictStrategy,
    pub skip_existing: bool,
    pub mapping: Option<&'a EntityMapping>,
    /// Source-side view. `None` when the entity is missing on Source.
    pub source: Option<Snapshot<'a>>,
    /// Target-side view translated to Source format. `None` when missing.
    pub target: Option<Snapshot<'a>>,
}

/// Outcome of [`ConflictResolver::decide`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: SyncAction,
    /// Every differing field of a true conflict, resolved or not.
    pub conflicts: Vec<SyncConflict>,
    /// Field values (Source format) forced into the outgoing payload.
    pub overrides: Payload,
    /// Ranked field values (Source format) the strategy-winning side is
    /// behind on. Written back to that side so both platforms converge.
    pub backfill: Payload,
}

impl Decision {
    fn action(action: SyncAction) -> Self {
        Self {
            action,
            conflicts: Vec::new(),
            overrides: Payload::new(),
            backfill: Payload::new(),
        }
    }

    fn skip(reason: SkipReason) -> Self {
        Self::action(SyncAction::Skip(reason))
    }
}

/// Decides what to do with one entity.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    ranking: StatusRanking,
}

impl ConflictResolver {
    pub fn new(ranking: StatusRanking) -> Self {
        Self { ranking }
    }

    pub fn ranking(&self) -> &StatusRanking {
        &self.ranking
    }

    pub fn decide(&self, input: &ReconcileInput<'_>) -> Decision {
        let Some(mapping) = input.mapping else {
            return Decision::action(SyncAction::create_in(input.origin.opposite()));
        };

        if input.skip_existing {
            return Decision::skip(SkipReason::AlreadyMapped);
        }

        let (Some(source), Some(target)) = (input.source, input.target) else {
            return Decision::skip(SkipReason::CounterpartMissing);
        };

        let source_changed = source.updated_at > mapping.last_synced_at;
        let target_changed = target.updated_at > mapping.last_synced_at;

        match (source_changed, target_changed) {
            (true, false) => update_if_allowed(input.direction, PlatformSide::Target),
            (false, true) => update_if_allowed(input.direction, PlatformSide::Source),
            (false, false) => unchanged(input),
            (true, true) => self.resolve_conflict(input, source, target),
        }
    }

    fn resolve_conflict(
        &self,
        input: &ReconcileInput<'_>,
        source: Snapshot<'_>,
        target: Snapshot<'_>,
    ) -> Decision {
        let differing = differing_fields(source.fields, target.fields);
        if differing.is_empty() {
            return unchanged(input);
        }

        let winner = match input.strategy {
            ConflictStrategy::SourceWins => Some(PlatformSide::Source),
            ConflictStrategy::TargetWins => Some(PlatformSide::Target),
            ConflictStrategy::NewestWins if target.updated_at > source.updated_at => {
                Some(PlatformSide::Target)
            }
            ConflictStrategy::NewestWins => Some(PlatformSide::Source),
            ConflictStrategy::Manual => None,
        };

        let now = Utc::now();
        let mut conflicts = Vec::with_capacity(differing.len());
        let mut overrides = Payload::new();
        let mut backfill = Payload::new();

        for field in differing {
            let source_value = source.fields.get(field).cloned().unwrap_or(Value::Null);
            let target_value = target.fields.get(field).cloned().unwrap_or(Value::Null);

            let ranked =
                self.ranked_winner(input.entity_type, field, &source_value, &target_value);
            let resolution = match winner {
                None => ConflictResolution::Unresolved,
                Some(side) => match ranked {
                    Some(ranked) => {
                        let value = match ranked {
                            PlatformSide::Source => source_value.clone(),
                            PlatformSide::Target => target_value.clone(),
                        };
                        if ranked != side {
                            backfill.insert(field.to_string(), value.clone());
                        }
                        overrides.insert(field.to_string(), value);
                        ConflictResolution::StatusRank
                    }
                    None if side == PlatformSide::Source => ConflictResolution::SourceWins,
                    None => ConflictResolution::TargetWins,
                },
            };

            conflicts.push(SyncConflict {
                entity_type: input.entity_type,
                entity_id: input.entity_id.to_string(),
                field: field.to_string(),
                source_value,
                target_value,
                resolution,
                detected_at: now,
            });
        }

        let action = match winner {
            None => SyncAction::Conflict,
            Some(side) if input.direction.writes_to(side.opposite()) => {
                SyncAction::update(side.opposite())
            }
            Some(_) => SyncAction::Skip(SkipReason::DirectionNotAllowed),
        };

        Decision {
            action,
            conflicts,
            overrides,
            backfill,
        }
    }

    /// Side holding the more advanced status, for ranked fields with known values.
    fn ranked_winner(
        &self,
        entity_type: EntityType,
        field: &str,
        source_value: &Value,
        target_value: &Value,
    ) -> Option<PlatformSide> {
        let source_rank = self.ranking.rank(entity_type, field, source_value)?;
        let target_rank = self.ranking.rank(entity_type, field, target_value)?;
        if target_rank > source_rank {
            Some(PlatformSide::Target)
        } else {
            Some(PlatformSide::Source)
        }
    }
}

fn update_if_allowed(direction: SyncDirection, side: PlatformSide) -> Decision {
    if direction.writes_to(side) {
        Decision::action(SyncAction::update(side))
    } else {
        Decision::skip(SkipReason::DirectionNotAllowed)
    }
}

/// Neither side moved: one-way passes refresh the counterpart.
fn unchanged(input: &ReconcileInput<'_>) -> Decision {
    if input.direction.is_bidirectional() {
        Decision::skip(SkipReason::Unchanged)
    } else {
        update_if_allowed(input.direction, input.origin.opposite())
    }
}

/// Names of fields whose values differ, in sorted order.
fn differing_fields<'a>(source: &'a Payload, target: &'a Payload) -> Vec<&'a str> {
    let keys: BTreeSet<&str> = source
        .keys()
        .chain(target.keys())
        .map(String::as_str)
        .filter(|k| !IGNORED_FIELDS.contains(k))
        .collect();

    keys.into_iter()
        .filter(|k| {
            !values_equal(
                source.get(*k).unwrap_or(&Value::Null),
                target.get(*k).unwrap_or(&Value::Null),
            )
        })
        .collect()
}

/// Equality that treats `10` and `10.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    struct Fixture {
        mapping: EntityMapping,
        source: Payload,
        target: Payload,
        source_at: DateTime<Utc>,
        target_at: DateTime<Utc>,
    }

    impl Fixture {
        fn new(source: Value, target: Value) -> Self {
            let synced = Utc::now() - Duration::hours(1);
            Self {
                mapping: EntityMapping::new(EntityType::Order, "s-1", "t-1", synced),
                source: payload(source),
                target: payload(target),
                source_at: synced,
                target_at: synced,
            }
        }

        fn changed(mut self, source_min: i64, target_min: i64) -> Self {
            let base = self.mapping.last_synced_at;
            if source_min > 0 {
                self.source_at = base + Duration::minutes(source_min);
            }
            if target_min > 0 {
                self.target_at = base + Duration::minutes(target_min);
            }
            self
        }

        fn input(
            &self,
            direction: SyncDirection,
            strategy: ConflictStrategy,
        ) -> ReconcileInput<'_> {
            ReconcileInput {
                entity_type: EntityType::Order,
                entity_id: "s-1",
                origin: PlatformSide::Source,
                direction,
                strategy,
                skip_existing: false,
                mapping: Some(&self.mapping),
                source: Some(Snapshot {
                    id: "s-1",
                    updated_at: self.source_at,
                    fields: &self.source,
                }),
                target: Some(Snapshot {
                    id: "t-1",
                    updated_at: self.target_at,
                    fields: &self.target,
                }),
            }
        }
    }

    fn decide(input: &ReconcileInput<'_>) -> Decision {
        ConflictResolver::default().decide(input)
    }

    #[test]
    fn unmapped_entity_is_created_opposite_the_origin() {
        let fx = Fixture::new(json!({}), json!({}));
        let mut input = fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins);
        input.mapping = None;
        assert_eq!(decide(&input).action, SyncAction::CreateInTarget);

        input.origin = PlatformSide::Target;
        assert_eq!(decide(&input).action, SyncAction::CreateInSource);
    }

    #[test]
    fn skip_existing_wins_over_everything_but_missing_mapping() {
        let fx = Fixture::new(json!({"total": 1}), json!({"total": 2})).changed(5, 10);
        let mut input = fx.input(SyncDirection::SourceToTarget, ConflictStrategy::SourceWins);
        input.skip_existing = true;
        let decision = decide(&input);
        assert_eq!(decision.action, SyncAction::Skip(SkipReason::AlreadyMapped));
        assert!(decision.conflicts.is_empty());
    }

    #[test]
    fn missing_counterpart_is_skipped() {
        let fx = Fixture::new(json!({}), json!({}));
        let mut input = fx.input(SyncDirection::SourceToTarget, ConflictStrategy::NewestWins);
        input.target = None;
        assert_eq!(
            decide(&input).action,
            SyncAction::Skip(SkipReason::CounterpartMissing)
        );
    }

    #[test]
    fn single_sided_change_propagates_when_direction_allows() {
        let fx = Fixture::new(json!({"total": 1}), json!({"total": 1})).changed(0, 5);
        let both = fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins);
        assert_eq!(decide(&both).action, SyncAction::UpdateSource);

        let one_way = fx.input(SyncDirection::SourceToTarget, ConflictStrategy::NewestWins);
        assert_eq!(
            decide(&one_way).action,
            SyncAction::Skip(SkipReason::DirectionNotAllowed)
        );

        let fx = Fixture::new(json!({"total": 1}), json!({"total": 1})).changed(5, 0);
        let one_way = fx.input(SyncDirection::SourceToTarget, ConflictStrategy::NewestWins);
        assert_eq!(decide(&one_way).action, SyncAction::UpdateTarget);
    }

    #[test]
    fn unchanged_pair_refreshes_only_on_one_way_passes() {
        let fx = Fixture::new(json!({"total": 1}), json!({"total": 1}));
        let one_way = fx.input(SyncDirection::SourceToTarget, ConflictStrategy::NewestWins);
        assert_eq!(decide(&one_way).action, SyncAction::UpdateTarget);

        let both = fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins);
        assert_eq!(decide(&both).action, SyncAction::Skip(SkipReason::Unchanged));
    }

    #[test]
    fn both_changed_without_differences_is_not_a_conflict() {
        let fx = Fixture::new(json!({"total": 10, "external_ref": "t-1"}), json!({"total": 10.0}))
            .changed(5, 6);
        let decision = decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::Manual));
        assert_eq!(decision.action, SyncAction::Skip(SkipReason::Unchanged));
        assert!(decision.conflicts.is_empty());
    }

    #[test]
    fn newest_wins_picks_the_later_side() {
        let fx = Fixture::new(json!({"total": 10}), json!({"total": 12})).changed(5, 9);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins));
        assert_eq!(decision.action, SyncAction::UpdateSource);
        assert_eq!(decision.conflicts.len(), 1);
        let conflict = &decision.conflicts[0];
        assert_eq!(conflict.field, "total");
        assert_eq!(conflict.resolution, ConflictResolution::TargetWins);
        assert_eq!(conflict.source_value, json!(10));
        assert_eq!(conflict.target_value, json!(12));
    }

    #[test]
    fn newest_wins_tie_goes_to_source() {
        let fx = Fixture::new(json!({"total": 10}), json!({"total": 12})).changed(5, 5);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins));
        assert_eq!(decision.action, SyncAction::UpdateTarget);
        assert_eq!(decision.conflicts[0].resolution, ConflictResolution::SourceWins);
    }

    #[test]
    fn named_side_strategies_ignore_timestamps() {
        let fx = Fixture::new(json!({"total": 10}), json!({"total": 12})).changed(9, 5);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::TargetWins));
        assert_eq!(decision.action, SyncAction::UpdateSource);
        assert_eq!(decision.conflicts[0].resolution, ConflictResolution::TargetWins);
    }

    #[test]
    fn manual_leaves_every_field_unresolved() {
        let fx = Fixture::new(
            json!({"total": 10, "status": "open", "note": "a"}),
            json!({"total": 12, "status": "shipped", "note": "a"}),
        )
        .changed(5, 9);
        let decision = decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::Manual));
        assert_eq!(decision.action, SyncAction::Conflict);
        let fields: Vec<_> = decision.conflicts.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "total"]);
        assert!(
            decision
                .conflicts
                .iter()
                .all(|c| c.resolution == ConflictResolution::Unresolved)
        );
        assert!(decision.overrides.is_empty());
        assert!(decision.backfill.is_empty());
    }

    #[test]
    fn advanced_status_is_backfilled_to_the_strategy_winner() {
        // Target is newer, but Source already shipped.
        let fx = Fixture::new(
            json!({"status": "shipped", "total": 10}),
            json!({"status": "open", "total": 12}),
        )
        .changed(5, 9);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins));

        assert_eq!(decision.action, SyncAction::UpdateSource);
        let status = decision.conflicts.iter().find(|c| c.field == "status").unwrap();
        assert_eq!(status.resolution, ConflictResolution::StatusRank);
        assert_eq!(decision.overrides.get("status"), Some(&json!("shipped")));
        assert!(!decision.overrides.contains_key("total"));
        // Target won the strategy but is behind on status.
        assert_eq!(decision.backfill.len(), 1);
        assert_eq!(decision.backfill.get("status"), Some(&json!("shipped")));
    }

    #[test]
    fn ranked_field_already_on_the_winner_needs_no_backfill() {
        let fx = Fixture::new(
            json!({"status": "open", "total": 10}),
            json!({"status": "shipped", "total": 12}),
        )
        .changed(5, 9);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins));

        assert_eq!(decision.action, SyncAction::UpdateSource);
        assert_eq!(decision.overrides.get("status"), Some(&json!("shipped")));
        assert!(decision.backfill.is_empty());
    }

    #[test]
    fn unranked_status_values_fall_back_to_strategy() {
        let fx = Fixture::new(json!({"status": "mystery"}), json!({"status": "open"}))
            .changed(9, 5);
        let decision =
            decide(&fx.input(SyncDirection::Bidirectional, ConflictStrategy::NewestWins));
        assert_eq!(decision.conflicts[0].resolution, ConflictResolution::SourceWins);
        assert!(decision.overrides.is_empty());
    }

    #[test]
    fn conflicts_are_recorded_even_when_direction_blocks_the_write() {
        let fx = Fixture::new(json!({"total": 10}), json!({"total": 12})).changed(5, 9);
        let decision =
            decide(&fx.input(SyncDirection::SourceToTarget, ConflictStrategy::NewestWins));
        assert_eq!(
            decision.action,
            SyncAction::Skip(SkipReason::DirectionNotAllowed)
        );
        assert_eq!(decision.conflicts.len(), 1);
    }

    #[test]
    fn ranking_is_case_insensitive_and_configurable() {
        let ranking = StatusRanking::empty().with_field(
            EntityType::Product,
            "state",
            ["Draft", "Active", "Archived"],
        );
        assert_eq!(
            ranking.rank(EntityType::Product, "state", &json!("ACTIVE")),
            Some(1)
        );
        assert!(ranking.is_ranked(EntityType::Product, "state"));
        assert!(!ranking.is_ranked(EntityType::Order, "status"));
        assert_eq!(ranking.rank(EntityType::Product, "state", &json!(3)), None);
    }
}
