use chrono::{DateTime, Utc};

use super::{SyncOrchestrator, TaskContext};
use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;
use crate::platform::{EXTERNAL_REF_FIELD, Payload, PlatformEntity, PlatformError};
use crate::store::{EntityMapping, StoreError};
use crate::sync::batch::ItemReport;
use crate::sync::progress::{SyncProgress, emit};
use crate::sync::resolver::{ReconcileInput, Snapshot};
use crate::sync::task::{
    ErrorCode, Severity, SkipReason, SyncAction, SyncError, SyncPhase, SyncResult,
};

/// One side of a pair: the raw record plus its fields in Source format.
struct SideView {
    entity: PlatformEntity,
    canonical: Payload,
}

impl SideView {
    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            id: &self.entity.id,
            updated_at: self.entity.updated_at,
            fields: &self.canonical,
        }
    }
}

fn store_failure(err: StoreError, entity_type: EntityType, entity_id: &str) -> SyncError {
    let code = if err.is_mapping_conflict() {
        ErrorCode::MappingConflict
    } else {
        ErrorCode::Store
    };
    SyncError::new(code, Severity::Error, err.to_string()).for_entity(entity_type, entity_id)
}

impl SyncOrchestrator {
    /// Reconcile one entity read from `phase.origin`. Never fails: every
    /// problem ends up in the report.
    pub(crate) async fn reconcile_entity(
        &self,
        ctx: &TaskContext,
        phase: SyncPhase,
        entity: PlatformEntity,
    ) -> ItemReport {
        let entity_id = entity.id.clone();
        let mut report =
            ItemReport::new(SyncResult::new(ctx.task_id, phase.entity_type, &entity_id));

        match self.reconcile_inner(ctx, phase, entity, &mut report).await {
            Ok(()) => {
                tracing::debug!(
                    task_id = %ctx.task_id,
                    entity_type = %phase.entity_type,
                    entity_id = %entity_id,
                    action = %report.result.action,
                    "Entity reconciled"
                );
                emit(
                    self.progress(),
                    SyncProgress::EntitySynced {
                        task_id: ctx.task_id,
                        entity_type: phase.entity_type,
                        entity_id,
                        action: report.result.action,
                    },
                );
            }
            Err(error) => {
                tracing::warn!(
                    task_id = %ctx.task_id,
                    entity_type = %phase.entity_type,
                    entity_id = %entity_id,
                    code = %error.code,
                    error = %error.message,
                    "Entity failed"
                );
                emit(
                    self.progress(),
                    SyncProgress::EntityFailed {
                        task_id: ctx.task_id,
                        entity_type: phase.entity_type,
                        entity_id,
                        error: error.message.clone(),
                    },
                );
                report.result = report.result.clone().failed(error.code);
                report.errors.push(error);
            }
        }

        report
    }

    async fn reconcile_inner(
        &self,
        ctx: &TaskContext,
        phase: SyncPhase,
        entity: PlatformEntity,
        report: &mut ItemReport,
    ) -> Result<(), SyncError> {
        let entity_type = phase.entity_type;
        let origin = phase.origin;
        let counterpart_side = origin.opposite();
        let entity_id = entity.id.clone();
        let platform_failure =
            |err: PlatformError| SyncError::from_platform(&err, entity_type, &entity_id);

        // Held until the mapping is recorded so concurrent work on the same
        // entity cannot create it twice.
        let _guard = self.mappings.lock(entity_type, origin, &entity_id).await;

        let mut mapping = self
            .mappings
            .lookup(entity_type, origin, &entity_id)
            .await
            .map_err(|e| store_failure(e, entity_type, &entity_id))?;

        // A pass reading the other platform may be creating this entity's
        // counterpart right now. Look again once no create is in flight and
        // keep the create lock until the new mapping is recorded.
        let _create_guard = if mapping.is_some() {
            None
        } else {
            let guard = self.mappings.lock_creates(entity_type).await;
            mapping = self
                .mappings
                .lookup(entity_type, origin, &entity_id)
                .await
                .map_err(|e| store_failure(e, entity_type, &entity_id))?;
            mapping.is_none().then_some(guard)
        };

        let counterpart = match &mapping {
            Some(m) if !ctx.options.skip_existing => self
                .fetch_one(ctx, counterpart_side, entity_type, m.id_on(counterpart_side))
                .await
                .map_err(platform_failure)?,
            _ => None,
        };

        let origin_view = self.view(origin, entity).map_err(platform_failure)?;
        let counterpart_view = counterpart
            .map(|e| self.view(counterpart_side, e))
            .transpose()
            .map_err(platform_failure)?;

        let (source_view, target_view) = match origin {
            PlatformSide::Source => (Some(&origin_view), counterpart_view.as_ref()),
            PlatformSide::Target => (counterpart_view.as_ref(), Some(&origin_view)),
        };

        let decision = self.resolver.decide(&ReconcileInput {
            entity_type,
            entity_id: &entity_id,
            origin,
            direction: ctx.options.direction,
            strategy: ctx.options.conflict_strategy,
            skip_existing: ctx.options.skip_existing,
            mapping: mapping.as_ref(),
            source: source_view.map(SideView::snapshot),
            target: target_view.map(SideView::snapshot),
        });

        for conflict in &decision.conflicts {
            emit(
                self.progress(),
                SyncProgress::ConflictDetected {
                    task_id: ctx.task_id,
                    entity_type,
                    entity_id: entity_id.clone(),
                    field: conflict.field.clone(),
                    resolution: conflict.resolution,
                },
            );
        }
        report.conflicts.extend(decision.conflicts.iter().cloned());

        let (mut source_id, mut target_id) = match &mapping {
            Some(m) => (Some(m.source_id.clone()), Some(m.target_id.clone())),
            None if origin == PlatformSide::Source => (Some(entity_id.clone()), None),
            None => (None, Some(entity_id.clone())),
        };

        match decision.action {
            SyncAction::CreateInTarget | SyncAction::CreateInSource => {
                let payload = self
                    .outgoing(counterpart_side, &origin_view, &decision.overrides)
                    .map_err(platform_failure)?;
                let created = self
                    .create(ctx, counterpart_side, entity_type, &payload)
                    .await
                    .map_err(platform_failure)?;

                let synced_at = synced_at(&[&origin_view.entity, &created]);
                let stored = self
                    .mappings
                    .upsert(EntityMapping::between(
                        entity_type,
                        origin,
                        entity_id.clone(),
                        created.id.clone(),
                        synced_at,
                    ))
                    .await
                    .map_err(|e| store_failure(e, entity_type, &entity_id))?;
                source_id = Some(stored.source_id);
                target_id = Some(stored.target_id);
            }
            SyncAction::UpdateTarget | SyncAction::UpdateSource => {
                // Invariant of the resolver: updates only happen with a mapping
                // and both sides present.
                let (Some(mapping), Some(source_view), Some(target_view)) =
                    (mapping.as_ref(), source_view, target_view)
                else {
                    return Err(SyncError::new(
                        ErrorCode::Internal,
                        Severity::Error,
                        "update decided without a complete pair",
                    )
                    .for_entity(entity_type, &entity_id));
                };

                let (write_side, winner) = match decision.action {
                    SyncAction::UpdateTarget => (PlatformSide::Target, source_view),
                    _ => (PlatformSide::Source, target_view),
                };
                let payload = self
                    .outgoing(write_side, winner, &decision.overrides)
                    .map_err(platform_failure)?;
                let written = self
                    .update(ctx, write_side, entity_type, mapping.id_on(write_side), &payload)
                    .await
                    .map_err(platform_failure)?;

                // The side the strategy picked may be behind on a ranked
                // status; bring it forward too.
                let winner_side = write_side.opposite();
                let backfilled = if !decision.backfill.is_empty()
                    && ctx.options.direction.writes_to(winner_side)
                {
                    let payload = self
                        .backfill_payload(winner_side, winner, &decision.backfill)
                        .map_err(platform_failure)?;
                    let id = mapping.id_on(winner_side);
                    tracing::debug!(
                        task_id = %ctx.task_id,
                        entity_type = %entity_type,
                        entity_id = %id,
                        side = %winner_side,
                        fields = decision.backfill.len(),
                        "Backfilling ranked fields"
                    );
                    Some(
                        self.update(ctx, winner_side, entity_type, id, &payload)
                            .await
                            .map_err(platform_failure)?,
                    )
                } else {
                    None
                };

                let mut covered = vec![&source_view.entity, &target_view.entity, &written];
                covered.extend(backfilled.as_ref());
                let synced_at = synced_at(&covered);
                self.mappings
                    .upsert(EntityMapping {
                        last_synced_at: synced_at,
                        ..mapping.clone()
                    })
                    .await
                    .map_err(|e| store_failure(e, entity_type, &entity_id))?;
            }
            SyncAction::Skip(SkipReason::CounterpartMissing) => {
                let missing_id = mapping
                    .as_ref()
                    .map(|m| m.id_on(counterpart_side).to_string())
                    .unwrap_or_default();
                report.errors.push(
                    SyncError::new(
                        ErrorCode::CounterpartMissing,
                        Severity::Warning,
                        format!(
                            "{entity_type} {missing_id} no longer exists on {counterpart_side}"
                        ),
                    )
                    .for_entity(entity_type, &entity_id),
                );
            }
            SyncAction::Skip(_) | SyncAction::Conflict => {}
        }

        report.result = report
            .result
            .clone()
            .with_action(decision.action)
            .with_ids(source_id, target_id);
        Ok(())
    }

    /// Wrap a record with its Source-format fields.
    fn view(
        &self,
        side: PlatformSide,
        entity: PlatformEntity,
    ) -> crate::platform::Result<SideView> {
        let canonical = match side {
            PlatformSide::Source => entity.fields.clone(),
            PlatformSide::Target => self.translator.to_source_format(&entity)?,
        };
        Ok(SideView { entity, canonical })
    }

    /// Payload for a write to `write_side`, built from `from` with `overrides`
    /// (Source format) applied.
    fn outgoing(
        &self,
        write_side: PlatformSide,
        from: &SideView,
        overrides: &Payload,
    ) -> crate::platform::Result<Payload> {
        let mut fields = from.canonical.clone();
        fields.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        match write_side {
            PlatformSide::Source => Ok(fields),
            PlatformSide::Target => {
                let source = PlatformEntity::new(
                    from.entity.id.clone(),
                    from.entity.entity_type,
                    from.entity.updated_at,
                    fields,
                );
                self.translator.to_target_format(&source)
            }
        }
    }

    /// The record on `side` as it stands, with `fields` (Source format)
    /// translated and written over it.
    fn backfill_payload(
        &self,
        side: PlatformSide,
        current: &SideView,
        fields: &Payload,
    ) -> crate::platform::Result<Payload> {
        let mut translated = match side {
            PlatformSide::Source => fields.clone(),
            PlatformSide::Target => self.translator.to_target_format(&PlatformEntity::new(
                current.entity.id.clone(),
                current.entity.entity_type,
                current.entity.updated_at,
                fields.clone(),
            ))?,
        };
        // The record keeps its own counterpart reference.
        translated.remove(EXTERNAL_REF_FIELD);

        let mut payload = current.entity.fields.clone();
        payload.extend(translated);
        Ok(payload)
    }

    pub(crate) async fn fetch_one(
        &self,
        ctx: &TaskContext,
        side: PlatformSide,
        entity_type: EntityType,
        id: &str,
    ) -> crate::platform::Result<Option<PlatformEntity>> {
        let client = self.client(side);
        let operation = format!("get {entity_type} {id} from {}", client.name());
        ctx.policy
            .execute_with_auth(
                &operation,
                || client.get_entity_by_id(entity_type, id),
                self.auth(side),
                self.progress(),
            )
            .await
    }

    async fn create(
        &self,
        ctx: &TaskContext,
        side: PlatformSide,
        entity_type: EntityType,
        payload: &Payload,
    ) -> crate::platform::Result<PlatformEntity> {
        let client = self.client(side);
        let operation = format!("create {entity_type} on {}", client.name());
        ctx.policy
            .execute_with_auth(
                &operation,
                || client.create_entity(entity_type, payload),
                self.auth(side),
                self.progress(),
            )
            .await
    }

    async fn update(
        &self,
        ctx: &TaskContext,
        side: PlatformSide,
        entity_type: EntityType,
        id: &str,
        payload: &Payload,
    ) -> crate::platform::Result<PlatformEntity> {
        let client = self.client(side);
        let operation = format!("update {entity_type} {id} on {}", client.name());
        ctx.policy
            .execute_with_auth(
                &operation,
                || client.update_entity(entity_type, id, payload),
                self.auth(side),
                self.progress(),
            )
            .await
    }
}

/// A sync timestamp no earlier than now or any record it covers, so the next
/// run sees the pair as unchanged.
fn synced_at(entities: &[&PlatformEntity]) -> DateTime<Utc> {
    entities
        .iter()
        .map(|e| e.updated_at)
        .fold(Utc::now(), |latest, at| latest.max(at))
}
