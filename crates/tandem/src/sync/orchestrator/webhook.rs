use std::sync::Arc;

use serde::Deserialize;

use super::{SyncOrchestrator, TaskContext, error_code};
use crate::entity::entity_type::EntityType;
use crate::entity::platform_side::PlatformSide;
use crate::entity::sync_direction::SyncDirection;
use crate::entity::task_status::TaskStatus;
use crate::retry::RetryPolicy;
use crate::store::EntityMapping;
use crate::sync::batch::BatchDelta;
use crate::sync::errors::{Result, SyncEngineError};
use crate::sync::task::{SyncError, SyncPhase, SyncResult, SyncTask};
use crate::sync::tracker::ProgressTracker;

/// Body of a platform change notification.
///
/// ```json
/// { "entity_type": "product", "entity_id": "p-1", "reference_id": "t-9" }
/// ```
///
/// The cross-platform reference may also arrive as `entity.external_ref`.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    entity_type: EntityType,
    entity_id: String,
    #[serde(default)]
    reference_id: Option<String>,
    #[serde(default)]
    entity: Option<WebhookEntity>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity {
    #[serde(default)]
    external_ref: Option<String>,
}

impl WebhookEvent {
    fn parse(body: &[u8]) -> Result<Self> {
        let event: Self =
            serde_json::from_slice(body).map_err(|e| SyncEngineError::Webhook(e.to_string()))?;
        if event.entity_id.trim().is_empty() {
            return Err(SyncEngineError::Webhook("entity_id is empty".to_string()));
        }
        Ok(event)
    }

    fn reference(&self) -> Option<&str> {
        self.reference_id
            .as_deref()
            .or_else(|| self.entity.as_ref().and_then(|e| e.external_ref.as_deref()))
            .filter(|r| !r.is_empty())
    }
}

impl SyncOrchestrator {
    /// Reconcile the single entity a platform reported as changed.
    ///
    /// Runs inline as a one-entity task. When the event carries a
    /// cross-platform reference and no mapping exists yet, the mapping is
    /// linked from it first, so the entity is updated rather than duplicated.
    #[tracing::instrument(skip(self, body))]
    pub async fn ingest_webhook(
        self: &Arc<Self>,
        platform: PlatformSide,
        body: &[u8],
    ) -> Result<SyncResult> {
        let event = WebhookEvent::parse(body)?;

        let mut options = self.webhook_options.clone();
        options.entity_types = vec![event.entity_type];
        options.direction = SyncDirection::from_origin(platform);
        options.skip_existing = false;

        let task = SyncTask::new(options);
        let ctx = TaskContext {
            task_id: task.id,
            policy: RetryPolicy::from_options(&task.options),
            options: task.options.clone(),
        };
        let tracker = ProgressTracker::new(task, Arc::clone(&self.tasks), self.on_progress.clone());
        tracker.create().await?;
        tracker.start().await?;

        match self.process_event(&ctx, &tracker, platform, &event).await {
            Ok(result) => {
                tracker.complete(TaskStatus::Completed, None).await?;
                Ok(result)
            }
            Err(err) => {
                let error = SyncError::fatal(error_code(&err), err.to_string());
                tracker.complete(TaskStatus::Failed, Some(error)).await?;
                Err(err)
            }
        }
    }

    async fn process_event(
        &self,
        ctx: &TaskContext,
        tracker: &ProgressTracker,
        platform: PlatformSide,
        event: &WebhookEvent,
    ) -> Result<SyncResult> {
        let phase = SyncPhase {
            entity_type: event.entity_type,
            origin: platform,
        };
        tracker.enter_phase(phase, 1, None).await?;

        let entity = self
            .fetch_one(ctx, platform, event.entity_type, &event.entity_id)
            .await?
            .ok_or_else(|| {
                SyncEngineError::Webhook(format!(
                    "{} {} not found on {}",
                    event.entity_type, event.entity_id, platform
                ))
            })?;

        if let Some(reference) = event.reference() {
            self.link_reference(ctx, platform, event, reference).await?;
        }

        let report = self.reconcile_entity(ctx, phase, entity).await;
        let result = report.result.clone();

        let mut delta = BatchDelta {
            last_entity_id: Some(event.entity_id.clone()),
            ..BatchDelta::default()
        };
        delta.counts.record(&report.result);
        delta.results.push(report.result);
        delta.errors = report.errors;
        delta.conflicts = report.conflicts;
        tracker.update(&delta).await?;

        Ok(result)
    }

    /// Record the mapping an event's reference implies, unless one exists.
    async fn link_reference(
        &self,
        ctx: &TaskContext,
        platform: PlatformSide,
        event: &WebhookEvent,
        reference: &str,
    ) -> Result<()> {
        let _guard = self
            .mappings
            .lock(event.entity_type, platform, &event.entity_id)
            .await;
        if self
            .mappings
            .lookup(event.entity_type, platform, &event.entity_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let counterpart_side = platform.opposite();
        let Some(counterpart) = self
            .fetch_one(ctx, counterpart_side, event.entity_type, reference)
            .await?
        else {
            tracing::warn!(
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                reference,
                "Webhook reference does not exist on the other platform"
            );
            return Ok(());
        };

        // Synced as of the counterpart's last change: the reported entity
        // counts as changed and is propagated.
        let mapping = EntityMapping::between(
            event.entity_type,
            platform,
            event.entity_id.clone(),
            counterpart.id,
            counterpart.updated_at,
        );
        self.mappings.upsert(mapping).await?;
        tracing::info!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            reference,
            "Linked mapping from webhook reference"
        );
        Ok(())
    }
}
