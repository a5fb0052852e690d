use tandem::sync::{ConflictResolution, SyncAction, SyncProgress};

/// Logging reporter using tracing for structured output.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::TaskStarted {
                task_id,
                direction,
                entity_types,
                recovered_from,
            } => {
                tracing::info!(
                    task_id = %task_id,
                    direction = %direction,
                    entity_types = ?entity_types,
                    recovered_from = ?recovered_from,
                    "Sync task started"
                );
            }

            SyncProgress::FetchingEntities {
                task_id,
                entity_type,
                origin,
            } => {
                tracing::info!(task_id = %task_id, entity_type = %entity_type, origin = %origin, "Fetching entities");
            }

            SyncProgress::FetchedPage {
                entity_type,
                page,
                count,
                ..
            } => {
                tracing::debug!(entity_type = %entity_type, page, count, "Fetched page");
            }

            SyncProgress::FetchComplete {
                entity_type,
                origin,
                total,
                ..
            } => {
                tracing::info!(entity_type = %entity_type, origin = %origin, total, "Fetch complete");
            }

            SyncProgress::BatchStarted {
                batch_index, size, ..
            } => {
                tracing::debug!(batch_index, size, "Batch started");
            }

            SyncProgress::BatchComplete {
                batch_index,
                delta,
                totals,
                ..
            } => {
                tracing::info!(
                    batch_index,
                    created = delta.created,
                    updated = delta.updated,
                    skipped = delta.skipped,
                    failed = delta.failed,
                    processed_total = totals.processed,
                    "Batch complete"
                );
            }

            SyncProgress::EntitySynced {
                entity_type,
                entity_id,
                action,
                ..
            } => match action {
                SyncAction::Skip(_) => {
                    tracing::debug!(entity_type = %entity_type, entity_id = %entity_id, action = %action, "Skipped");
                }
                _ => {
                    tracing::info!(entity_type = %entity_type, entity_id = %entity_id, action = %action, "Synced");
                }
            },

            SyncProgress::EntityFailed {
                entity_type,
                entity_id,
                error,
                ..
            } => {
                tracing::warn!(entity_type = %entity_type, entity_id = %entity_id, error = %error, "Failed to sync");
            }

            SyncProgress::ConflictDetected {
                entity_type,
                entity_id,
                field,
                resolution,
                ..
            } => {
                if resolution == ConflictResolution::Unresolved {
                    tracing::warn!(entity_type = %entity_type, entity_id = %entity_id, field = %field, "Unresolved conflict");
                } else {
                    tracing::debug!(
                        entity_type = %entity_type,
                        entity_id = %entity_id,
                        field = %field,
                        resolution = %resolution,
                        "Conflict resolved"
                    );
                }
            }

            SyncProgress::RetryBackoff {
                operation,
                attempt,
                delay_ms,
                error,
            } => {
                tracing::warn!(
                    operation = %operation,
                    attempt,
                    delay_ms,
                    error = %error,
                    "Retrying after backoff"
                );
            }

            SyncProgress::TaskFinished {
                task_id,
                status,
                counters,
            } => {
                tracing::info!(
                    task_id = %task_id,
                    status = %status,
                    processed = counters.processed,
                    created = counters.created,
                    updated = counters.updated,
                    skipped = counters.skipped,
                    failed = counters.failed,
                    "Sync task finished"
                );
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
