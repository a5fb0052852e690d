//! Progress reporting for sync tasks.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): progress bars using indicatif
//! - Logging mode (non-TTY): structured logging using tracing
//!
//! In interactive mode every phase gets a fetch bar, and a single batch bar
//! counts settled entities against what the fetch phases found.

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use tandem::sync::{ProgressCallback, SyncProgress};

pub(crate) use interactive::InteractiveReporter;
pub(crate) use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub(crate) enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub(crate) fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a callback the orchestrator can own.
    pub(crate) fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }

    /// Finish all progress bars (interactive mode only).
    pub(crate) fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tandem::entity::prelude::{EntityType, PlatformSide, SyncDirection, TaskStatus};
    use tandem::sync::{SyncAction, TaskCounters};
    use uuid::Uuid;

    use super::*;

    fn run_events(reporter: &ProgressReporter) {
        let task_id = Uuid::new_v4();
        let events = vec![
            SyncProgress::TaskStarted {
                task_id,
                direction: SyncDirection::Bidirectional,
                entity_types: vec![EntityType::Product],
                recovered_from: None,
            },
            SyncProgress::FetchingEntities {
                task_id,
                entity_type: EntityType::Product,
                origin: PlatformSide::Source,
            },
            SyncProgress::FetchedPage {
                task_id,
                entity_type: EntityType::Product,
                page: 1,
                count: 2,
            },
            SyncProgress::FetchComplete {
                task_id,
                entity_type: EntityType::Product,
                origin: PlatformSide::Source,
                total: 2,
            },
            SyncProgress::BatchStarted {
                task_id,
                batch_index: 0,
                size: 2,
            },
            SyncProgress::EntitySynced {
                task_id,
                entity_type: EntityType::Product,
                entity_id: "p-1".to_string(),
                action: SyncAction::CreateInTarget,
            },
            SyncProgress::EntityFailed {
                task_id,
                entity_type: EntityType::Product,
                entity_id: "p-2".to_string(),
                error: "HTTP 422".to_string(),
            },
            SyncProgress::RetryBackoff {
                operation: "create product on target".to_string(),
                attempt: 1,
                delay_ms: 10,
                error: "HTTP 503".to_string(),
            },
            SyncProgress::BatchComplete {
                task_id,
                batch_index: 0,
                delta: TaskCounters::default(),
                totals: TaskCounters::default(),
            },
            SyncProgress::TaskFinished {
                task_id,
                status: TaskStatus::Completed,
                counters: TaskCounters::default(),
            },
        ];
        for event in events {
            reporter.handle(event);
        }
        reporter.finish();
    }

    #[test]
    fn logging_reporter_accepts_every_event() {
        run_events(&ProgressReporter::Logging(LoggingReporter::new()));
    }

    #[test]
    fn interactive_reporter_accepts_every_event() {
        run_events(&ProgressReporter::Interactive(InteractiveReporter::hidden()));
    }

    #[test]
    fn callback_forwards_to_reporter() {
        let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
        let callback = reporter.as_callback();
        callback(SyncProgress::BatchStarted {
            task_id: Uuid::nil(),
            batch_index: 0,
            size: 1,
        });
        assert_eq!(Arc::strong_count(&reporter), 2);
    }
}
