//! Run and resume sync tasks.

use std::sync::Arc;

use tandem::entity::prelude::TaskStatus;
use tandem::sync::{SyncOptions, SyncTask, TaskHandle};
use uuid::Uuid;

use crate::SyncArgs;
use crate::commands::shared::{build_orchestrator, open_store, print_task_summary};
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::setup_shutdown_handler;

/// Merge command-line arguments over the configured defaults.
fn sync_options(args: SyncArgs, config: &Config) -> SyncOptions {
    let mut options = config.sync.options();
    if !args.entity_types.is_empty() {
        options.entity_types = args.entity_types;
    }
    if let Some(direction) = args.direction {
        options.direction = direction;
    }
    if let Some(strategy) = args.conflict_strategy {
        options.conflict_strategy = strategy;
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(retry_count) = args.retry_count {
        options.retry_count = retry_count;
    }
    if let Some(retry_delay_ms) = args.retry_delay_ms {
        options.retry_delay_ms = retry_delay_ms;
    }
    if let Some(skip_existing) = args.skip_existing {
        options.skip_existing = skip_existing;
    }
    options.filter.updated_since = args.since;
    options
}

/// Wait for a task, then report it. A failed task is an error exit.
async fn finish_task(
    handle: TaskHandle,
    reporter: &ProgressReporter,
) -> Result<SyncTask, Box<dyn std::error::Error>> {
    let result = handle.wait().await;
    reporter.finish();
    let task = result?;

    print_task_summary(&task);
    if task.status == TaskStatus::Failed {
        return Err(format!(
            "Task {} failed; resume it with: tandem recover {}",
            task.id, task.id
        )
        .into());
    }
    Ok(task)
}

/// Start a sync task and wait for it to finish.
pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = sync_options(args, config);
    let store = open_store(database_url).await?;
    let reporter = Arc::new(ProgressReporter::new());
    let orchestrator = build_orchestrator(config, store, Some(reporter.as_callback()))?;
    setup_shutdown_handler(&orchestrator);

    let handle = orchestrator.start_sync(options).await?;
    tracing::info!(task_id = %handle.task_id(), "Sync task started");
    finish_task(handle, &reporter).await?;
    Ok(())
}

/// Resume an interrupted task from its checkpoint.
pub(crate) async fn handle_recover(
    task_id: Uuid,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(database_url).await?;
    let reporter = Arc::new(ProgressReporter::new());
    let orchestrator = build_orchestrator(config, store, Some(reporter.as_callback()))?;
    setup_shutdown_handler(&orchestrator);

    let handle = orchestrator.recover_sync_operation(task_id).await?;
    tracing::info!(
        task_id = %handle.task_id(),
        recovered_from = %task_id,
        "Recovery task started"
    );
    finish_task(handle, &reporter).await?;
    Ok(())
}
