//! Inspect recorded tasks and their results.

use console::style;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tandem::store::{DatabaseStore, TaskStore};
use tandem::sync::{SyncResult, SyncTask};
use uuid::Uuid;

use crate::commands::shared::{open_store, print_task_summary};

/// How `status` prints what it finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Task")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Types")]
    entity_types: String,
    #[tabled(rename = "Processed")]
    processed: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Created at")]
    created_at: String,
}

impl From<&SyncTask> for TaskRow {
    fn from(task: &SyncTask) -> Self {
        Self {
            id: task.id.to_string(),
            status: task.status.to_string(),
            direction: task.options.direction.to_string(),
            entity_types: task
                .options
                .entity_types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
            processed: task.counters.processed,
            failed: task.counters.failed,
            created_at: task.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Type")]
    entity_type: String,
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Source")]
    source_id: String,
    #[tabled(rename = "Target")]
    target_id: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

impl From<&SyncResult> for ResultRow {
    fn from(result: &SyncResult) -> Self {
        let outcome = match (result.success, result.error_code) {
            (true, _) => "ok".to_string(),
            (false, Some(code)) => code.to_string(),
            (false, None) => "failed".to_string(),
        };
        Self {
            entity_type: result.entity_type.to_string(),
            entity_id: result.entity_id.clone(),
            action: result.action.to_string(),
            source_id: result.source_id.clone().unwrap_or_default(),
            target_id: result.target_id.clone().unwrap_or_default(),
            outcome,
        }
    }
}

fn task_table(tasks: &[SyncTask]) -> String {
    let rows: Vec<TaskRow> = tasks.iter().map(TaskRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn result_table(results: &[SyncResult]) -> String {
    let rows: Vec<ResultRow> = results.iter().map(ResultRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

async fn show_task(
    store: &DatabaseStore,
    task_id: Uuid,
    with_results: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let task = store
        .get_task(task_id)
        .await?
        .ok_or_else(|| format!("Task '{task_id}' not found"))?;
    let results = if with_results {
        store.results_for_task(task_id).await?
    } else {
        Vec::new()
    };

    match output {
        OutputFormat::Json => {
            let value = if with_results {
                serde_json::json!({ "task": task, "results": results })
            } else {
                serde_json::to_value(&task)?
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Table => {
            print_task_summary(&task);
            if let Some(previous) = task.recovered_from {
                println!("  resumed from {}", style(previous).dim());
            }
            if with_results {
                if results.is_empty() {
                    println!("No results recorded.");
                } else {
                    println!("{}", result_table(&results));
                }
            }
        }
    }
    Ok(())
}

/// List recent tasks, or show one task.
pub(crate) async fn handle_status(
    task_id: Option<Uuid>,
    with_results: bool,
    limit: u64,
    output: OutputFormat,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(database_url).await?;

    if let Some(task_id) = task_id {
        return show_task(&store, task_id, with_results, output).await;
    }

    let tasks = store.list_tasks(limit).await?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
        OutputFormat::Table if tasks.is_empty() => {
            println!("No sync tasks recorded yet. Start one with: tandem sync");
        }
        OutputFormat::Table => println!("{}", task_table(&tasks)),
    }
    Ok(())
}
