//! Tandem CLI - keeps products and orders in sync between two platforms.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tandem::entity::prelude::{ConflictStrategy, EntityType, PlatformSide, SyncDirection};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::status::OutputFormat;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(version)]
#[command(about = "Bidirectional entity synchronization between two platforms")]
#[command(
    long_about = "Tandem reconciles products and orders between a Source and a Target \
platform. It keeps a durable mapping between the identifiers of both sides, resolves \
conflicting edits, and checkpoints every batch so interrupted runs can be resumed."
)]
#[command(after_long_help = r#"EXAMPLES
    Push every product from Source to Target:
        $ tandem sync --type product

    Reconcile products and orders in both directions:
        $ tandem sync --type product --type order --direction bidirectional

    Show the last tasks, then the results of one:
        $ tandem status
        $ tandem status 7f9c0c1e-... --results

    Resume a task that was interrupted:
        $ tandem recover 7f9c0c1e-...

    Feed a change notification received from the Source platform:
        $ tandem webhook source < event.json

CONFIGURATION
    Tandem reads configuration from:
      1. ~/.config/tandem/config.toml (or $XDG_CONFIG_HOME/tandem/config.toml)
      2. ./tandem.toml
      3. Environment variables (TANDEM_* prefix, e.g., TANDEM_SOURCE_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    TANDEM_DATABASE_URL      Database connection string (default: ~/.local/state/tandem/tandem.db)
    TANDEM_SOURCE_URL        Base URL of the Source platform API
    TANDEM_SOURCE_TOKEN      Access token for the Source platform
    TANDEM_TARGET_URL        Base URL of the Target platform API
    TANDEM_TARGET_TOKEN      Access token for the Target platform
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sync task and wait for it to finish
    Sync(SyncArgs),
    /// List recent tasks or show one task
    Status {
        /// Task to show (lists recent tasks if omitted)
        task_id: Option<Uuid>,

        /// Also list the per-entity results of the task
        #[arg(short, long, requires = "task_id")]
        results: bool,

        /// Number of tasks to list
        #[arg(short = 'n', long, default_value_t = tandem::sync::DEFAULT_TASK_LIST_LIMIT)]
        limit: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Resume an interrupted task from its last checkpoint
    Recover {
        /// Task to resume
        task_id: Uuid,
    },
    /// Reconcile one entity from a platform change notification
    Webhook {
        /// Platform the notification came from
        platform: PlatformSide,

        /// File holding the notification body (reads stdin if omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

/// Options of a sync run. Unset values come from the `[sync]` config section.
#[derive(Debug, Clone, clap::Args)]
struct SyncArgs {
    /// Entity types to sync, in order (default: product)
    #[arg(short = 't', long = "type")]
    entity_types: Vec<EntityType>,

    /// Sync direction (source-to-target, target-to-source, bidirectional)
    #[arg(short, long)]
    direction: Option<SyncDirection>,

    /// How to settle records changed on both sides (source-wins, target-wins, newest-wins, manual)
    #[arg(short = 'C', long)]
    conflict_strategy: Option<ConflictStrategy>,

    /// Entities per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Retries per outbound call for retryable errors
    #[arg(short, long)]
    retry_count: Option<u32>,

    /// Base delay before the first retry, in milliseconds
    #[arg(long = "retry-delay", value_name = "MS")]
    retry_delay_ms: Option<u64>,

    /// Skip entities that already have a mapping (pass `false` to override the config)
    #[arg(short = 'k', long, num_args = 0..=1, default_missing_value = "true")]
    skip_existing: Option<bool>,

    /// Only sync entities updated at or after this time (RFC 3339)
    #[arg(long)]
    since: Option<chrono::DateTime<chrono::Utc>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("tandem=info,tandem_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Failed to determine database URL; set TANDEM_DATABASE_URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Sync(args) => {
            commands::sync::handle_sync(args, &config, &database_url).await?;
        }
        Commands::Status {
            task_id,
            results,
            limit,
            output,
        } => {
            commands::status::handle_status(task_id, results, limit, output, &database_url)
                .await?;
        }
        Commands::Recover { task_id } => {
            commands::sync::handle_recover(task_id, &config, &database_url).await?;
        }
        Commands::Webhook { platform, file } => {
            commands::webhook::handle_webhook(platform, file, &config, &database_url).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
