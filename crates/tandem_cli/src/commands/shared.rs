//! Wiring shared by the commands that run sync tasks.

use std::sync::Arc;

use console::style;
use tandem::entity::prelude::{PlatformSide, TaskStatus};
use tandem::http::reqwest_transport::ReqwestTransport;
use tandem::platform::{
    AuthProvider, CatalogTranslator, PlatformClient, RateLimitedClient, RestPlatformClient,
    StaticTokenProvider,
};
use tandem::store::DatabaseStore;
use tandem::sync::{ProgressCallback, SyncOrchestrator, SyncTask};

use crate::config::{Config, PlatformConfig};

/// Open the database and bring its schema up to date.
pub(crate) async fn open_store(
    database_url: &str,
) -> Result<Arc<DatabaseStore>, Box<dyn std::error::Error>> {
    let db = tandem::connect_and_migrate(database_url).await?;
    Ok(Arc::new(DatabaseStore::new(db)))
}

/// Build the rate-limited REST client of one side.
fn platform_client(
    side: PlatformSide,
    config: &PlatformConfig,
) -> Result<(Arc<dyn PlatformClient>, Arc<dyn AuthProvider>), Box<dyn std::error::Error>> {
    let url = config.url.as_deref().ok_or_else(|| {
        format!(
            "No URL configured for the {side} platform. Set TANDEM_{}_URL or [{side}] url.",
            side.to_string().to_uppercase()
        )
    })?;
    let token = config.token.clone().unwrap_or_else(|| {
        tracing::warn!(platform = %side, "No token configured; requests are sent unauthenticated");
        String::new()
    });

    let limits = config.rate_limit();
    let auth: Arc<dyn AuthProvider> = Arc::new(StaticTokenProvider::new(token));
    let transport = Arc::new(ReqwestTransport::with_timeout(limits.call_timeout)?);
    let rest = RestPlatformClient::new(side.to_string(), url, transport, Arc::clone(&auth))?;
    let client: Arc<dyn PlatformClient> = Arc::new(RateLimitedClient::new(rest, &limits));
    Ok((client, auth))
}

/// Compose the orchestrator from configuration.
pub(crate) fn build_orchestrator(
    config: &Config,
    store: Arc<DatabaseStore>,
    on_progress: Option<ProgressCallback>,
) -> Result<Arc<SyncOrchestrator>, Box<dyn std::error::Error>> {
    let (source, source_auth) = platform_client(PlatformSide::Source, &config.source)?;
    let (target, target_auth) = platform_client(PlatformSide::Target, &config.target)?;

    let mut builder = SyncOrchestrator::builder()
        .source(source)
        .target(target)
        .source_auth(source_auth)
        .target_auth(target_auth)
        .translator(Arc::new(CatalogTranslator::new()))
        .store(store)
        .webhook_options(config.sync.options());
    if let Some(callback) = on_progress {
        builder = builder.on_progress(callback);
    }
    Ok(builder.build()?)
}

/// Print the outcome of a finished task.
pub(crate) fn print_task_summary(task: &SyncTask) {
    let c = &task.counters;
    let marker = match task.status {
        TaskStatus::Completed if c.failed == 0 => style("✓").green(),
        TaskStatus::Completed => style("!").yellow(),
        _ => style("✗").red(),
    };

    println!(
        "{} Task {} {} - {} processed: {} created, {} updated, {} skipped, {} failed",
        marker,
        task.id,
        task.status,
        c.processed,
        c.created,
        c.updated,
        c.skipped,
        c.failed
    );
    if !task.conflicts.is_empty() {
        println!("  {} field conflict(s) recorded", task.conflicts.len());
    }
    for error in &task.errors {
        let entity = error
            .entity_id
            .as_deref()
            .map(|id| format!(" [{id}]"))
            .unwrap_or_default();
        println!("  {} {}{}: {}", style(error.code).dim(), error.severity, entity, error.message);
    }
}
