//! Feed a platform change notification to the orchestrator.

use std::io::Read;
use std::path::PathBuf;

use console::style;
use tandem::entity::prelude::PlatformSide;
use tandem::sync::SyncResult;

use crate::commands::shared::{build_orchestrator, open_store};
use crate::config::Config;

fn read_body(file: Option<PathBuf>) -> std::io::Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path),
        None => {
            let mut body = Vec::new();
            std::io::stdin().lock().read_to_end(&mut body)?;
            Ok(body)
        }
    }
}

fn print_result(result: &SyncResult) {
    if result.success {
        println!(
            "{} {} {}: {} ({} / {})",
            style("✓").green(),
            result.entity_type,
            result.entity_id,
            result.action,
            result.source_id.as_deref().unwrap_or("-"),
            result.target_id.as_deref().unwrap_or("-")
        );
    } else {
        let code = result
            .error_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "FAILED".to_string());
        println!(
            "{} {} {}: {} failed with {}",
            style("✗").red(),
            result.entity_type,
            result.entity_id,
            result.action,
            style(code).dim()
        );
    }
}

/// Reconcile the entity a notification names.
pub(crate) async fn handle_webhook(
    platform: PlatformSide,
    file: Option<PathBuf>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = read_body(file)?;
    if body.is_empty() {
        return Err("Notification body is empty".into());
    }

    let store = open_store(database_url).await?;
    let orchestrator = build_orchestrator(config, store, None)?;

    let result = orchestrator.ingest_webhook(platform, &body).await?;
    tracing::info!(
        platform = %platform,
        entity_type = %result.entity_type,
        entity_id = %result.entity_id,
        action = %result.action,
        success = result.success,
        "Webhook processed"
    );
    print_result(&result);

    if !result.success {
        return Err(format!("Failed to reconcile {}", result.entity_id).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn read_body_from_file() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("tandem-webhook-{nonce}.json"));
        std::fs::write(&path, br#"{"entity_type":"product","entity_id":"p-1"}"#)
            .expect("temp file should be writable");

        let body = read_body(Some(path.clone())).expect("file should be readable");
        assert!(body.starts_with(b"{\"entity_type\""));

        std::fs::remove_file(&path).expect("temp file should be removable");
    }

    #[test]
    fn read_body_from_missing_file_fails() {
        let path = std::env::temp_dir().join("tandem-webhook-does-not-exist.json");
        assert!(read_body(Some(path)).is_err());
    }
}
