//! Configuration file support for tandem.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TANDEM_`, e.g., `TANDEM_DATABASE_URL`)
//! 3. Config file (~/.config/tandem/config.toml or ./tandem.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/tandem/tandem.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/tandem/tandem.db"  # optional, this is the default
//!
//! [source]
//! url = "https://shop.example.com/api"
//! token = "..."  # or use TANDEM_SOURCE_TOKEN env var
//! requests_per_minute = 120
//!
//! [target]
//! url = "https://erp.example.com/api/v2"
//! token = "..."  # or use TANDEM_TARGET_TOKEN env var
//! max_concurrent = 4
//! call_timeout = 30
//!
//! [sync]
//! batch_size = 50
//! retry_count = 3
//! retry_delay_ms = 500
//! skip_existing = false
//! conflict_strategy = "NEWEST_WINS"
//! ```
//!
//! Single-word keys can also be set from the environment; multi-word keys
//! such as `requests_per_minute` come from a config file.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use tandem::entity::prelude::{ConflictStrategy, SyncDirection};
use tandem::platform::{RateLimitConfig, rate_limits};
use tandem::sync::{
    DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS,
    SyncOptions,
};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// The Source platform.
    pub source: PlatformConfig,
    /// The Target platform.
    pub target: PlatformConfig,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// Connection settings of one platform.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the platform's REST API.
    pub url: Option<String>,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub requests_per_minute: u32,
    pub burst: u32,
    /// Outbound calls allowed in flight at once.
    pub max_concurrent: usize,
    /// Timeout of a single call, in seconds.
    pub call_timeout: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            requests_per_minute: rate_limits::DEFAULT_REQUESTS_PER_MINUTE,
            burst: rate_limits::DEFAULT_BURST,
            max_concurrent: rate_limits::DEFAULT_MAX_CONCURRENT,
            call_timeout: rate_limits::DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl PlatformConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            burst: self.burst,
            max_concurrent: self.max_concurrent,
            call_timeout: Duration::from_secs(self.call_timeout),
        }
    }
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    pub batch_size: usize,
    pub page_size: u32,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub inter_batch_delay_ms: u64,
    pub skip_existing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            direction: SyncDirection::default(),
            conflict_strategy: ConflictStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            inter_batch_delay_ms: 0,
            skip_existing: false,
        }
    }
}

impl SyncConfig {
    /// Options seeded from the configured defaults.
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            direction: self.direction,
            conflict_strategy: self.conflict_strategy,
            batch_size: self.batch_size,
            page_size: self.page_size,
            retry_count: self.retry_count,
            retry_delay_ms: self.retry_delay_ms,
            inter_batch_delay_ms: self.inter_batch_delay_ms,
            skip_existing: self.skip_existing,
            ..SyncOptions::default()
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/tandem/config.toml)
    /// 3. Local config file (./tandem.toml)
    /// 4. Environment variables with TANDEM_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "tandem") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("tandem.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./tandem.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., TANDEM_SOURCE_TOKEN -> source.token
        builder = builder.add_source(
            Environment::with_prefix("TANDEM")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("tandem.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/tandem` or `~/.local/state/tandem`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tandem").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.source.url.is_none());
        assert!(config.target.token.is_none());
        assert_eq!(config.sync.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.sync.direction, SyncDirection::SourceToTarget);
        assert_eq!(
            config.source.requests_per_minute,
            rate_limits::DEFAULT_REQUESTS_PER_MINUTE
        );
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(
            r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [source]
            url = "https://shop.example.com/api"
            token = "src_token"
            requests_per_minute = 120

            [target]
            url = "https://erp.example.com/api"
            max_concurrent = 2
            call_timeout = 5

            [sync]
            direction = "BIDIRECTIONAL"
            conflict_strategy = "MANUAL"
            batch_size = 25
            skip_existing = true
        "#,
        );

        assert_eq!(config.database.url.as_deref(), Some("sqlite:///tmp/test.db"));
        assert_eq!(config.source.token.as_deref(), Some("src_token"));
        assert_eq!(config.source.rate_limit().requests_per_minute, 120);
        assert_eq!(config.target.rate_limit().max_concurrent, 2);
        assert_eq!(config.target.rate_limit().call_timeout, Duration::from_secs(5));
        assert_eq!(config.sync.direction, SyncDirection::Bidirectional);
        assert_eq!(config.sync.conflict_strategy, ConflictStrategy::Manual);

        let options = config.sync.options();
        assert_eq!(options.batch_size, 25);
        assert_eq!(options.retry_count, DEFAULT_RETRY_COUNT);
        assert!(options.skip_existing);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_config_partial_override() {
        let config = parse(
            r#"
            [sync]
            retry_count = 5
        "#,
        );

        assert_eq!(config.sync.retry_count, 5);
        assert_eq!(config.sync.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.sync.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_config_merging_order() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[sync]\nbatch_size = 10\nretry_count = 2",
                FileFormat::Toml,
            ))
            .add_source(config::File::from_str(
                "[sync]\nbatch_size = 20",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();
        assert_eq!(config.sync.batch_size, 20);
        assert_eq!(config.sync.retry_count, 2);
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[sync\nbatch_size = 1", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let url = Config::default().database_url().unwrap();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("tandem.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/tandem"
        "#,
        );
        assert_eq!(
            config.database_url().as_deref(),
            Some("postgres://localhost/tandem")
        );
    }
}
