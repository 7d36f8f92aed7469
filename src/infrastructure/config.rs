//! Configuration infrastructure
//!
//! An [`AppConfig`] tree persisted as pretty JSON under the platform config
//! directory. Environment variables prefixed with `PLANNER_SCOUT__` override
//! file values (`PLANNER_SCOUT__SYNC__MIN_REQUEST_INTERVAL_MS=2000`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::infrastructure::parsing::ParsingConfig;

const APP_DIR_NAME: &str = "planner-scout";
const CONFIG_FILE_NAME: &str = "planner_scout_config.json";
const ENV_PREFIX: &str = "PLANNER_SCOUT";

/// Default values, kept in one place so docs and `Default` impls agree
pub mod defaults {
    pub const MIN_REQUEST_INTERVAL_MS: u64 = 5_000;
    pub const DEDUP_TTL_SECS: u64 = 300;
    pub const NAVIGATION_COOLDOWN_MS: u64 = 2_000;
    pub const CHANNEL_TIMEOUT_MS: u64 = 10_000;
    pub const QUEUE_CAPACITY: usize = 256;

    pub const REMOTE_BASE_URL: &str = "http://localhost:8000";
    pub const REMOTE_TIMEOUT_SECONDS: u64 = 30;
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_MAX_FILES: u32 = 7;
    pub const LOG_AUTO_CLEANUP: bool = true;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from file: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub extraction: ParsingConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Orchestrator timing and capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between outbound remote calls
    pub min_request_interval_ms: u64,

    /// How long a sent identifier suppresses re-sending
    pub dedup_ttl_secs: u64,

    /// Repeat navigations to the same URL within this window are ignored
    pub navigation_cooldown_ms: u64,

    /// Upper bound on one page round-trip (eligibility check or extraction)
    pub channel_timeout_ms: u64,

    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: defaults::MIN_REQUEST_INTERVAL_MS,
            dedup_ttl_secs: defaults::DEDUP_TTL_SECS,
            navigation_cooldown_ms: defaults::NAVIGATION_COOLDOWN_MS,
            channel_timeout_ms: defaults::CHANNEL_TIMEOUT_MS,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub const fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub const fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub const fn navigation_cooldown(&self) -> Duration {
        Duration::from_millis(self.navigation_cooldown_ms)
    }

    pub const fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

/// Remote collection service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub project_id: String,
    pub user_id: String,

    /// Opaque bearer token; obtaining and refreshing it happens elsewhere
    pub access_token: Option<String>,

    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::REMOTE_BASE_URL.to_string(),
            project_id: String::new(),
            user_id: String::new(),
            access_token: None,
            timeout_seconds: defaults::REMOTE_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; defaults to `<data dir>/planner-scout/database/planner_scout.db`
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(ConfigManager::get_app_data_dir()?.join("database").join("planner_scout.db")),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,

    /// Directory for log files; defaults to `<data dir>/planner-scout/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep
    pub max_files: u32,

    /// Delete old log files on startup
    pub auto_cleanup_logs: bool,

    /// Per-module level overrides (e.g. "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let module_filters = [("sqlx", "warn"), ("reqwest", "info"), ("hyper", "warn"), ("html5ever", "warn")]
            .into_iter()
            .map(|(module, level)| (module.to_string(), level.to_string()))
            .collect();

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters,
        }
    }
}

impl AppConfig {
    /// Load a file and layer environment overrides on top
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sync = &self.sync;
        for (name, value) in [
            ("sync.min_request_interval_ms", sync.min_request_interval_ms),
            ("sync.dedup_ttl_secs", sync.dedup_ttl_secs),
            ("sync.channel_timeout_ms", sync.channel_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::validation(format!("{name} must be greater than 0")));
            }
        }

        if sync.queue_capacity == 0 {
            return Err(ConfigError::validation("sync.queue_capacity must be greater than 0"));
        }

        if self.extraction.max_attempts == 0 {
            return Err(ConfigError::validation("extraction.max_attempts must be greater than 0"));
        }

        if self.remote.base_url.trim().is_empty() {
            return Err(ConfigError::validation("remote.base_url must not be empty"));
        }

        if url::Url::parse(&self.remote.base_url).is_err() {
            return Err(ConfigError::validation(format!("remote.base_url is not a URL: {}", self.remote.base_url)));
        }

        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn get_config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME))
    }

    pub fn get_app_data_dir() -> Result<PathBuf> {
        Ok(dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME))
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        Ok(Self { config_path: Self::get_config_dir()?.join(CONFIG_FILE_NAME) })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Load configuration, creating the default file if it doesn't exist
    ///
    /// A file that no longer parses is copied to `*.json.corrupted` and
    /// replaced by defaults.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("Configuration file could not be parsed: {}", parse_error);

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                self.reset_to_defaults().await
            }
        }
    }

    /// [`Self::load_config`] followed by environment overrides and validation
    pub async fn load_layered(&self) -> Result<AppConfig> {
        self.load_config().await?;
        AppConfig::from_file(&self.config_path)
            .with_context(|| format!("Invalid configuration in {}", self.config_path.display()))
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        let default_config = AppConfig::default();
        self.save_config(&default_config)
            .await
            .context("Failed to save default configuration")?;
        info!("Configuration reset to defaults");
        Ok(default_config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
