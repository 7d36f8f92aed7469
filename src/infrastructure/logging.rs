//! Logging system configuration and initialization
//!
//! Console and/or daily-rolling file output, optional JSON formatting, and
//! `RUST_LOG` overriding the configured level. Dependencies that are chatty
//! at debug level are held down unless the level is `trace`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

const LOG_FILE_PREFIX: &str = "planner-scout.log";

/// Keeps the non-blocking file writers alive for the whole process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log directory from config, else `<data dir>/planner-scout/logs`
pub fn get_log_directory(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(ConfigManager::get_app_data_dir()?.join("logs")),
    }
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Filter from `RUST_LOG` if set, else from the configured level and module
/// overrides
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level).with_context(|| format!("Invalid log level '{}'", config.level))?;

    if !config.level.to_lowercase().contains("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive = format!("{module}={level}")
                .parse()
                .with_context(|| format!("Invalid module filter {module}={level}"))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut log_dir = None;

    if config.file_output {
        let dir = get_log_directory(config)?;
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&dir, config.max_files as usize)?;
        }

        let (file_writer, file_guard) = non_blocking(rolling::daily(&dir, LOG_FILE_PREFIX));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer.json().with_current_span(false).boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
        log_dir = Some(dir);
    }

    if config.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(ChronoUtc::rfc_3339())
            .with_target(false);
        layers.push(if config.json_format { console_layer.json().boxed() } else { console_layer.boxed() });
    }

    Registry::default()
        .with(layers)
        .with(build_env_filter(config)?)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(level = %config.level, json = config.json_format, log_dir = ?log_dir, "Logging system initialized");
    Ok(())
}

/// Delete the oldest rolled log files beyond `max_files`
pub fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut logs: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory {}", log_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    if logs.len() <= max_files {
        return Ok(0);
    }

    logs.sort_by(|a, b| b.0.cmp(&a.0));
    let mut removed = 0;
    for (_, path) in logs.into_iter().skip(max_files) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_filter_builds() {
        assert!(build_env_filter(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn bad_module_filter_is_reported() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("sqlx".to_string(), "loud!".to_string());
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_env_filter(&config).is_err());
        }
    }

    #[test]
    fn no_output_is_an_error() {
        let config = LoggingConfig { console_output: false, file_output: false, ..LoggingConfig::default() };
        assert!(init_logging_with_config(&config).is_err());
    }

    #[test]
    fn cleanup_keeps_newest_files() {
        let dir = tempdir().unwrap();
        for day in 1..=4 {
            let path = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-0{day}"));
            std::fs::write(&path, "x").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(15));
        }
        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 2).unwrap(), 2);
        assert!(dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-04")).exists());
        assert!(!dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-01")).exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
