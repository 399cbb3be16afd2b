//! Application configuration for feedsync.
//!
//! User config lives at `~/.feedsync/feedsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FeedSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "feedsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".feedsync";

/// Number of store-mutation workers when nothing else is configured.
pub const DEFAULT_WORKERS: usize = 5;

// ---------------------------------------------------------------------------
// Config structs (matching feedsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Mutation worker pool.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Feed download settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.feedsync/feedsync.db".into()
}

impl DatabaseConfig {
    /// Resolve the configured path, expanding `~/`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match self.path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    FeedSyncError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.path)),
        }
    }
}

/// `[dispatcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Worker count; also the ceiling on simultaneous store mutations.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the shared mutation queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}
fn default_queue_capacity() -> usize {
    256
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per feed download.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_redirects() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.feedsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.feedsync/feedsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FeedSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        FeedSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FeedSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FeedSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FeedSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the dispatcher cannot run with.
fn validate(config: &AppConfig) -> Result<()> {
    if config.dispatcher.workers == 0 {
        return Err(FeedSyncError::config("dispatcher.workers must be at least 1"));
    }
    if config.dispatcher.queue_capacity == 0 {
        return Err(FeedSyncError::config(
            "dispatcher.queue_capacity must be at least 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("queue_capacity"));
        assert!(toml_str.contains("feedsync.db"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.dispatcher.workers, DEFAULT_WORKERS);
        assert_eq!(parsed.fetch.timeout_secs, 60);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[database]
path = "/var/lib/feedsync/catalog.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.database.path, "/var/lib/feedsync/catalog.db");
        assert_eq!(config.dispatcher.workers, 5);
        assert_eq!(config.dispatcher.queue_capacity, 256);
    }

    #[test]
    fn absolute_db_path_is_not_expanded() {
        let db = DatabaseConfig {
            path: "/tmp/feeds.db".into(),
        };
        assert_eq!(db.resolved_path().unwrap(), PathBuf::from("/tmp/feeds.db"));
    }

    #[test]
    fn zero_workers_rejected() {
        let tmp = std::env::temp_dir().join(format!("fs_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&tmp, "[dispatcher]\nworkers = 0\n").unwrap();
        let result = load_config_from(&tmp);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("workers"));
        let _ = std::fs::remove_file(&tmp);
    }
}
