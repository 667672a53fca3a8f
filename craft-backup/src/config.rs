//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file with environment variable overrides.

use crate::utils::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub server: ServerLayoutConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root of the on-disk backup history (one subdirectory per server)
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Backups to retain per server after a batch backup (None = keep all)
    #[serde(default)]
    pub keep: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Delay between two `save query` attempts
    #[serde(default = "default_query_interval_ms")]
    pub query_interval_ms: u64,

    /// Maximum number of `save query` attempts
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,

    /// Upper bound for waiting on a single console line
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Upper bound for waiting on the server start banner
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLayoutConfig {
    /// Server installation directory inside the container
    #[serde(default = "default_server_dir")]
    pub server_dir: String,

    /// World directory name under `worlds/`
    #[serde(default = "default_world_name")]
    pub world_name: String,

    /// Loose files collected next to the world on every snapshot
    #[serde(default = "default_config_files")]
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum servers snapshotted at the same time
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

// Default values
fn default_backup_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("craft_backups")
}

fn default_query_interval_ms() -> u64 {
    100
}

fn default_query_retries() -> u32 {
    100
}

fn default_response_timeout_ms() -> u64 {
    5_000
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_server_dir() -> String {
    "/bedrock".to_string()
}

fn default_world_name() -> String {
    "Bedrock level".to_string()
}

fn default_config_files() -> Vec<String> {
    vec!["server.properties".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_parallel() -> usize {
    4
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            keep: None,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            query_interval_ms: default_query_interval_ms(),
            query_retries: default_query_retries(),
            response_timeout_ms: default_response_timeout_ms(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

impl Default for ServerLayoutConfig {
    fn default() -> Self {
        Self {
            server_dir: default_server_dir(),
            world_name: default_world_name(),
            config_files: default_config_files(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

impl ProtocolConfig {
    pub fn query_interval(&self) -> Duration {
        Duration::from_millis(self.query_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl ServerLayoutConfig {
    /// Absolute container path of `relative` under the server directory.
    pub fn container_path(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.server_dir.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }

    /// Container directory that holds every world.
    pub fn worlds_dir(&self) -> String {
        self.container_path("worlds")
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CRAFT_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os("CRAFT_BACKUP_DIR") {
            self.backup.backup_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("CRAFT_LOG_LEVEL") {
            self.log.level = level;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.protocol.query_retries == 0 {
            return Err(EngineError::Config("protocol.query_retries must be at least 1".into()));
        }
        if self.performance.max_parallel == 0 {
            return Err(EngineError::Config("performance.max_parallel must be at least 1".into()));
        }
        if self.server.world_name.is_empty() || self.server.world_name.contains('/') {
            return Err(EngineError::Config(format!(
                "server.world_name {:?} is not a single path segment",
                self.server.world_name
            )));
        }
        Ok(())
    }
}
