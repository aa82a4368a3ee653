//! Bootstrap configuration loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `BEVLY_CONFIG` environment variable
//! 3. `bevly.toml` in the platform config directory
//! 4. Built-in defaults (no file at all)
//!
//! Everything in the file is static for the life of the process.

use crate::model::MenuProvider;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BEVLY_CONFIG";

/// Any non-empty value disables the background sync
pub const SYNC_DISABLE_ENV_VAR: &str = "BEVLY_SYNC_DISABLE";

/// Top-level TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Venues to crawl
    #[serde(default)]
    pub providers: Vec<MenuProvider>,

    /// Metadata sources, in priority order
    #[serde(default)]
    pub metadata_sources: Vec<MetadataSourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Sync scheduling and resync/discard policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between scheduled (non-blocking) sync triggers
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Maximum age of a beverage's sync time before re-enrichment
    #[serde(default = "default_resync_interval_days")]
    pub resync_interval_days: u32,

    /// Minimum age of an unreferenced beverage before garbage collection
    #[serde(default = "default_discard_threshold_days")]
    pub discard_threshold_days: u32,

    /// Hours between garbage collection sweeps
    #[serde(default = "default_gc_interval_hours")]
    pub gc_interval_hours: u64,
}

/// One metadata search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSourceConfig {
    /// Source name; also the rating source and attribute namespace
    pub name: String,

    /// Search URL template; `{query}` is replaced by the encoded search name
    pub search_url: String,

    /// Trust ranking used to arbitrate field conflicts
    pub accuracy_score: i32,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Minimum name-match confidence for accepting a search result
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_database_path() -> PathBuf {
    get_default_data_folder().join("bevly.db")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    31
}

fn default_resync_interval_days() -> u32 {
    3
}

fn default_discard_threshold_days() -> u32 {
    35
}

fn default_gc_interval_hours() -> u64 {
    24
}

fn default_min_delay_ms() -> u64 {
    4500
}

fn default_max_delay_ms() -> u64 {
    18000
}

fn default_confidence_threshold() -> f64 {
    0.13
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            resync_interval_days: default_resync_interval_days(),
            discard_threshold_days: default_discard_threshold_days(),
            gc_interval_hours: default_gc_interval_hours(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            listen_addr: default_listen_addr(),
            logging: LoggingConfig::default(),
            sync: SyncConfig::default(),
            providers: Vec::new(),
            metadata_sources: Vec::new(),
        }
    }
}

impl TomlConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.sync.discard_threshold_days <= self.sync.resync_interval_days {
            return Err(Error::Config(format!(
                "discard_threshold_days ({}) must exceed resync_interval_days ({})",
                self.sync.discard_threshold_days, self.sync.resync_interval_days
            )));
        }
        if self.sync.interval_minutes == 0 {
            return Err(Error::Config("sync interval_minutes must be positive".to_string()));
        }
        if self.sync.gc_interval_hours == 0 {
            return Err(Error::Config("gc_interval_hours must be positive".to_string()));
        }
        for source in &self.metadata_sources {
            if source.min_delay_ms > source.max_delay_ms {
                return Err(Error::Config(format!(
                    "metadata source {}: min_delay_ms ({}) exceeds max_delay_ms ({})",
                    source.name, source.min_delay_ms, source.max_delay_ms
                )));
            }
            if !source.search_url.contains("{query}") {
                return Err(Error::Config(format!(
                    "metadata source {}: search_url lacks a {{query}} placeholder",
                    source.name
                )));
            }
        }
        let mut ids: Vec<&str> = self.providers.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::Config(format!("duplicate provider id: {}", dup[0])));
        }
        Ok(())
    }

    /// Whether the background sync should run
    ///
    /// The environment override exists so a read-only replica can share a
    /// config file with the crawling instance.
    pub fn sync_enabled(&self) -> bool {
        let disabled_by_env = std::env::var(SYNC_DISABLE_ENV_VAR)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        self.sync.enabled && !disabled_by_env
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("bevly").join("bevly.toml"))
        .filter(|p| p.exists())
}

/// Read and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration per the resolution order above
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            debug!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default data folder
fn get_default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bevly"))
        .unwrap_or_else(|| PathBuf::from("./bevly_data"))
}
