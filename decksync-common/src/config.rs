//! Configuration loading and root folder resolution
//!
//! Resolution priority for every setting that can come from more than one place:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "DECKSYNC_ROOT_FOLDER";
/// Environment variable overriding `source.base_url`
pub const SOURCE_URL_ENV: &str = "DECKSYNC_SOURCE_URL";
/// Environment variable overriding `server.trigger_token`
pub const TRIGGER_TOKEN_ENV: &str = "DECKSYNC_TRIGGER_TOKEN";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "decksync.db";

/// Which known tournaments the deck phase revisits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckScope {
    /// Every tournament of the source (re-sync is idempotent)
    #[default]
    All,
    /// Only tournaments that have no decks stored yet
    MissingDecks,
}

/// Top-level TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[source]` section: the external tournament site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source identifier stored with every tournament (natural key part)
    pub name: String,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Minimum delay between two request starts
    pub min_interval_ms: u64,
    /// Cap on in-flight requests
    pub max_concurrent_requests: usize,
    /// Total attempts per fetch, including the first
    pub retry_attempts: u32,
    /// First backoff delay; doubles on every retry
    pub retry_base_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "tcg-events".to_string(),
            base_url: "https://tcg-events.example.com".to_string(),
            user_agent: concat!("decksync/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            min_interval_ms: 500,
            max_concurrent_requests: 2,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

/// `[sync]` section: run defaults, overridable per trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum listing pages fetched per run
    pub page_cap: u32,
    /// Concurrent fetch/resolve/persist workers
    pub worker_limit: usize,
    /// Wall-clock bound on a run
    pub run_timeout_secs: u64,
    pub deck_scope: DeckScope,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_cap: 10,
            worker_limit: 4,
            run_timeout_secs: 900,
            deck_scope: DeckScope::All,
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Bearer token required by the trigger endpoints (none = open)
    pub trigger_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5731,
            trigger_token: None,
        }
    }
}

impl TomlConfig {
    /// Apply environment variable overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(SOURCE_URL_ENV) {
            if !url.trim().is_empty() {
                info!("Source URL overridden by {}", SOURCE_URL_ENV);
                self.source.base_url = url.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var(TRIGGER_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.server.trigger_token = Some(token.trim().to_string());
            }
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source.name.trim().is_empty() {
            return Err(Error::Config("source.name must not be empty".to_string()));
        }
        if self.source.base_url.trim().is_empty() {
            return Err(Error::Config("source.base_url must not be empty".to_string()));
        }
        if self.source.retry_attempts == 0 {
            return Err(Error::Config("source.retry_attempts must be at least 1".to_string()));
        }
        if self.source.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "source.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.sync.worker_limit == 0 {
            return Err(Error::Config("sync.worker_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Load TOML config from `path`
///
/// A missing file is not an error: defaults are used and a warning is logged.
/// A file that exists but cannot be parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Default config file location for the platform (`<config dir>/decksync/decksync.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("decksync").join("decksync.toml"))
}

/// Resolves the root folder: CLI → ENV → TOML → compiled default
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self {
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

impl Default for RootFolderResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("decksync"))
        .unwrap_or_else(|| PathBuf::from("./decksync_data"))
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}
