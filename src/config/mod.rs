//! Configuration management for rewatch
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Catalog service configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Enrichment pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// CSV ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Statistics configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Catalog service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog service
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Environment variable name holding the API credential
    #[serde(default = "default_catalog_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,

    /// Requests per second against the catalog service
    #[serde(default = "default_catalog_rate_limit")]
    pub rate_limit_per_sec: u32,

    /// User agent string
    #[serde(default = "default_catalog_user_agent")]
    pub user_agent: String,
}

/// Enrichment pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between batches in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Batch boundaries between checkpoint writes
    #[serde(default = "default_checkpoint_every_batches")]
    pub checkpoint_every_batches: usize,
}

/// CSV ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Header name of the title column
    #[serde(default = "default_title_column")]
    pub title_column: String,

    /// Header name of the watch-date column
    #[serde(default = "default_date_column")]
    pub date_column: String,
}

/// Statistics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Number of entries in the top-watched ranking
    #[serde(default = "default_top_count")]
    pub top_count: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for rewatch data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Directory holding persisted snapshots
    pub store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            pipeline: PipelineConfig::default(),
            ingest: IngestConfig::default(),
            stats: StatsConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            api_key_env: default_catalog_api_key_env(),
            timeout_secs: default_catalog_timeout(),
            rate_limit_per_sec: default_catalog_rate_limit(),
            user_agent: default_catalog_user_agent(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            checkpoint_every_batches: default_checkpoint_every_batches(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            title_column: default_title_column(),
            date_column: default_date_column(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_count: default_top_count(),
        }
    }
}

impl Config {
    /// Get the default base directory for rewatch (~/.rewatch)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rewatch")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            store_dir: base.join("store"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            store_dir: base.join("store"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
            config.validate()?;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the catalog API credential from environment
    pub fn catalog_api_key(&self) -> Option<String> {
        std::env::var(&self.catalog.api_key_env).ok()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.catalog.base_url)
            .map_err(|e| Error::Config(format!("catalog.base_url is not a valid URL: {}", e)))?;

        if self.catalog.timeout_secs == 0 {
            return Err(Error::Config(
                "catalog.timeout_secs must be positive".to_string(),
            ));
        }

        if self.catalog.rate_limit_per_sec == 0 {
            return Err(Error::Config(
                "catalog.rate_limit_per_sec must be positive".to_string(),
            ));
        }

        if self.pipeline.batch_size == 0 {
            return Err(Error::Config(
                "pipeline.batch_size must be positive".to_string(),
            ));
        }

        if self.pipeline.checkpoint_every_batches == 0 {
            return Err(Error::Config(
                "pipeline.checkpoint_every_batches must be positive".to_string(),
            ));
        }

        if self.ingest.title_column.trim().is_empty() || self.ingest.date_column.trim().is_empty() {
            return Err(Error::Config(
                "ingest column names must not be empty".to_string(),
            ));
        }

        if self.stats.top_count == 0 {
            return Err(Error::Config("stats.top_count must be positive".to_string()));
        }

        Ok(())
    }
}
