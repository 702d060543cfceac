//! Configuration management for adscanner
//!
//! All configuration is loaded from `./config/adscanner.toml` (or the path given
//! with `--config`). No hardcoded defaults exist in source code - all defaults
//! are in the config template.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/adscanner.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/adscanner.toml");

/// Placeholder replaced by the probed domain in `probe.url_template`
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    ZeroValue { field: String },

    #[error("Score bands overlap or are out of order: deep_min={deep_min}, deep_max={deep_max}, block={block} (need deep_min <= deep_max < block)")]
    InvalidBands { deep_min: i32, deep_max: i32, block: i32 },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_source: LogSourceConfig,
    pub probe: ProbeConfig,
    pub pool: PoolConfig,
    pub bands: Bands,
    pub scoring: ScoringWeights,
    pub lists: DomainLists,
    pub rules: RulesConfig,
}

/// AdGuard Home query log endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LogSourceConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Entries requested per run, 0 leaves the server default
    #[serde(default)]
    pub limit: u32,
}

impl LogSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Verification probe settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// URL probed for each deep-check domain, `{domain}` is substituted verbatim
    pub url_template: String,
    /// Applies to connect and to the whole request
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Exclusive upper bound on the content length of a tracking pixel
    pub max_pixel_bytes: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the probe URL for a domain
    pub fn url_for(&self, domain: &str) -> String {
        self.url_template.replace(DOMAIN_PLACEHOLDER, domain)
    }
}

/// Bounded worker pool for the verification stage
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum probes in flight at once
    pub workers: usize,
    /// Probes that may wait for a worker; beyond this the submitter runs the probe itself
    pub queue_depth: usize,
}

/// Score thresholds for the band router
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Bands {
    /// Scores at or above this are blocked without verification
    pub block: i32,
    /// Inclusive lower bound of the deep-check band
    pub deep_min: i32,
    /// Inclusive upper bound of the deep-check band, must be below `block`
    pub deep_max: i32,
}

/// Weights applied by the static scorer
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScoringWeights {
    pub whitelist_penalty: i32,
    pub cdn_penalty: i32,
    pub keyword_bonus: i32,
    pub compound_bonus: i32,
    pub long_label_bonus: i32,
    pub very_long_label_bonus: i32,
    pub digit_ratio_bonus: i32,
    pub no_vowel_bonus: i32,
    pub no_hyphen_bonus: i32,
}

/// Substring lists consulted by the static scorer
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DomainLists {
    pub whitelist: Vec<String>,
    pub cdn_whitelist: Vec<String>,
    pub black_keywords: Vec<String>,
    /// Must appear together with one of `compound_markers` for the compound bonus
    pub compound_trigger: String,
    pub compound_markers: Vec<String>,
}

/// Rule store location
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    pub path: PathBuf,
}

impl AppConfig {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration
    pub fn default_template() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Log source
        if self.log_source.url.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "log_source.url".to_string(),
            });
        }
        if !self.log_source.url.starts_with("http://") && !self.log_source.url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl {
                field: "log_source.url".to_string(),
                url: self.log_source.url.clone(),
            });
        }
        if self.log_source.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "log_source.user_agent".to_string(),
            });
        }
        if self.log_source.timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "log_source.timeout_secs".to_string(),
            });
        }

        // Probe
        if !self.probe.url_template.contains(DOMAIN_PLACEHOLDER) {
            return Err(ConfigError::InvalidUrl {
                field: "probe.url_template (must contain {domain})".to_string(),
                url: self.probe.url_template.clone(),
            });
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "probe.timeout_ms".to_string(),
            });
        }
        if self.probe.max_pixel_bytes == 0 {
            return Err(ConfigError::ZeroValue {
                field: "probe.max_pixel_bytes".to_string(),
            });
        }

        // Pool
        if self.pool.workers == 0 {
            return Err(ConfigError::ZeroValue {
                field: "pool.workers".to_string(),
            });
        }

        // Bands must be ordered and disjoint
        let b = &self.bands;
        if b.deep_min > b.deep_max || b.deep_max >= b.block {
            return Err(ConfigError::InvalidBands {
                deep_min: b.deep_min,
                deep_max: b.deep_max,
                block: b.block,
            });
        }

        if self.lists.compound_trigger.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "lists.compound_trigger".to_string(),
            });
        }

        if self.rules.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "rules.path".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the given location
    pub fn create_default_config(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
