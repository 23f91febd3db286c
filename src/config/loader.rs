//! Configuration loading with multi-layer merge

use super::connection::ConnectionConfig;
use super::error::{ConfigError, MAX_CONCURRENCY, MIN_CONCURRENCY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level joplin-replace configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacerConfig {
    /// How to reach Joplin
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Defaults for the replace command
    #[serde(default)]
    pub replace: ReplaceDefaults,

    /// Backoff for failed requests
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Replace command defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceDefaults {
    /// Concurrent note updates
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause after each note update, per worker
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Match case by default
    #[serde(default)]
    pub case_sensitive: bool,

    /// Only touch notes in this notebook
    pub notebook: Option<String>,

    /// Whole-run deadline in seconds (default: twice the request timeout)
    pub run_timeout_secs: Option<u64>,
}

fn default_concurrency() -> usize {
    5
}

fn default_delay_ms() -> u64 {
    100
}

impl Default for ReplaceDefaults {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            delay_ms: default_delay_ms(),
            case_sensitive: false,
            notebook: None,
            run_timeout_secs: None,
        }
    }
}

/// Retry settings for store requests
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each further retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Add up to 25% random jitter to each delay
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            jitter: false,
        }
    }
}

impl ReplacerConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/joplin-replace/config.toml
    /// 3. An explicit `--config` file, which must exist
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                layers.push(user_config_path);
            }
        }

        if let Some(path) = explicit {
            layers.push(PathBuf::from(shellexpand::tilde(path).as_ref()));
        }

        Self::load_layers(&layers)
    }

    /// Overlay config files in order; any key a later file sets wins, even if it
    /// restates a built-in default
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            let layer = Self::read_layer(path)
                .with_context(|| format!("loading {}", path.display()))?;
            overlay(&mut merged, layer);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("combining configuration files")
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::load_layers(&[path.to_path_buf()])
    }

    /// Read one file as a raw table, rejecting unknown keys and bad values up front
    fn read_layer(path: &Path) -> Result<toml::Table> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("parsing {}", path.display()))?;
        toml::Value::Table(table.clone())
            .try_into::<Self>()
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(table)
    }

    /// Get the user config path (~/.config/joplin-replace/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("joplin-replace/config.toml"))
    }

    /// Reject settings that cannot produce a sane run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingToken);
        }
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.connection.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.connection.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.replace.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.replace.concurrency,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        Ok(())
    }

    /// Pause each worker takes after a write
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.replace.delay_ms)
    }

    /// Deadline for the whole run
    pub fn run_timeout(&self) -> Duration {
        let secs = self
            .replace
            .run_timeout_secs
            .unwrap_or(self.connection.timeout_secs * 2);
        Duration::from_secs(secs)
    }
}

/// Deep-merge `layer` into `base`; tables merge key by key, anything else replaces
fn overlay(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                overlay(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}
