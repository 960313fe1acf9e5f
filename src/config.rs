// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted user defaults, stored as `~/.tubegrab/config.json`.
//!
//! A missing file means defaults. Command-line flags override whatever is
//! loaded here.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::download::types::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_PROGRESS_INTERVAL, DEFAULT_RETRY_DELAY,
};
use crate::download::{DownloadConfig, LineSink, RetryPolicy, TransportSettings, DEFAULT_USER_AGENT};

/// Directory under the home directory holding tubegrab state.
const CONFIG_DIR_NAME: &str = ".tubegrab";

const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Preferred range size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Attempts per chunk before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Overrides the built-in user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Where `get` saves videos (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL.as_millis() as u64
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: None,
            output_dir: None,
        }
    }
}

impl Config {
    /// Replace nonsensical values with defaults, warning about each one.
    pub fn sanitized(mut self) -> Self {
        if self.chunk_size == 0 {
            tracing::warn!("chunk_size of 0 in config, using {}", DEFAULT_CHUNK_SIZE);
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if self.max_attempts == 0 {
            tracing::warn!("max_attempts of 0 in config, using {}", DEFAULT_MAX_ATTEMPTS);
            self.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if self.progress_interval_ms == 0 {
            self.progress_interval_ms = default_progress_interval_ms();
        }
        self
    }

    /// Engine tuning derived from this config.
    pub fn download_config(&self, sink: LineSink, rewrite_progress: bool) -> DownloadConfig {
        DownloadConfig {
            chunk_size: self.chunk_size,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            rewrite_progress,
            sink,
        }
    }

    /// HTTP client settings derived from this config.
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// Output directory, falling back to the current directory.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// `~/.tubegrab`
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// `~/.tubegrab/config.json`
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config, or defaults when none exists.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in config file {}", path.display()))?;
    Ok(config.sanitized())
}

/// Save the user config.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_path()?;
    save_config_to(&path, config)?;
    Ok(path)
}

/// Write via a temp file and rename so a crash never leaves half a config.
pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("tmp");
    {
        let mut temp_file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp config file {}", temp_path.display()))?;
        temp_file.write_all(content.as_bytes())?;
        temp_file
            .sync_all()
            .with_context(|| "Failed to sync temp config file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {} -> {}", temp_path.display(), path.display()))?;
    Ok(())
}
