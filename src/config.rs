// src/config.rs

//! Manages engine configuration: loading, resolving size values, and validation.

use crate::core::database::DEFAULT_LOCK_STRIPES;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

/// Selects the storage backend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Volatile in-memory store. Useful for tests and ephemeral caches.
    #[default]
    Memory,
    /// Durable on-disk store backed by sled.
    Sled,
}

/// A size that may be given as a plain byte count or as a string with a unit.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum SizeConfig {
    Bytes(u64),
    String(String),
}

/// Storage settings as written in the config file.
#[derive(Deserialize)]
struct RawStorageConfig {
    #[serde(default)]
    backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    path: String,
    #[serde(default = "default_block_cache_capacity")]
    block_cache_capacity: usize,
    #[serde(default = "default_sled_cache_config")]
    sled_cache_size: SizeConfig,
    #[serde(default = "default_flush_every_ms")]
    flush_every_ms: u64,
    #[serde(default = "default_lock_stripes")]
    lock_stripes: usize,
}

impl Default for RawStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            block_cache_capacity: default_block_cache_capacity(),
            sled_cache_size: default_sled_cache_config(),
            flush_every_ms: default_flush_every_ms(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    storage: RawStorageConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_storage_path() -> String {
    "spinelkv_data".to_string()
}
fn default_block_cache_capacity() -> usize {
    10_000
}
fn default_sled_cache_bytes() -> u64 {
    64 * 1024 * 1024 // 64 MB
}
fn default_sled_cache_config() -> SizeConfig {
    SizeConfig::Bytes(default_sled_cache_bytes())
}
fn default_flush_every_ms() -> u64 {
    500
}
fn default_lock_stripes() -> usize {
    DEFAULT_LOCK_STRIPES
}

/// Resolved storage settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory of the sled database. Ignored by the memory backend.
    pub path: String,
    /// Entries held by the memory backend's read cache. `0` disables it.
    pub block_cache_capacity: usize,
    /// Page cache size handed to sled, in bytes.
    pub sled_cache_bytes: u64,
    /// Background flush interval for sled. `0` disables periodic flushing.
    pub flush_every_ms: u64,
    /// Number of per-key writer lock stripes.
    pub lock_stripes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            block_cache_capacity: default_block_cache_capacity(),
            sled_cache_bytes: default_sled_cache_bytes(),
            flush_every_ms: default_flush_every_ms(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

/// Represents the final, validated, and resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load configuration from '{path}'"))
    }

    /// Parses, resolves and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        let raw_storage = raw_config.storage;

        let config = Config {
            log_level: raw_config.log_level,
            storage: StorageConfig {
                backend: raw_storage.backend,
                path: raw_storage.path,
                block_cache_capacity: raw_storage.block_cache_capacity,
                sled_cache_bytes: resolve_size(raw_storage.sled_cache_size)?,
                flush_every_ms: raw_storage.flush_every_ms,
                lock_stripes: raw_storage.lock_stripes,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        if self.storage.lock_stripes == 0 {
            return Err(anyhow!("storage.lock_stripes cannot be 0"));
        }
        if self.storage.backend == StorageBackend::Sled {
            if self.storage.path.trim().is_empty() {
                return Err(anyhow!(
                    "storage.path cannot be empty when the sled backend is selected"
                ));
            }
            if self.storage.sled_cache_bytes < 1024 * 1024 {
                warn!(
                    "low storage.sled_cache_size setting: {} bytes. This may cause performance issues.",
                    self.storage.sled_cache_bytes
                );
            }
        }
        if self.storage.backend == StorageBackend::Memory && self.storage.block_cache_capacity == 0
        {
            info!("Memory backend read cache is disabled (block_cache_capacity = 0).");
        }
        Ok(())
    }
}

/// Resolves a `SizeConfig` into a byte count.
fn resolve_size(cfg: SizeConfig) -> Result<u64> {
    match cfg {
        SizeConfig::Bytes(b) => Ok(b),
        SizeConfig::String(s) => {
            let s_lower = s.trim().to_lowercase();
            if let Some(val_str) = s_lower.strip_suffix("gb") {
                parse_size_string(&s, val_str, 1024 * 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('g') {
                parse_size_string(&s, val_str, 1024 * 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("mb") {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('m') {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("kb") {
                parse_size_string(&s, val_str, 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('k') {
                parse_size_string(&s, val_str, 1024)
            } else {
                s_lower.parse().with_context(|| format!("Invalid size value '{s}'. Must be a number (bytes) or have a unit (e.g., '512mb')."))
            }
        }
    }
}

/// Parses a string number with a unit (kb, mb, gb) and applies a multiplier.
fn parse_size_string(original_str: &str, value_str: &str, multiplier: u64) -> Result<u64> {
    let value: u64 = value_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in size value: '{original_str}'"))?;
    value.checked_mul(multiplier).ok_or_else(|| {
        anyhow!("size value '{original_str}' is too large (max is {} bytes)", u64::MAX)
    })
}
