//! Configuration file support.
//!
//! Precedence, lowest first:
//! 1. Defaults
//! 2. Global config (~/.airq/config.toml)
//! 3. Local config (./airq.toml)
//! 4. Environment (`AIRQ_ARTIFACT_ROOT`, `AIRQ_LOG_LEVEL`)

use crate::buffer::BufferConfig;
use crate::error::{AirqError, AirqResult};
use crate::trainer::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_ARTIFACT_ROOT: &str = "AIRQ_ARTIFACT_ROOT";
pub const ENV_LOG_LEVEL: &str = "AIRQ_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirqConfig {
    /// Directory holding one subdirectory per saved model version.
    pub artifact_root: PathBuf,
    /// JSONL file backing the observation buffer.
    pub buffer_path: PathBuf,
    pub log_level: Option<String>,
    pub trainer: TrainerConfig,
    pub buffer: BufferConfig,
}

impl Default for AirqConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("data/models"),
            buffer_path: PathBuf::from("data/observations.jsonl"),
            log_level: None,
            trainer: TrainerConfig::default(),
            buffer: BufferConfig::default(),
        }
    }
}

fn read_table(path: &Path) -> AirqResult<toml::Table> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AirqError::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| AirqError::Config(format!("{}: {}", path.display(), e)))
}

/// Overlay `other` onto `base`, recursing into nested tables.
fn merge_tables(base: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

impl AirqConfig {
    /// Load configuration from a single TOML file, filling gaps with defaults.
    pub fn load_from_file(path: &Path) -> AirqResult<Self> {
        if !path.exists() {
            return Err(AirqError::Config(format!("configuration file not found: {}", path.display())));
        }
        let table = read_table(path)?;
        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e| AirqError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> AirqResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AirqError::Config(format!("failed to serialize: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".airq")
            .join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from("airq.toml")
    }

    /// Global then local file, then environment overrides.
    pub fn discover_and_load() -> AirqResult<Self> {
        let mut config = Self::load_layered(&[Self::default_global_path(), Self::default_local_path()])?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge the given files in order; later files override earlier ones key by key.
    /// Missing files are skipped.
    pub fn load_layered(paths: &[PathBuf]) -> AirqResult<Self> {
        let mut merged = toml::Table::new();
        for path in paths.iter().filter(|p| p.exists()) {
            merge_tables(&mut merged, read_table(path)?);
        }
        let config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| AirqError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_ARTIFACT_ROOT).filter(|v| !v.trim().is_empty()) {
            self.artifact_root = PathBuf::from(root);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.log_level = Some(level);
        }
    }

    pub fn validate(&self) -> AirqResult<()> {
        self.trainer.validate()?;
        if self.buffer.capacity == 0 {
            return Err(AirqError::Config("buffer.capacity must be >= 1".to_string()));
        }
        Ok(())
    }
}
