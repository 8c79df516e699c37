//! Command implementations for the airq CLI.

pub mod collect;
pub mod importance;
pub mod info;
pub mod predict;
pub mod train;
pub mod versions;

use airq_core::{AirQualityService, AirqConfig, ObservationBuffer, ObservationRecord, Target, VersionTag};
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Configuration shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: AirqConfig,
}

impl CommandContext {
    /// Load an explicit config file, or discover the global and local ones.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let mut config = AirqConfig::load_from_file(path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?;
                config.apply_env(|key| std::env::var(key).ok());
                config
            }
            None => AirqConfig::discover_and_load().context("Failed to load configuration")?,
        };
        Ok(Self { config })
    }

    pub fn service(&self) -> Result<AirQualityService> {
        AirQualityService::from_config(&self.config).context("Failed to set up the estimation service")
    }

    /// Service with `version` (or the latest version) loaded.
    pub fn loaded_service(&self, version: Option<&str>) -> Result<AirQualityService> {
        let service = self.service()?;
        let version = version.map(VersionTag::parse).transpose()?;
        if !service.load(version.as_ref()) {
            match version {
                Some(v) => bail!("Model version {v} could not be loaded."),
                None => bail!(
                    "No trained models found in {}. Run `airq train` first.",
                    self.config.artifact_root.display()
                ),
            }
        }
        Ok(service)
    }

    pub fn buffer(&self) -> Result<ObservationBuffer> {
        ObservationBuffer::load_jsonl(&self.config.buffer_path, self.config.buffer.clone())
            .with_context(|| format!("Failed to read observation buffer: {}", self.config.buffer_path.display()))
    }
}

pub fn parse_target(raw: &str) -> Result<Target> {
    raw.parse::<Target>().map_err(anyhow::Error::msg)
}

/// Read a `.jsonl` file as many records, anything else as one JSON record.
pub fn read_records(path: &Path) -> Result<Vec<ObservationRecord>> {
    let is_jsonl = path.extension().is_some_and(|ext| ext == "jsonl");
    let records = if is_jsonl {
        airq_core::read_jsonl_records(path)
    } else {
        airq_core::read_json_record(path).map(|r| vec![r])
    };
    records.with_context(|| format!("Failed to read records: {}", path.display()))
}
