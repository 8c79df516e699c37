//! Versioned, immutable model artifacts on disk.
//!
//! A version is written into a hidden staging directory and renamed into place
//! once every file is on disk, so readers only ever see complete versions.

use crate::bank::{ModelBank, TrainedModel};
use crate::error::{AirqError, AirqResult};
use crate::features::FeatureSchema;
use crate::layout::{ArtifactLayout, MANIFEST_FILE, SCHEMA_FILE};
use crate::models::{Regressor, StandardScaler};
use crate::target::Target;
use crate::trainer::TargetMetrics;
use crate::version::VersionTag;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Schema,
    Model,
    Scaler,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// File name relative to the version directory.
    pub file: String,
    pub sha256: String,
}

/// Written last into every version; records what the version holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: VersionTag,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    /// Fingerprint of the training batch.
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub samples: usize,
    pub schema_len: usize,
    pub targets: BTreeMap<Target, TargetMetrics>,
    pub artifacts: Vec<ArtifactFile>,
}

pub fn sha256_file(path: &Path) -> AirqResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Write and fsync, so a renamed version never holds truncated files.
fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> AirqResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Flush directory entries (created files, renames) to disk.
#[cfg(unix)]
fn sync_dir(path: &Path) -> AirqResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> AirqResult<()> {
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> AirqResult<T> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AirqError::Artifact(format!("failed to parse {}: {e}", path.display())))
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: ArtifactLayout,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { layout: ArtifactLayout::new(root) }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Persist every trained target of `bank` plus its schema as `version`.
    ///
    /// Versions are immutable: saving over an existing version is an error.
    pub fn save(&self, bank: &ModelBank, version: &VersionTag) -> AirqResult<ArtifactManifest> {
        let final_dir = self.layout.version_dir(version);
        if final_dir.exists() {
            return Err(AirqError::Artifact(format!("version {version} already exists")));
        }
        self.layout.ensure_root()?;

        let staging = self.layout.staging_dir(version);
        std::fs::create_dir(&staging)?;

        let written = Self::write_version(&staging, bank, version).and_then(|manifest| {
            sync_dir(&staging)?;
            std::fs::rename(&staging, &final_dir)?;
            sync_dir(self.layout.root())?;
            Ok(manifest)
        });

        match written {
            Ok(manifest) => {
                info!(version = %version, targets = manifest.targets.len(), "Saved model bank");
                Ok(manifest)
            }
            Err(err) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
                }
                Err(err)
            }
        }
    }

    fn write_version(dir: &Path, bank: &ModelBank, version: &VersionTag) -> AirqResult<ArtifactManifest> {
        let mut artifacts = Vec::new();

        let mut record = |kind: ArtifactKind, target: Option<Target>, file: String| -> AirqResult<()> {
            let sha256 = sha256_file(&dir.join(&file))?;
            artifacts.push(ArtifactFile { kind, target, file, sha256 });
            Ok(())
        };

        write_json(dir.join(SCHEMA_FILE), bank.schema())?;
        record(ArtifactKind::Schema, None, SCHEMA_FILE.to_string())?;

        for (target, trained) in bank.iter() {
            let model_file = ArtifactLayout::model_file(target);
            write_json(dir.join(&model_file), &trained.model)?;
            record(ArtifactKind::Model, Some(target), model_file)?;

            let scaler_file = ArtifactLayout::scaler_file(target);
            write_json(dir.join(&scaler_file), &trained.scaler)?;
            record(ArtifactKind::Scaler, Some(target), scaler_file)?;
        }

        let manifest = ArtifactManifest {
            version: version.clone(),
            created_at: Utc::now(),
            trained_at: bank.trained_at(),
            batch_id: bank.batch_id().map(str::to_string),
            samples: bank.samples(),
            schema_len: bank.schema().len(),
            targets: bank.metrics(),
            artifacts,
        };
        write_json(dir.join(MANIFEST_FILE), &manifest)?;
        Ok(manifest)
    }

    /// Complete versions in ascending order.
    ///
    /// Hidden entries (staging directories) and directories without both a schema
    /// and a manifest are ignored.
    pub fn versions(&self) -> AirqResult<Vec<VersionTag>> {
        let dir = match std::fs::read_dir(self.layout.root()) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if ArtifactLayout::is_hidden(&name) || !entry.path().is_dir() {
                continue;
            }
            let Ok(version) = VersionTag::parse(&name) else {
                continue;
            };
            if self.layout.schema_path(&version).is_file() && self.layout.manifest_path(&version).is_file() {
                out.push(version);
            }
        }

        out.sort();
        Ok(out)
    }

    pub fn latest_version(&self) -> AirqResult<Option<VersionTag>> {
        Ok(self.versions()?.pop())
    }

    pub fn manifest(&self, version: &VersionTag) -> AirqResult<ArtifactManifest> {
        let path = self.layout.manifest_path(version);
        if !path.is_file() {
            return Err(AirqError::ArtifactNotFound(version.to_string()));
        }
        read_json(&path)
    }

    /// Manifests of every complete version, oldest first.
    pub fn manifests(&self) -> AirqResult<Vec<ArtifactManifest>> {
        self.versions()?.iter().map(|v| self.manifest(v)).collect()
    }

    /// Reconstruct the bank saved as `version`, or the latest one when `None`.
    ///
    /// Returns `Ok(None)` when no version has been saved yet. An explicit version
    /// that does not exist is [`AirqError::ArtifactNotFound`]. Without an explicit
    /// version, a version that fails verification is skipped for the next newest.
    pub fn load(&self, version: Option<&VersionTag>) -> AirqResult<Option<ModelBank>> {
        if let Some(v) = version {
            if !self.layout.schema_path(v).is_file() {
                return Err(AirqError::ArtifactNotFound(v.to_string()));
            }
            return self.load_version(v).map(Some);
        }

        let mut newest_err = None;
        for v in self.versions()?.iter().rev() {
            match self.load_version(v) {
                Ok(bank) => return Ok(Some(bank)),
                Err(err) => {
                    warn!(version = %v, error = %err, "Skipping unreadable model version");
                    newest_err.get_or_insert(err);
                }
            }
        }

        match newest_err {
            Some(err) => Err(err),
            None => {
                debug!(root = %self.layout.root().display(), "No saved model versions");
                Ok(None)
            }
        }
    }

    fn load_version(&self, version: &VersionTag) -> AirqResult<ModelBank> {
        let version = version.clone();
        let manifest = self.manifest(&version)?;
        let dir = self.layout.version_dir(&version);
        for artifact in &manifest.artifacts {
            let actual = sha256_file(&dir.join(&artifact.file))?;
            if actual != artifact.sha256 {
                return Err(AirqError::Artifact(format!(
                    "checksum mismatch for {} in version {version}",
                    artifact.file
                )));
            }
        }

        let schema: FeatureSchema = read_json(&self.layout.schema_path(&version))?;
        schema.validate()?;
        if schema.len() != manifest.schema_len {
            return Err(AirqError::SchemaMismatch(format!(
                "version {version} schema has {} columns, manifest records {}",
                schema.len(),
                manifest.schema_len
            )));
        }

        let trained_at = manifest.trained_at.unwrap_or(manifest.created_at);
        let mut bank = ModelBank::new(schema)
            .with_version(version.clone())
            .with_provenance(trained_at, manifest.samples, manifest.batch_id.clone());

        for (target, metrics) in &manifest.targets {
            let model: Regressor = read_json(&dir.join(ArtifactLayout::model_file(*target)))?;
            let scaler: StandardScaler = read_json(&dir.join(ArtifactLayout::scaler_file(*target)))?;
            bank.insert(*target, TrainedModel { model, scaler, metrics: metrics.clone() })?;
        }

        info!(version = %version, targets = bank.len(), "Loaded model bank");
        Ok(bank)
    }
}
