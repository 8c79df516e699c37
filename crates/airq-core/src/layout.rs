use crate::target::Target;
use crate::version::VersionTag;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SCHEMA_FILE: &str = "feature_schema.json";
pub const MANIFEST_FILE: &str = "manifest.json";
const STAGING_PREFIX: &str = ".staging-";

/// Filesystem layout for versioned model artifacts.
///
/// ```text
/// <root>/<version>/feature_schema.json
/// <root>/<version>/<target>_model.json
/// <root>/<version>/<target>_scaler.json
/// <root>/<version>/manifest.json
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn version_dir(&self, version: &VersionTag) -> PathBuf {
        self.root.join(version.as_str())
    }

    #[must_use]
    pub fn schema_path(&self, version: &VersionTag) -> PathBuf {
        self.version_dir(version).join(SCHEMA_FILE)
    }

    #[must_use]
    pub fn manifest_path(&self, version: &VersionTag) -> PathBuf {
        self.version_dir(version).join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn model_file(target: Target) -> String {
        format!("{}_model.json", target.as_str())
    }

    #[must_use]
    pub fn scaler_file(target: Target) -> String {
        format!("{}_scaler.json", target.as_str())
    }

    /// Fresh hidden directory a version is written into before being renamed into place.
    #[must_use]
    pub fn staging_dir(&self, version: &VersionTag) -> PathBuf {
        self.root.join(format!("{STAGING_PREFIX}{version}-{}", Uuid::new_v4()))
    }

    /// Directory entries that are never read as versions (staging, dotfiles).
    #[must_use]
    pub fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().join("models"));
        let version = VersionTag::parse("20240101_000000_000").unwrap();

        assert!(layout.schema_path(&version).ends_with("20240101_000000_000/feature_schema.json"));
        assert_eq!(ArtifactLayout::model_file(Target::Pm25), "pm2_5_model.json");
        assert_eq!(ArtifactLayout::scaler_file(Target::Aqi), "aqi_scaler.json");

        let staging = layout.staging_dir(&version);
        let name = staging.file_name().unwrap().to_string_lossy().to_string();
        assert!(ArtifactLayout::is_hidden(&name));
        assert_ne!(staging, layout.staging_dir(&version));
    }
}
