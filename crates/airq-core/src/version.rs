use crate::error::{AirqError, AirqResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TAG_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Sortable artifact version tag, e.g. `20240131_154501_027`.
///
/// Tags compare lexicographically, which for generated tags is chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionTag(String);

impl VersionTag {
    #[must_use]
    pub fn now() -> Self {
        Self::from_time(Utc::now())
    }

    #[must_use]
    pub fn from_time(at: DateTime<Utc>) -> Self {
        Self(at.format(TAG_FORMAT).to_string())
    }

    /// Accept any tag usable as a single directory name.
    pub fn parse(raw: &str) -> AirqResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AirqError::Artifact("version tag must not be empty".to_string()));
        }
        if raw.starts_with('.') {
            return Err(AirqError::Artifact(format!("version tag `{raw}` must not start with '.'")));
        }
        if raw.contains(['/', '\\']) || raw.chars().any(char::is_control) {
            return Err(AirqError::Artifact(format!("version tag `{raw}` contains a path separator")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionTag {
    type Err = AirqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionTag {
    type Error = AirqError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionTag> for String {
    fn from(tag: VersionTag) -> Self {
        tag.0
    }
}
