use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five pollutant targets a model is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "pm2_5")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "no2")]
    No2,
    #[serde(rename = "o3")]
    O3,
    #[serde(rename = "aqi")]
    Aqi,
}

impl Target {
    /// Fixed training order.
    pub const ALL: [Target; 5] = [Target::Pm25, Target::Pm10, Target::No2, Target::O3, Target::Aqi];

    /// Column name used in feature tables and artifact file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Target::Pm25 => "pm2_5",
            Target::Pm10 => "pm10",
            Target::No2 => "no2",
            Target::O3 => "o3",
            Target::Aqi => "aqi",
        }
    }

    /// Name of the derived historical-mean feature for this pollutant.
    #[must_use]
    pub fn history_column(self) -> String {
        format!("hist_{}_avg", self.as_str())
    }

    #[must_use]
    pub fn is_target_column(name: &str) -> bool {
        Self::ALL.iter().any(|t| t.as_str() == name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown target: {s} (expected one of pm2_5, pm10, no2, o3, aqi)"))
    }
}
