//! Observation records as produced by the acquisition clients.
//!
//! Every sub-block and every numeric leaf is optional; absence is never an error.

use crate::error::{AirqError, AirqResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Ground weather observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherBlock {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    /// Categorical sky condition (e.g. "Clear", "Rain").
    #[serde(default, alias = "weather_condition")]
    pub condition: Option<String>,
}

/// Ground pollution sensor reading. Also used for each historical snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutionReading {
    #[serde(default)]
    pub pm2_5: Option<f64>,
    #[serde(default)]
    pub pm10: Option<f64>,
    #[serde(default)]
    pub no2: Option<f64>,
    #[serde(default)]
    pub o3: Option<f64>,
    #[serde(default)]
    pub co: Option<f64>,
    #[serde(default)]
    pub so2: Option<f64>,
    #[serde(default)]
    pub aqi: Option<f64>,
}

/// Satellite column densities and aerosol index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteAtmospheric {
    #[serde(default)]
    pub no2: Option<f64>,
    #[serde(default)]
    pub o3: Option<f64>,
    #[serde(default)]
    pub so2: Option<f64>,
    #[serde(default)]
    pub co: Option<f64>,
    #[serde(default)]
    pub aerosol: Option<f64>,
}

/// Satellite surface measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSurface {
    #[serde(default)]
    pub ndvi: Option<f64>,
    #[serde(default)]
    pub surface_temperature: Option<f64>,
    #[serde(default)]
    pub vegetation_health: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

/// One measurement event for a location at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    #[serde(default, alias = "current_weather", skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherBlock>,
    #[serde(default, alias = "current_pollution", skip_serializing_if = "Option::is_none")]
    pub pollution: Option<PollutionReading>,
    /// Also read from `atmospheric`, optionally wrapped as `{"satellite_data": {...}}`.
    #[serde(
        default,
        alias = "atmospheric",
        deserialize_with = "deserialize_atmospheric",
        skip_serializing_if = "Option::is_none"
    )]
    pub satellite_atmospheric: Option<SatelliteAtmospheric>,
    #[serde(default, alias = "surface", skip_serializing_if = "Option::is_none")]
    pub satellite_surface: Option<SatelliteSurface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, deserialize_with = "deserialize_timestamp", skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_history")]
    pub historical_pollution: Vec<PollutionReading>,
}

impl ObservationRecord {
    /// Ground-truth value for `target`, if the pollution block carries it.
    #[must_use]
    pub fn label(&self, target: crate::target::Target) -> Option<f64> {
        use crate::target::Target;
        let p = self.pollution.as_ref()?;
        match target {
            Target::Pm25 => p.pm2_5,
            Target::Pm10 => p.pm10,
            Target::No2 => p.no2,
            Target::O3 => p.o3,
            Target::Aqi => p.aqi,
        }
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("unrecognised timestamp: {raw}"))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_timestamp(&s)).transpose().map_err(serde::de::Error::custom)
}

fn deserialize_atmospheric<'de, D>(deserializer: D) -> Result<Option<SatelliteAtmospheric>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mut value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(inner) = value.get_mut("satellite_data").map(serde_json::Value::take) {
        value = inner;
    }
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom)
}

fn deserialize_history<'de, D>(deserializer: D) -> Result<Vec<PollutionReading>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<PollutionReading>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

/// Stable fingerprint of a training batch (content hash).
pub fn compute_batch_id(records: &[ObservationRecord]) -> AirqResult<String> {
    let mut hasher = Sha256::new();

    for record in records {
        let bytes = serde_json::to_vec(record)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn write_jsonl_records(path: &Path, records: &[ObservationRecord]) -> AirqResult<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub fn read_jsonl_records(path: &Path) -> AirqResult<Vec<ObservationRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ObservationRecord = serde_json::from_str(line).map_err(|e| {
            AirqError::InvalidRecord(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Read a single record stored as one JSON object.
pub fn read_json_record(path: &Path) -> AirqResult<ObservationRecord> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AirqError::InvalidRecord(format!("{}: {}", path.display(), e)))
}
