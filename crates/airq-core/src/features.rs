//! Feature assembly.
//!
//! Turns observation records into a rectangular numeric table. Columns follow a
//! fixed catalog order; a batch table carries the union of the columns its rows
//! produced, with 0 for rows that did not produce a column.

use crate::error::{AirqError, AirqResult};
use crate::record::ObservationRecord;
use crate::target::Target;
use chrono::{Datelike, Timelike};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

pub const WEATHER_COLUMNS: [&str; 6] =
    ["temperature", "humidity", "pressure", "wind_speed", "wind_direction", "visibility"];
pub const POLLUTION_COLUMNS: [&str; 7] = ["pm2_5", "pm10", "no2", "o3", "co", "so2", "aqi"];
pub const ATMOSPHERIC_COLUMNS: [&str; 5] = ["sat_no2", "sat_o3", "sat_so2", "sat_co", "sat_aerosol"];
pub const SURFACE_COLUMNS: [&str; 3] = ["ndvi", "surface_temp", "vegetation_health"];
pub const LOCATION_COLUMNS: [&str; 2] = ["latitude", "longitude"];
pub const TIME_COLUMNS: [&str; 4] = ["hour", "day_of_week", "month", "is_weekend"];
pub const HISTORY_COLUMNS: [&str; 5] =
    ["hist_pm2_5_avg", "hist_pm10_avg", "hist_no2_avg", "hist_o3_avg", "hist_aqi_avg"];
pub const CONDITION_COLUMN: &str = "weather_condition_encoded";

pub const DEFAULT_CONDITION: &str = "Clear";
pub const DEFAULT_VISIBILITY: f64 = 10_000.0;

/// Every column the assembler can produce, in table order.
pub fn catalog() -> impl Iterator<Item = &'static str> {
    WEATHER_COLUMNS
        .into_iter()
        .chain(POLLUTION_COLUMNS)
        .chain(ATMOSPHERIC_COLUMNS)
        .chain(SURFACE_COLUMNS)
        .chain(LOCATION_COLUMNS)
        .chain(TIME_COLUMNS)
        .chain(HISTORY_COLUMNS)
        .chain(std::iter::once(CONDITION_COLUMN))
}

#[must_use]
pub fn is_catalog_column(name: &str) -> bool {
    catalog().any(|c| c == name)
}

/// Label encoding for the weather condition, frozen at training time.
///
/// Classes are the sorted distinct conditions seen in the training batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEncoding {
    pub classes: Vec<String>,
}

impl ConditionEncoding {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self { classes: classes.into_iter().map(str::to_string).collect() }
    }

    /// Code for `label`; an unseen label maps to `classes.len()`.
    pub fn encode(&self, label: &str) -> f64 {
        match self.classes.binary_search_by(|c| c.as_str().cmp(label)) {
            Ok(idx) => idx as f64,
            Err(_) => {
                warn!(condition = %label, known = self.classes.len(), "Weather condition unseen at training time");
                self.classes.len() as f64
            }
        }
    }
}

/// Flat feature mapping derived from one record, before table alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: BTreeMap<&'static str, f64>,
    condition: Option<String>,
}

impl FeatureVector {
    pub fn from_record(record: &ObservationRecord) -> Self {
        let mut v = Self::default();

        if let Some(w) = &record.weather {
            v.put("temperature", w.temperature.unwrap_or(0.0));
            v.put("humidity", w.humidity.unwrap_or(0.0));
            v.put("pressure", w.pressure.unwrap_or(0.0));
            v.put("wind_speed", w.wind_speed.unwrap_or(0.0));
            v.put("wind_direction", w.wind_direction.unwrap_or(0.0));
            v.put("visibility", w.visibility.unwrap_or(DEFAULT_VISIBILITY));
            v.condition = Some(w.condition.clone().unwrap_or_else(|| DEFAULT_CONDITION.to_string()));
        }

        if let Some(p) = &record.pollution {
            let fields = [p.pm2_5, p.pm10, p.no2, p.o3, p.co, p.so2, p.aqi];
            for (name, value) in POLLUTION_COLUMNS.into_iter().zip(fields) {
                v.put(name, value.unwrap_or(0.0));
            }
        }

        if let Some(a) = &record.satellite_atmospheric {
            let fields = [a.no2, a.o3, a.so2, a.co, a.aerosol];
            for (name, value) in ATMOSPHERIC_COLUMNS.into_iter().zip(fields) {
                v.put(name, value.unwrap_or(0.0));
            }
        }

        if let Some(s) = &record.satellite_surface {
            v.put("ndvi", s.ndvi.unwrap_or(0.0));
            v.put("surface_temp", s.surface_temperature.unwrap_or(0.0));
            v.put("vegetation_health", s.vegetation_health.unwrap_or(0.0));
        }

        if let Some(loc) = &record.location {
            v.put("latitude", loc.lat.unwrap_or(0.0));
            v.put("longitude", loc.lon.unwrap_or(0.0));
        }

        match record.collected_at {
            Some(ts) => {
                let dow = ts.weekday().num_days_from_monday();
                v.put("hour", f64::from(ts.hour()));
                v.put("day_of_week", f64::from(dow));
                v.put("month", f64::from(ts.month()));
                v.put("is_weekend", if dow >= 5 { 1.0 } else { 0.0 });
            }
            None => {
                for name in TIME_COLUMNS {
                    v.put(name, 0.0);
                }
            }
        }

        for (target, name) in Target::ALL.into_iter().zip(HISTORY_COLUMNS) {
            let readings: Vec<f64> = record
                .historical_pollution
                .iter()
                .filter_map(|h| match target {
                    Target::Pm25 => h.pm2_5,
                    Target::Pm10 => h.pm10,
                    Target::No2 => h.no2,
                    Target::O3 => h.o3,
                    Target::Aqi => h.aqi,
                })
                .collect();
            if !readings.is_empty() {
                v.put(name, readings.iter().sum::<f64>() / readings.len() as f64);
            }
        }

        v
    }

    fn put(&mut self, name: &'static str, value: f64) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }
}

/// Ordered feature columns a model bank was trained against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub columns: Vec<String>,
    #[serde(default)]
    pub condition_encoding: ConditionEncoding,
}

impl FeatureSchema {
    /// Non-target columns of a training table.
    pub fn from_table(table: &FeatureTable) -> Self {
        Self {
            columns: table.columns.iter().filter(|c| !Target::is_target_column(c)).cloned().collect(),
            condition_encoding: table.encoding.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn validate(&self) -> AirqResult<()> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !is_catalog_column(col) || Target::is_target_column(col) {
                return Err(AirqError::SchemaMismatch(format!(
                    "stored column `{col}` is not a feature the assembler produces"
                )));
            }
            if !seen.insert(col.as_str()) {
                return Err(AirqError::SchemaMismatch(format!("stored column `{col}` appears twice")));
            }
        }
        Ok(())
    }
}

/// One row per record, one column per entry of `columns`.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Array2<f64>,
    pub encoding: ConditionEncoding,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, or `None` if no row produced it.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.column(idx))
    }

    /// Project rows onto `schema`, refusing drifted record shapes.
    ///
    /// Schema columns this table lacks come from absent sub-blocks and read as 0.
    /// A live feature column outside the schema is a mismatch.
    pub fn conform(&self, schema: &FeatureSchema) -> AirqResult<Array2<f64>> {
        schema.validate()?;

        if let Some(extra) = self
            .columns
            .iter()
            .find(|c| !Target::is_target_column(c) && !schema.columns.contains(c))
        {
            return Err(AirqError::SchemaMismatch(format!(
                "live feature `{extra}` is not part of the trained schema ({} columns)",
                schema.len()
            )));
        }

        let indices: Vec<Option<usize>> = schema.columns.iter().map(|c| self.column_index(c)).collect();
        Ok(Array2::from_shape_fn((self.len(), indices.len()), |(r, c)| {
            indices[c].map_or(0.0, |i| self.rows[[r, i]])
        }))
    }
}

/// Builds feature tables from observation records. Pure; holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureAssembler;

impl FeatureAssembler {
    /// Assemble a training batch, fitting the condition encoding on it.
    pub fn assemble(records: &[ObservationRecord]) -> FeatureTable {
        let vectors: Vec<FeatureVector> = records.iter().map(FeatureVector::from_record).collect();
        let has_condition = vectors.iter().any(|v| v.condition.is_some());
        let encoding = if has_condition {
            ConditionEncoding::fit(vectors.iter().map(|v| v.condition().unwrap_or(DEFAULT_CONDITION)))
        } else {
            ConditionEncoding::default()
        };
        Self::build(&vectors, encoding, has_condition)
    }

    /// Assemble with an encoding frozen by an earlier training run.
    ///
    /// A non-empty encoding means the trained schema has the condition column, so it is
    /// emitted even for rows without a weather block, encoded as the default condition.
    pub fn assemble_with(records: &[ObservationRecord], encoding: &ConditionEncoding) -> FeatureTable {
        let vectors: Vec<FeatureVector> = records.iter().map(FeatureVector::from_record).collect();
        let has_condition = !encoding.classes.is_empty() || vectors.iter().any(|v| v.condition.is_some());
        Self::build(&vectors, encoding.clone(), has_condition)
    }

    fn build(vectors: &[FeatureVector], encoding: ConditionEncoding, has_condition: bool) -> FeatureTable {
        let columns: Vec<&'static str> = catalog()
            .filter(|&c| {
                if c == CONDITION_COLUMN {
                    has_condition
                } else {
                    vectors.iter().any(|v| v.values.contains_key(c))
                }
            })
            .collect();

        let rows = Array2::from_shape_fn((vectors.len(), columns.len()), |(r, c)| {
            let v = &vectors[r];
            let value = if columns[c] == CONDITION_COLUMN {
                encoding.encode(v.condition().unwrap_or(DEFAULT_CONDITION))
            } else {
                v.get(columns[c]).unwrap_or(0.0)
            };
            // Remaining gaps (NaN or infinite inputs) fill with 0.
            if value.is_finite() { value } else { 0.0 }
        });

        FeatureTable { columns: columns.into_iter().map(str::to_string).collect(), rows, encoding }
    }
}
