//! Bounded in-memory store for collected observations awaiting training.

use crate::error::AirqResult;
use crate::record::{read_jsonl_records, write_jsonl_records, ObservationRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    /// Drop observations older than this many hours. `None` keeps them until capacity evicts.
    pub max_age_hours: Option<u64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 10_000, max_age_hours: None }
    }
}

/// Append-only buffer with oldest-first eviction.
///
/// Entries are stamped with their `collected_at`, or the insertion time when
/// the record carries none.
#[derive(Debug, Clone)]
pub struct ObservationBuffer {
    config: BufferConfig,
    entries: VecDeque<(DateTime<Utc>, ObservationRecord)>,
}

impl ObservationBuffer {
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        Self { config, entries: VecDeque::new() }
    }

    pub fn push(&mut self, record: ObservationRecord) {
        self.push_at(record, Utc::now());
    }

    /// Insert with `now` as the clock for stamping and age eviction.
    pub fn push_at(&mut self, record: ObservationRecord, now: DateTime<Utc>) {
        let stamp = record.collected_at.unwrap_or(now);
        self.entries.push_back((stamp, record));
        self.evict(now);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ObservationRecord>) {
        let now = Utc::now();
        for record in records {
            self.push_at(record, now);
        }
    }

    /// Apply the capacity and age limits.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();

        let cutoff = self
            .config
            .max_age_hours
            .and_then(|h| i64::try_from(h).ok())
            .and_then(Duration::try_hours)
            .and_then(|age| now.checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            self.entries.retain(|(stamp, _)| *stamp >= cutoff);
        }
        while self.entries.len() > self.config.capacity {
            self.entries.pop_front();
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "Evicted buffered observations");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn records(&self) -> Vec<ObservationRecord> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn drain(&mut self) -> Vec<ObservationRecord> {
        self.entries.drain(..).map(|(_, r)| r).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Load a buffer persisted as JSONL; a missing file yields an empty buffer.
    pub fn load_jsonl(path: &Path, config: BufferConfig) -> AirqResult<Self> {
        let mut buffer = Self::new(config);
        if path.exists() {
            buffer.extend(read_jsonl_records(path)?);
        }
        Ok(buffer)
    }

    pub fn save_jsonl(&self, path: &Path) -> AirqResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_jsonl_records(path, &self.records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PollutionReading;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn reading(pm25: f64, at: Option<DateTime<Utc>>) -> ObservationRecord {
        ObservationRecord {
            pollution: Some(PollutionReading { pm2_5: Some(pm25), ..Default::default() }),
            collected_at: at,
            ..Default::default()
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = ObservationBuffer::new(BufferConfig { capacity: 2, max_age_hours: None });
        for v in [1.0, 2.0, 3.0] {
            buffer.push(reading(v, None));
        }

        let kept: Vec<f64> = buffer.records().iter().filter_map(|r| r.label(crate::Target::Pm25)).collect();
        assert_eq!(kept, vec![2.0, 3.0]);
    }

    #[test]
    fn test_age_eviction() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut buffer = ObservationBuffer::new(BufferConfig { capacity: 10, max_age_hours: Some(24) });

        buffer.push_at(reading(1.0, Some(now - Duration::hours(30))), now);
        buffer.push_at(reading(2.0, Some(now - Duration::hours(2))), now);

        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_jsonl_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("buf").join("observations.jsonl");

        let mut buffer = ObservationBuffer::new(BufferConfig::default());
        buffer.push(reading(7.0, None));
        buffer.save_jsonl(&path).unwrap();

        let loaded = ObservationBuffer::load_jsonl(&path, BufferConfig::default()).unwrap();
        assert_eq!(loaded.records(), buffer.records());

        let missing = ObservationBuffer::load_jsonl(&temp.path().join("none.jsonl"), BufferConfig::default()).unwrap();
        assert!(missing.is_empty());
    }
}
