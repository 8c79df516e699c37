//! Trained models for one run, and the shared slot predictors read from.

use crate::error::{AirqError, AirqResult};
use crate::features::FeatureSchema;
use crate::models::{ModelFamily, Regressor, StandardScaler};
use crate::target::Target;
use crate::trainer::TargetMetrics;
use crate::version::VersionTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A fitted regressor and the scaler fitted on the same training split.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub model: Regressor,
    pub scaler: StandardScaler,
    pub metrics: TargetMetrics,
}

impl TrainedModel {
    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankState {
    Empty,
    PartiallyTrained,
    FullyTrained,
}

/// Per-target models sharing one feature schema.
///
/// Only targets that trained successfully are present; there are no placeholder entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelBank {
    version: Option<VersionTag>,
    schema: FeatureSchema,
    models: BTreeMap<Target, TrainedModel>,
    trained_at: Option<DateTime<Utc>>,
    samples: usize,
    batch_id: Option<String>,
}

impl ModelBank {
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema, trained_at: Some(Utc::now()), ..Self::default() }
    }

    #[must_use]
    pub fn with_version(mut self, version: VersionTag) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, trained_at: DateTime<Utc>, samples: usize, batch_id: Option<String>) -> Self {
        self.trained_at = Some(trained_at);
        self.samples = samples;
        self.batch_id = batch_id;
        self
    }

    /// Add a target's model; its scaler and regressor must match the shared schema width.
    pub fn insert(&mut self, target: Target, trained: TrainedModel) -> AirqResult<()> {
        let width = self.schema.len();
        if trained.scaler.n_features() != width || trained.model.n_features() != width {
            return Err(AirqError::SchemaMismatch(format!(
                "{target} model expects {} features and its scaler {}, bank schema has {width}",
                trained.model.n_features(),
                trained.scaler.n_features()
            )));
        }
        self.models.insert(target, trained);
        Ok(())
    }

    pub fn get(&self, target: Target) -> Option<&TrainedModel> {
        self.models.get(&target)
    }

    pub fn contains(&self, target: Target) -> bool {
        self.models.contains_key(&target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, &TrainedModel)> {
        self.models.iter().map(|(t, m)| (*t, m))
    }

    pub fn targets(&self) -> Vec<Target> {
        self.models.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn state(&self) -> BankState {
        match self.models.len() {
            0 => BankState::Empty,
            n if n == Target::ALL.len() => BankState::FullyTrained,
            _ => BankState::PartiallyTrained,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn version(&self) -> Option<&VersionTag> {
        self.version.as_ref()
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn metrics(&self) -> BTreeMap<Target, TargetMetrics> {
        self.models.iter().map(|(t, m)| (*t, m.metrics.clone())).collect()
    }

    /// Feature name to importance, highest first. Empty for an untrained target.
    pub fn feature_importance(&self, target: Target) -> Vec<(String, f64)> {
        let Some(importances) = self.get(target).and_then(|m| m.model.feature_importances()) else {
            return Vec::new();
        };

        let mut ranked: Vec<(String, f64)> = self.schema.columns.iter().cloned().zip(importances).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Shared, swappable handle to the current bank.
///
/// Readers take an `Arc` snapshot; a training run publishes a complete new bank
/// with [`ModelSlot::replace`], so no reader ever sees a half-updated bank.
#[derive(Debug, Default)]
pub struct ModelSlot {
    current: RwLock<Arc<ModelBank>>,
}

impl ModelSlot {
    #[must_use]
    pub fn new(bank: ModelBank) -> Self {
        Self { current: RwLock::new(Arc::new(bank)) }
    }

    pub fn snapshot(&self) -> Arc<ModelBank> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Publish `bank`, returning the one it replaced.
    pub fn replace(&self, bank: ModelBank) -> Arc<ModelBank> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(bank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoostingConfig;
    use ndarray::{Array1, Array2};

    fn schema(cols: &[&str]) -> FeatureSchema {
        FeatureSchema { columns: cols.iter().map(|c| (*c).to_string()).collect(), ..Default::default() }
    }

    fn trained(width: usize) -> TrainedModel {
        let x = Array2::from_shape_fn((12, width), |(i, j)| i as f64 * (j as f64 + 1.0));
        let y = Array1::from_shape_fn(12, |i| i as f64);
        let model =
            Regressor::fit_boosting(x.view(), y.view(), &BoostingConfig { n_estimators: 3, ..Default::default() }).unwrap();
        TrainedModel {
            scaler: StandardScaler::fit(x.view()).unwrap(),
            metrics: TargetMetrics::for_family(model.family()),
            model,
        }
    }

    #[test]
    fn test_state_follows_target_count() {
        let mut bank = ModelBank::new(schema(&["temperature", "humidity"]));
        assert_eq!(bank.state(), BankState::Empty);

        bank.insert(Target::Pm25, trained(2)).unwrap();
        assert_eq!(bank.state(), BankState::PartiallyTrained);

        for t in Target::ALL {
            bank.insert(t, trained(2)).unwrap();
        }
        assert_eq!(bank.state(), BankState::FullyTrained);
    }

    #[test]
    fn test_insert_rejects_width_mismatch() {
        let mut bank = ModelBank::new(schema(&["temperature"]));
        let err = bank.insert(Target::O3, trained(2)).unwrap_err();
        assert!(matches!(err, AirqError::SchemaMismatch(_)));
        assert!(bank.is_empty());
    }

    #[test]
    fn test_feature_importance_sorted_and_empty_for_untrained() {
        let mut bank = ModelBank::new(schema(&["temperature", "humidity"]));
        bank.insert(Target::Pm25, trained(2)).unwrap();

        let ranked = bank.feature_importance(Target::Pm25);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].1 >= ranked[1].1);
        assert!(bank.feature_importance(Target::Aqi).is_empty());
    }

    #[test]
    fn test_slot_snapshot_survives_replace() {
        let slot = ModelSlot::default();
        let before = slot.snapshot();

        let mut bank = ModelBank::new(schema(&["temperature", "humidity"]));
        bank.insert(Target::No2, trained(2)).unwrap();
        slot.replace(bank);

        assert!(before.is_empty());
        assert_eq!(slot.snapshot().targets(), vec![Target::No2]);
    }
}
