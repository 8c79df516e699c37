//! Per-target model training.
//!
//! For every target the trainer keeps rows with a positive label, splits them
//! with a fixed seed, standardises features on the training split, fits both
//! candidate families and keeps whichever scores the higher holdout R².

use crate::bank::{ModelBank, TrainedModel};
use crate::error::{AirqError, AirqResult};
use crate::features::{FeatureAssembler, FeatureSchema, FeatureTable};
use crate::job::TrainingJobId;
use crate::models::metrics::{mean_absolute_error, mean_squared_error, r2_score};
use crate::models::{BoostingConfig, ForestConfig, ModelFamily, Regressor, StandardScaler, TreeConfig};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::record::{compute_batch_id, ObservationRecord};
use crate::target::Target;
use chrono::Utc;
use ndarray::{Array1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Minimum rows with a positive label for a target to be trained.
    pub min_samples: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub boosting_max_depth: usize,
    pub forest_max_depth: Option<usize>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            test_fraction: 0.2,
            seed: 42,
            n_estimators: 100,
            learning_rate: 0.1,
            boosting_max_depth: 3,
            forest_max_depth: None,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> AirqResult<()> {
        if self.min_samples < 2 {
            return Err(AirqError::Config("trainer.min_samples must be >= 2".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(AirqError::Config("trainer.test_fraction must be in (0, 1)".to_string()));
        }
        if self.n_estimators == 0 {
            return Err(AirqError::Config("trainer.n_estimators must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(AirqError::Config("trainer.learning_rate must be > 0".to_string()));
        }
        if self.boosting_max_depth == 0 {
            return Err(AirqError::Config("trainer.boosting_max_depth must be >= 1".to_string()));
        }
        Ok(())
    }

    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_estimators: self.n_estimators,
            tree: TreeConfig { max_depth: self.forest_max_depth, ..TreeConfig::default() },
            seed: self.seed,
        }
    }

    pub fn boosting_config(&self) -> BoostingConfig {
        BoostingConfig {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            tree: TreeConfig { max_depth: Some(self.boosting_max_depth), ..TreeConfig::default() },
        }
    }
}

/// Holdout scores of the selected model for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub r2: f64,
    pub mse: f64,
    pub mae: f64,
    /// Rows with a positive label, before the split.
    pub samples_used: usize,
    pub family: ModelFamily,
    #[serde(default)]
    pub candidates: BTreeMap<ModelFamily, f64>,
}

impl TargetMetrics {
    /// Metrics with no scores, for models restored without a record of their run.
    pub fn for_family(family: ModelFamily) -> Self {
        Self { r2: 0.0, mse: 0.0, mae: 0.0, samples_used: 0, family, candidates: BTreeMap::new() }
    }
}

/// Result of one training run. The bank is not yet persisted or published.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bank: ModelBank,
    pub metrics: BTreeMap<Target, TargetMetrics>,
    pub skipped: BTreeMap<Target, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> AirqResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train every target that has enough data into a fresh bank.
    ///
    /// A failing target is skipped without aborting the others. `cancel` is polled
    /// between targets; a cancelled run returns [`AirqError::Cancelled`].
    pub fn train(
        &self,
        records: &[ObservationRecord],
        job_id: &TrainingJobId,
        progress: &dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> AirqResult<TrainingOutcome> {
        progress.on_event(ProgressEvent::Started { job_id: job_id.clone(), records: records.len() });

        let table = FeatureAssembler::assemble(records);
        let schema = FeatureSchema::from_table(&table);
        let features = table.conform(&schema)?;
        debug!(rows = table.len(), columns = schema.len(), "Assembled training table");

        let batch_id = compute_batch_id(records)?;
        let mut bank = ModelBank::new(schema).with_provenance(Utc::now(), records.len(), Some(batch_id));
        let mut metrics = BTreeMap::new();
        let mut skipped = BTreeMap::new();

        for target in Target::ALL {
            if cancel.load(Ordering::SeqCst) {
                return Err(AirqError::Cancelled);
            }

            match self.fit_target(&table, features.view(), target) {
                Ok(trained) => {
                    progress.on_event(ProgressEvent::TargetTrained {
                        job_id: job_id.clone(),
                        target,
                        family: trained.family(),
                        r2: trained.metrics.r2,
                    });
                    metrics.insert(target, trained.metrics.clone());
                    bank.insert(target, trained)?;
                }
                Err(err) => {
                    progress.on_event(ProgressEvent::TargetSkipped {
                        job_id: job_id.clone(),
                        target,
                        reason: err.to_string(),
                    });
                    skipped.insert(target, err.to_string());
                }
            }
        }

        info!(trained = metrics.len(), skipped = skipped.len(), "Training run complete");
        Ok(TrainingOutcome { bank, metrics, skipped })
    }

    /// Fit both candidate families for `target` and keep the better one.
    pub fn fit_target(
        &self,
        table: &FeatureTable,
        features: ArrayView2<'_, f64>,
        target: Target,
    ) -> AirqResult<TrainedModel> {
        let labels = table.column(target.as_str()).map_or_else(|| Array1::zeros(table.len()), |c| c.to_owned());
        let valid: Vec<usize> = labels.iter().enumerate().filter(|(_, y)| **y > 0.0).map(|(i, _)| i).collect();

        if valid.len() < self.config.min_samples {
            return Err(AirqError::InsufficientData {
                target,
                valid: valid.len(),
                required: self.config.min_samples,
            });
        }

        let (train_idx, test_idx) = split_indices(&valid, self.config.test_fraction, self.config.seed);
        let (y_train, y_test) = (labels.select(Axis(0), &train_idx), labels.select(Axis(0), &test_idx));

        let x_train = features.select(Axis(0), &train_idx);
        let scaler = StandardScaler::fit(x_train.view())?;
        let x_train = scaler.transform(x_train.view())?;
        let x_test = scaler.transform(features.select(Axis(0), &test_idx).view())?;

        let forest_config = self.config.forest_config();
        let boosting_config = self.config.boosting_config();
        let (forest, boosting) = rayon::join(
            || Regressor::fit_forest(x_train.view(), y_train.view(), &forest_config),
            || Regressor::fit_boosting(x_train.view(), y_train.view(), &boosting_config),
        );

        let mut best: Option<(Regressor, f64, Array1<f64>)> = None;
        let mut candidates = BTreeMap::new();
        for candidate in [forest, boosting] {
            let model = match candidate {
                Ok(model) => model,
                Err(err) => {
                    warn!(target = %target, error = %err, "Candidate model failed to fit");
                    continue;
                }
            };
            let pred = model.predict(x_test.view());
            let r2 = r2_score(y_test.view(), pred.view());
            debug!(target = %target, family = %model.family(), r2, "Scored candidate");
            candidates.insert(model.family(), r2);

            // Strictly greater: ties stay with the candidate evaluated first.
            if best.as_ref().is_none_or(|(_, best_r2, _)| r2 > *best_r2) {
                best = Some((model, r2, pred));
            }
        }

        let Some((model, r2, pred)) = best else {
            return Err(AirqError::Model(format!("no candidate model could be fitted for {target}")));
        };

        let metrics = TargetMetrics {
            r2,
            mse: mean_squared_error(y_test.view(), pred.view()),
            mae: mean_absolute_error(y_test.view(), pred.view()),
            samples_used: valid.len(),
            family: model.family(),
            candidates,
        };
        info!(target = %target, family = %metrics.family, r2, samples = metrics.samples_used, "Selected model");

        Ok(TrainedModel { model, scaler, metrics })
    }
}

/// Shuffle `rows` with a fixed seed and cut off `ceil(n * test_fraction)` for holdout.
///
/// Both sides keep at least one row when `rows` has two or more.
pub fn split_indices(rows: &[usize], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut shuffled = rows.to_vec();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

    let n = shuffled.len();
    let holdout = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let test = shuffled.split_off(n - holdout.min(n));
    (shuffled, test)
}
