use super::tree::{normalize, RegressionTree, TreeConfig};
use crate::error::{AirqError, AirqResult};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub tree: TreeConfig,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            tree: TreeConfig { max_depth: Some(3), ..TreeConfig::default() },
        }
    }
}

/// Least-squares gradient boosting: each stage fits the residual of the ones before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, config: &BoostingConfig) -> AirqResult<Self> {
        if config.n_estimators == 0 {
            return Err(AirqError::Model("gradient boosting needs at least one stage".to_string()));
        }
        if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
            return Err(AirqError::Model("learning_rate must be > 0".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(AirqError::Model(format!("{} feature rows but {} targets", x.nrows(), y.len())));
        }
        let Some(init) = y.mean() else {
            return Err(AirqError::Model("cannot fit gradient boosting on zero samples".to_string()));
        };

        let n = x.nrows();
        let mut pred = Array1::from_elem(n, init);
        let indices: Vec<usize> = (0..n).collect();
        let mut stages = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residual = &y - &pred;
            let tree = RegressionTree::fit(x, residual.view(), &indices, &config.tree)?;
            Zip::from(&mut pred).and(x.rows()).for_each(|p, row| *p += config.learning_rate * tree.predict_row(row));
            stages.push(tree);
        }

        Ok(Self { init, learning_rate: config.learning_rate, stages, n_features: x.ncols() })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.init + self.learning_rate * self.stages.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_features];
        for stage in &self.stages {
            for (a, v) in acc.iter_mut().zip(stage.raw_importances()) {
                *a += v;
            }
        }
        normalize(acc)
    }
}
