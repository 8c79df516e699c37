//! Regressors and the preprocessing they are paired with.

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod scaler;
pub mod tree;

pub use boosting::{BoostingConfig, GradientBoosting};
pub use forest::{ForestConfig, RandomForest};
pub use scaler::StandardScaler;
pub use tree::{RegressionTree, TreeConfig};

use crate::error::AirqResult;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    GradientBoosting,
}

impl ModelFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted regressor from one of the candidate families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Regressor {
    pub fn fit_forest(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, config: &ForestConfig) -> AirqResult<Self> {
        RandomForest::fit(x, y, config).map(Self::RandomForest)
    }

    pub fn fit_boosting(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        config: &BoostingConfig,
    ) -> AirqResult<Self> {
        GradientBoosting::fit(x, y, config).map(Self::GradientBoosting)
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Self::RandomForest(_) => ModelFamily::RandomForest,
            Self::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::RandomForest(m) => m.predict_row(row),
            Self::GradientBoosting(m) => m.predict_row(row),
        }
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::RandomForest(m) => m.n_features(),
            Self::GradientBoosting(m) => m.n_features(),
        }
    }

    /// Per-feature contribution scores, or `None` for a family without them.
    ///
    /// Both tree families report impurity-based importances.
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            Self::RandomForest(m) => Some(m.feature_importances()),
            Self::GradientBoosting(m) => Some(m.feature_importances()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_regressor_serde_keeps_family() {
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(12, |i| i as f64);
        let model =
            Regressor::fit_boosting(x.view(), y.view(), &BoostingConfig { n_estimators: 5, ..Default::default() }).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"family\":\"gradient_boosting\""));

        let back: Regressor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.family(), ModelFamily::GradientBoosting);
        assert_eq!(back.predict_row(array![3.0].view()), model.predict_row(array![3.0].view()));
        assert_eq!(back.predict(x.view()), model.predict(x.view()));
    }
}
