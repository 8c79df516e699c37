use super::tree::{normalize, RegressionTree, TreeConfig};
use crate::error::{AirqError, AirqResult};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub tree: TreeConfig,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { n_estimators: 100, tree: TreeConfig::default(), seed: 42 }
    }
}

/// Bagging ensemble: each tree sees a bootstrap resample, predictions are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, config: &ForestConfig) -> AirqResult<Self> {
        if config.n_estimators == 0 {
            return Err(AirqError::Model("random forest needs at least one tree".to_string()));
        }
        let n = x.nrows();
        if n == 0 {
            return Err(AirqError::Model("cannot fit a random forest on zero samples".to_string()));
        }

        // Draw every bootstrap up front so parallel fitting stays reproducible.
        let mut rng = StdRng::seed_from_u64(config.seed);
        let samples: Vec<Vec<usize>> =
            (0..config.n_estimators).map(|_| (0..n).map(|_| rng.gen_range(0..n)).collect()).collect();

        let trees = samples
            .into_par_iter()
            .map(|indices| RegressionTree::fit(x, y, &indices, &config.tree))
            .collect::<AirqResult<Vec<_>>>()?;

        Ok(Self { trees, n_features: x.ncols() })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of per-tree normalised importances, renormalised.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.feature_importances()) {
                *a += v;
            }
        }
        normalize(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(n, |i| 3.0 * i as f64 + 1.0);
        (x, y)
    }

    #[test]
    fn test_forest_is_reproducible_for_same_seed() {
        let (x, y) = linear_data(40);
        let config = ForestConfig { n_estimators: 10, ..Default::default() };

        let a = RandomForest::fit(x.view(), y.view(), &config).unwrap();
        let b = RandomForest::fit(x.view(), y.view(), &config).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 10);
    }

    #[test]
    fn test_forest_tracks_trend() {
        let (x, y) = linear_data(60);
        let forest = RandomForest::fit(x.view(), y.view(), &ForestConfig { n_estimators: 20, ..Default::default() }).unwrap();

        assert!(forest.predict_row(array![50.0, 2.0].view()) > forest.predict_row(array![10.0, 1.0].view()));
        let imp = forest.feature_importances();
        assert!(imp[0] > imp[1]);
    }
}
