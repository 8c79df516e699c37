//! CART regression tree (squared-error criterion).
//!
//! Nodes live in a flat arena so deep trees serialize without nesting.

use crate::error::{AirqError, AirqResult};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: None, min_samples_split: 2, min_samples_leaf: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `feature <= threshold` goes left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    Leaf { value: f64, samples: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    /// Unnormalised weighted impurity decrease per feature.
    importances: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    improvement: f64,
}

struct Builder<'x, 'y, 'c> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    config: &'c TreeConfig,
    n_features: usize,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl Builder<'_, '_, '_> {
    fn build(&mut self, indices: &[usize], depth: usize) -> usize {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let sum_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let mean = sum / n as f64;
        let sse = (sum_sq - sum * sum / n as f64).max(0.0);

        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: mean, samples: n });

        let should_stop = self.config.max_depth.is_some_and(|d| depth >= d)
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || sse <= 1e-12;
        if should_stop {
            return id;
        }

        let Some(split) = self.best_split(indices, sum, sse) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }

        self.importances[split.feature] += split.improvement;
        let left_id = self.build(&left, depth + 1);
        let right_id = self.build(&right, depth + 1);
        self.nodes[id] =
            TreeNode::Split { feature: split.feature, threshold: split.threshold, left: left_id, right: right_id };
        id
    }

    /// Sweep each feature in sorted order, keeping running sums for both sides.
    fn best_split(&self, indices: &[usize], total_sum: f64, parent_sse: f64) -> Option<Split> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;
        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in 0..self.n_features {
            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let total_sq: f64 = sorted.iter().map(|(_, y)| y * y).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 0..n - 1 {
                let (value, y) = sorted[k];
                left_sum += y;
                left_sq += y * y;

                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let next = sorted[k + 1].0;
                if next <= value {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let child_sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                let improvement = parent_sse - child_sse;

                if improvement > 1e-12 && best.as_ref().is_none_or(|b| improvement > b.improvement) {
                    let mut threshold = (value + next) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(Split { feature, threshold, improvement });
                }
            }
        }

        best
    }
}

impl RegressionTree {
    /// Fit on the rows named by `indices`; repeated indices weight a row more.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        indices: &[usize],
        config: &TreeConfig,
    ) -> AirqResult<Self> {
        if x.nrows() == 0 || indices.is_empty() {
            return Err(AirqError::Model("cannot fit a tree on zero samples".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(AirqError::Model(format!("{} feature rows but {} targets", x.nrows(), y.len())));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= x.nrows()) {
            return Err(AirqError::Model(format!("sample index {bad} out of range")));
        }
        let n_features = x.ncols();

        let mut builder = Builder {
            x,
            y,
            config,
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.build(indices, 0);

        Ok(Self { nodes: builder.nodes, n_features, importances: builder.importances })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Split { feature, threshold, left, right } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    id = if value <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value, .. } => return *value,
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Importances normalised to sum to 1 (all zero for a single-leaf tree).
    pub fn feature_importances(&self) -> Vec<f64> {
        normalize(self.importances.clone())
    }
}

pub(crate) fn normalize(mut values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in &mut values {
            *v /= total;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_tree_fits_step_function() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(10, |i| if i < 5 { 1.0 } else { 9.0 });

        let tree = RegressionTree::fit(x.view(), y.view(), &all(10), &TreeConfig::default()).unwrap();

        assert_eq!(tree.predict_row(array![2.0].view()), 1.0);
        assert_eq!(tree.predict_row(array![7.0].view()), 9.0);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_tree_importance_goes_to_informative_feature() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { (i % 2) as f64 } else { i as f64 });
        let y = Array1::from_shape_fn(20, |i| i as f64 * 2.0);

        let tree = RegressionTree::fit(x.view(), y.view(), &all(20), &TreeConfig::default()).unwrap();
        let imp = tree.feature_importances();

        assert!(imp[1] > imp[0]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(32, |i| i as f64);
        let config = TreeConfig { max_depth: Some(2), ..Default::default() };

        let tree = RegressionTree::fit(x.view(), y.view(), &all(32), &config).unwrap();

        assert_eq!(tree.node_count(), 7);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(5, 4.0);

        let tree = RegressionTree::fit(x.view(), y.view(), &all(5), &TreeConfig::default()).unwrap();

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        assert!(RegressionTree::fit(x.view(), y.view(), &[], &TreeConfig::default()).is_err());
        assert!(RegressionTree::fit(array![[1.0]].view(), array![1.0].view(), &[3], &TreeConfig::default()).is_err());
    }
}
