//! Regression scores used for candidate selection and reporting.
//!
//! Empty or mismatched inputs score 0.0.

use ndarray::{Array1, ArrayView1};

fn residuals(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
    (!y_true.is_empty() && y_true.len() == y_pred.len()).then(|| &y_true - &y_pred)
}

/// Coefficient of determination. A constant `y_true` scores 1.0 only for an exact fit.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let (Some(res), Some(mean)) = (residuals(y_true, y_pred), y_true.mean()) else {
        return 0.0;
    };
    let ss_res = res.mapv(|r| r * r).sum();
    let ss_tot = y_true.mapv(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_squared_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    residuals(y_true, y_pred).and_then(|r| r.mapv(|v| v * v).mean()).unwrap_or(0.0)
}

pub fn mean_absolute_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    residuals(y_true, y_pred).and_then(|r| r.mapv(f64::abs).mean()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(r2_score(y.view(), y.view()), 1.0);
        assert_eq!(mean_squared_error(y.view(), y.view()), 0.0);
        assert_eq!(mean_absolute_error(y.view(), y.view()), 0.0);
    }

    #[test]
    fn test_mean_prediction_scores_zero() {
        let y = array![1.0, 2.0, 3.0];
        let mean = array![2.0, 2.0, 2.0];
        assert!(r2_score(y.view(), mean.view()).abs() < 1e-12);
        assert!((mean_absolute_error(y.view(), mean.view()) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_truth() {
        let y = array![5.0, 5.0];
        assert_eq!(r2_score(y.view(), array![5.0, 5.0].view()), 1.0);
        assert_eq!(r2_score(y.view(), array![4.0, 5.0].view()), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_score_zero() {
        assert_eq!(mean_squared_error(array![1.0, 2.0].view(), array![1.0].view()), 0.0);
    }
}
