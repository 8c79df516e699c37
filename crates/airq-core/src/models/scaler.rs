use crate::error::{AirqError, AirqResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance standardisation fitted on a training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    /// Population statistics per column; near-constant columns keep a scale of 1.
    pub fn fit(x: ArrayView2<'_, f64>) -> AirqResult<Self> {
        let Some(mean) = x.mean_axis(Axis(0)) else {
            return Err(AirqError::Model("cannot fit a scaler on zero rows".to_string()));
        };
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s < 10.0 * f64::EPSILON { 1.0 } else { s });

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> AirqResult<Array1<f64>> {
        self.check_width(row.len())?;
        Ok((&row - &self.mean) / &self.scale)
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> AirqResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        Ok((&x - &self.mean) / &self.scale)
    }

    fn check_width(&self, width: usize) -> AirqResult<()> {
        if width == self.n_features() {
            Ok(())
        } else {
            Err(AirqError::SchemaMismatch(format!("scaler expects {} features, got {width}", self.n_features())))
        }
    }
}
