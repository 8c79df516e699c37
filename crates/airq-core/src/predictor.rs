use crate::bank::ModelBank;
use crate::error::{AirqError, AirqResult};
use crate::features::FeatureAssembler;
use crate::record::ObservationRecord;
use crate::target::Target;
use ndarray::{Array1, Axis};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Target to predicted concentration. Untrained targets are absent.
pub type Prediction = BTreeMap<Target, f64>;

/// Runs a bank snapshot against live records.
#[derive(Debug, Clone)]
pub struct Predictor {
    bank: Arc<ModelBank>,
}

impl Predictor {
    #[must_use]
    pub fn new(bank: Arc<ModelBank>) -> Self {
        Self { bank }
    }

    pub fn bank(&self) -> &ModelBank {
        &self.bank
    }

    /// Features of `record` laid out exactly as the bank's schema.
    fn features(&self, record: &ObservationRecord) -> AirqResult<Array1<f64>> {
        let schema = self.bank.schema();
        let table = FeatureAssembler::assemble_with(std::slice::from_ref(record), &schema.condition_encoding);
        table
            .conform(schema)?
            .axis_iter(Axis(0))
            .next()
            .map(|row| row.to_owned())
            .ok_or_else(|| AirqError::InvalidRecord("record produced no feature row".to_string()))
    }

    /// Predict every trained target; values are clamped to be non-negative.
    pub fn predict(&self, record: &ObservationRecord) -> AirqResult<Prediction> {
        if self.bank.is_empty() {
            return Ok(Prediction::new());
        }

        let row = self.features(record)?;
        let mut out = Prediction::new();
        for (target, trained) in self.bank.iter() {
            let scaled = trained.scaler.transform_row(row.view())?;
            out.insert(target, trained.model.predict_row(scaled.view()).max(0.0));
        }
        Ok(out)
    }

    /// Predict one target, failing with [`AirqError::MissingModel`] when it is untrained.
    pub fn predict_target(&self, record: &ObservationRecord, target: Target) -> AirqResult<f64> {
        let trained = self.bank.get(target).ok_or(AirqError::MissingModel(target))?;
        let row = self.features(record)?;
        let scaled = trained.scaler.transform_row(row.view())?;
        Ok(trained.model.predict_row(scaled.view()).max(0.0))
    }

    /// Predict each record independently against the same snapshot.
    pub fn predict_batch(&self, records: &[ObservationRecord]) -> Vec<AirqResult<Prediction>> {
        records.iter().map(|r| self.predict(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::TrainedModel;
    use crate::features::FeatureSchema;
    use crate::models::{BoostingConfig, Regressor, StandardScaler};
    use crate::record::{SatelliteAtmospheric, WeatherBlock};
    use crate::trainer::TargetMetrics;

    fn weather(temp: f64) -> ObservationRecord {
        ObservationRecord {
            weather: Some(WeatherBlock { temperature: Some(temp), ..Default::default() }),
            ..Default::default()
        }
    }

    /// Bank trained on a decreasing target so low temperatures extrapolate below zero.
    fn bank() -> ModelBank {
        let train: Vec<ObservationRecord> = (0..12).map(|i| weather(f64::from(i))).collect();
        let table = FeatureAssembler::assemble(&train);
        let schema = FeatureSchema::from_table(&table);
        let x = table.conform(&schema).unwrap();
        let y = Array1::from_shape_fn(12, |i| 5.0 - i as f64);

        let scaler = StandardScaler::fit(x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();
        let model = Regressor::fit_boosting(scaled.view(), y.view(), &BoostingConfig::default()).unwrap();
        let mut bank = ModelBank::new(schema);
        bank.insert(
            Target::O3,
            TrainedModel { metrics: TargetMetrics::for_family(model.family()), model, scaler },
        )
        .unwrap();
        bank
    }

    #[test]
    fn test_empty_bank_predicts_nothing() {
        let predictor = Predictor::new(Arc::new(ModelBank::default()));
        assert!(predictor.predict(&weather(1.0)).unwrap().is_empty());
    }

    #[test]
    fn test_predictions_are_clamped_non_negative() {
        let predictor = Predictor::new(Arc::new(bank()));
        let out = predictor.predict(&weather(11.0)).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[&Target::O3] >= 0.0);
    }

    #[test]
    fn test_predict_target_reports_missing_model() {
        let predictor = Predictor::new(Arc::new(bank()));
        let err = predictor.predict_target(&weather(1.0), Target::Pm25).unwrap_err();
        assert!(matches!(err, AirqError::MissingModel(Target::Pm25)));
    }

    #[test]
    fn test_unknown_live_column_is_schema_mismatch() {
        let predictor = Predictor::new(Arc::new(bank()));
        let mut record = weather(3.0);
        record.satellite_atmospheric = Some(SatelliteAtmospheric { no2: Some(1.0), ..Default::default() });

        let err = predictor.predict(&record).unwrap_err();
        assert!(matches!(err, AirqError::SchemaMismatch(_)));
    }
}
