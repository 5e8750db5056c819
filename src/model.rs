//! AQI regression model.
//!
//! A gradient-boosted tree ensemble (squared error) over the seven daily
//! features. Training is CPU bound and synchronous; callers on the async
//! runtime should move it onto a blocking thread.

use std::time::Instant;

use gbdt::{
    config::Config as GbdtConfig,
    decision_tree::{Data, DataVec},
    gradient_boost::GBDT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---

/// Model inputs, in column order.
pub const FEATURES: [&str; 7] = ["DEWP", "WDSP", "MAX", "MIN", "PRCP", "MONTH", "pm25_value"];

/// Regression target.
pub const TARGET: &str = "AQI";

pub const MODEL_KIND: &str = "GradientBoostedTrees";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Training data has no usable rows")]
    EmptyTrainingSet,

    #[error("Expected {expected} values per row, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Model artifact is invalid: {0}")]
    Artifact(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TrainingParams {
    pub iterations: usize,
    pub max_depth: u32,
    pub shrinkage: f32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            iterations: 200,
            max_depth: 5,
            shrinkage: 0.1,
        }
    }
}

/// Summary of a training run, stored next to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Leaderboard {
    pub model: String,
    pub train_rows: usize,
    pub rmse_train: f64,
    pub validate_rows: usize,
    /// `None` when there is no held-out data to score against.
    pub rmse_validate: Option<f64>,
    pub iterations: usize,
    pub max_depth: u32,
    pub fit_time_secs: f64,
}

/// A trained model plus the feature order it expects.
#[derive(Serialize, Deserialize)]
pub struct AqiModel {
    features: Vec<String>,
    gbdt: GBDT,
}

fn to_features(row: &[f64]) -> Vec<f32> {
    row.iter().map(|v| *v as f32).collect()
}

fn check_shape(row: &[f64], expected: usize) -> Result<(), ModelError> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(ModelError::Shape {
            expected,
            actual: row.len(),
        })
    }
}

fn rmse(predicted: &[f32], actual: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (*p as f64 - a).powi(2))
        .sum();
    (sum / actual.len() as f64).sqrt()
}

impl AqiModel {
    /// Fit on rows of `FEATURES` followed by the target.
    ///
    /// `validation` rows have the same layout and are only used for scoring.
    pub fn train(
        rows: &[Vec<f64>],
        validation: &[Vec<f64>],
        params: TrainingParams,
    ) -> Result<(Self, Leaderboard), ModelError> {
        // ---
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let width = FEATURES.len() + 1;
        for row in rows.iter().chain(validation) {
            check_shape(row, width)?;
        }

        let mut cfg = GbdtConfig::new();
        cfg.set_feature_size(FEATURES.len());
        cfg.set_max_depth(params.max_depth);
        cfg.set_iterations(params.iterations);
        cfg.set_shrinkage(params.shrinkage);
        cfg.set_loss("SquaredError");
        cfg.set_debug(false);

        let mut data: DataVec = rows
            .iter()
            .map(|r| {
                Data::new_training_data(to_features(&r[..FEATURES.len()]), 1.0, r[FEATURES.len()] as f32, None)
            })
            .collect();

        let started = Instant::now();
        let mut gbdt = GBDT::new(&cfg);
        gbdt.fit(&mut data);
        let fit_time_secs = started.elapsed().as_secs_f64();

        let model = Self {
            features: FEATURES.iter().map(|f| f.to_string()).collect(),
            gbdt,
        };

        let score = |set: &[Vec<f64>]| -> f64 {
            let features: Vec<&[f64]> = set.iter().map(|r| &r[..FEATURES.len()]).collect();
            let actual: Vec<f64> = set.iter().map(|r| r[FEATURES.len()]).collect();
            rmse(&model.predict_rows(&features), &actual)
        };

        let leaderboard = Leaderboard {
            model: MODEL_KIND.to_string(),
            train_rows: rows.len(),
            rmse_train: score(rows),
            validate_rows: validation.len(),
            rmse_validate: (!validation.is_empty()).then(|| score(validation)),
            iterations: params.iterations,
            max_depth: params.max_depth,
            fit_time_secs,
        };

        Ok((model, leaderboard))
    }

    fn predict_rows(&self, rows: &[&[f64]]) -> Vec<f32> {
        let data: DataVec = rows
            .iter()
            .map(|r| Data::new_test_data(to_features(r), None))
            .collect();
        self.gbdt.predict(&data)
    }

    /// Predict the AQI for one row of `FEATURES`.
    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        // ---
        check_shape(features, self.features.len())?;
        let predicted = self.predict_rows(&[features]);
        Ok(predicted.first().copied().unwrap_or_default() as f64)
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    /// Rows whose target is exactly the pm25 AQI, so the trees only need
    /// to learn a monotone function of the last feature.
    fn synthetic_rows(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let pm25 = (i % 40) as f64;
                let aqi = crate::aqi::compute_aqi(crate::Pollutant::Pm25, pm25);
                vec![40.0, 5.0, 70.0, 55.0, 0.0, (i % 10 + 1) as f64, pm25, aqi]
            })
            .collect()
    }

    fn small_params() -> TrainingParams {
        TrainingParams {
            iterations: 50,
            max_depth: 4,
            shrinkage: 0.3,
        }
    }

    #[test]
    fn test_training_requires_rows() {
        // ---
        let err = AqiModel::train(&[], &[], TrainingParams::default()).err().unwrap();
        assert!(matches!(err, ModelError::EmptyTrainingSet));
    }

    #[test]
    fn test_training_rejects_ragged_rows() {
        // ---
        let rows = vec![vec![1.0, 2.0, 3.0]];
        let err = AqiModel::train(&rows, &[], small_params()).err().unwrap();
        assert!(matches!(err, ModelError::Shape { expected: 8, actual: 3 }));
    }

    #[test]
    fn test_model_learns_and_survives_serialization() {
        // ---
        let rows = synthetic_rows(200);
        let validation = synthetic_rows(20);
        let (model, board) = AqiModel::train(&rows, &validation, small_params()).unwrap();

        assert_eq!(board.train_rows, 200);
        assert_eq!(board.validate_rows, 20);
        assert!(board.rmse_validate.is_some());
        assert!(board.rmse_train < 25.0, "rmse too high: {}", board.rmse_train);

        let low = model.predict(&[40.0, 5.0, 70.0, 55.0, 0.0, 3.0, 2.0]).unwrap();
        let high = model.predict(&[40.0, 5.0, 70.0, 55.0, 0.0, 3.0, 38.0]).unwrap();
        assert!(high > low);

        let restored = AqiModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.features(), model.features());
        let again = restored.predict(&[40.0, 5.0, 70.0, 55.0, 0.0, 3.0, 38.0]).unwrap();
        assert!((again - high).abs() < 1e-6);
    }

    #[test]
    fn test_predict_checks_feature_count() {
        // ---
        let (model, _) = AqiModel::train(&synthetic_rows(30), &[], small_params()).unwrap();
        assert!(model.predict(&[1.0, 2.0]).is_err());
    }
}
