// src/routes/train_model.rs
//! `POST /train-model/`: fit the AQI regressor on a prepared training table
//! and store the resulting model artifact.

use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    catalog,
    model::{AqiModel, Leaderboard, TrainingParams, FEATURES, TARGET},
    storage::{MERGED_BUCKET, MODEL_BUCKET},
    table::{self, NumericRows},
    ApiError, AppState, StorageError,
};

// ---

pub const DEFAULT_MODEL_NAME: &str = "aqi_model";

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub train_filename: String,
    pub merged_data_id: i64,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub iterations: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub model_id: i64,
    pub model_name: String,
    pub model_path: String,
    pub leaderboard: Leaderboard,
    pub model_size_bytes: usize,
}

impl TrainRequest {
    fn model_name(&self) -> Result<String, ApiError> {
        // ---
        let name = self.model_name.as_deref().unwrap_or(DEFAULT_MODEL_NAME);
        let valid = !name.is_empty()
            && name.len() <= 100
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(name.to_string())
        } else {
            Err(ApiError::Validation(format!(
                "Invalid model_name '{}': use 1-100 letters, digits, '_' or '-'",
                name
            )))
        }
    }

    fn params(&self) -> Result<TrainingParams, ApiError> {
        // ---
        let defaults = TrainingParams::default();
        let params = TrainingParams {
            iterations: self.iterations.unwrap_or(defaults.iterations),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            ..defaults
        };
        if params.iterations == 0 || params.iterations > 5000 {
            return Err(ApiError::Validation(
                "iterations must be between 1 and 5000".to_string(),
            ));
        }
        if params.max_depth == 0 || params.max_depth > 20 {
            return Err(ApiError::Validation(
                "max_depth must be between 1 and 20".to_string(),
            ));
        }
        Ok(params)
    }
}

/// `{name}_{YYYYmmdd_HHMMSS}.json`
pub fn model_object_name(model_name: &str, at: chrono::DateTime<Utc>) -> String {
    format!("{}_{}.json", model_name, at.format("%Y%m%d_%H%M%S"))
}

fn training_columns() -> Vec<&'static str> {
    FEATURES.iter().copied().chain([TARGET]).collect()
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/train-model/", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    Json(req): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    // ---
    info!(
        "POST /train-model/ - {} (merged dataset {})",
        req.train_filename, req.merged_data_id
    );
    let model_name = req.model_name()?;
    let params = req.params()?;

    // Step 1: resolve the merged dataset
    debug!("POST /train-model/ - Step 1");
    let merged = catalog::get_merged_data(&state.pool, req.merged_data_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Merged dataset {} not found", req.merged_data_id))
        })?;
    if merged.train_filename.as_deref() != Some(req.train_filename.as_str()) {
        return Err(ApiError::Validation(format!(
            "train_filename '{}' does not belong to merged dataset {}",
            req.train_filename, merged.id
        )));
    }
    let bucket = merged.bucket.as_deref().unwrap_or(MERGED_BUCKET);

    // Step 2: load training and validation rows
    debug!("POST /train-model/ - Step 2");
    let columns = training_columns();
    let train_bytes = state.store.get_object(bucket, &req.train_filename).await?;
    let train = table::read_numeric_columns(&train_bytes, &req.train_filename, &columns)?;
    if train.skipped > 0 {
        warn!(
            "Dropped {} training rows with empty cells from {}",
            train.skipped, req.train_filename
        );
    }

    let validation = match merged.validate_filename.as_deref() {
        Some(name) => load_validation(&state, bucket, name, &columns).await?,
        None => NumericRows::default(),
    };

    // Step 3: fit off the async runtime
    debug!("POST /train-model/ - Step 3");
    let (model, leaderboard) = tokio::task::spawn_blocking(move || {
        AqiModel::train(&train.rows, &validation.rows, params)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Training task failed: {}", e)))??;
    info!(
        "Trained {} on {} rows (rmse_train={:.3}, rmse_validate={:?})",
        leaderboard.model, leaderboard.train_rows, leaderboard.rmse_train, leaderboard.rmse_validate
    );

    // Step 4: store and record the artifact
    debug!("POST /train-model/ - Step 4");
    let model_path = model_object_name(&model_name, Utc::now());
    let body = model.to_bytes()?;
    let model_size_bytes = body.len();
    state
        .store
        .put_object(MODEL_BUCKET, &model_path, body, "application/json")
        .await?;

    let leaderboard_json = serde_json::to_value(&leaderboard)
        .map_err(|e| ApiError::Internal(format!("Failed to encode leaderboard: {}", e)))?;
    let record = catalog::insert_trained_model(
        &state.pool,
        &model_name,
        &model_path,
        MODEL_BUCKET,
        merged.id,
        leaderboard_json,
    )
    .await?;

    Ok(Json(TrainResponse {
        model_id: record.id,
        model_name: record.model_name,
        model_path: record.model_path,
        leaderboard,
        model_size_bytes,
    }))
}

/// A validation table that has gone missing only disables scoring.
async fn load_validation(
    state: &AppState,
    bucket: &str,
    name: &str,
    columns: &[&str],
) -> Result<NumericRows, ApiError> {
    // ---
    match state.store.get_object(bucket, name).await {
        Ok(bytes) => Ok(table::read_numeric_columns(&bytes, name, columns)?),
        Err(StorageError::NotFound { .. }) => {
            warn!("Validation table {} not found, skipping scoring", name);
            Ok(NumericRows::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn request() -> TrainRequest {
        TrainRequest {
            train_filename: "train.csv".to_string(),
            merged_data_id: 1,
            model_name: None,
            iterations: None,
            max_depth: None,
        }
    }

    #[test]
    fn test_model_object_name() {
        // ---
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            model_object_name("aqi_model", at),
            "aqi_model_20240309_070501.json"
        );
    }

    #[test]
    fn test_request_defaults() {
        // ---
        let req = request();
        assert_eq!(req.model_name().unwrap(), DEFAULT_MODEL_NAME);
        let params = req.params().unwrap();
        assert_eq!(params.iterations, 200);
        assert_eq!(params.max_depth, 5);
    }

    #[test]
    fn test_request_rejects_bad_values() {
        // ---
        let mut req = request();
        req.model_name = Some("../escape".to_string());
        assert!(matches!(req.model_name(), Err(ApiError::Validation(_))));

        let mut req = request();
        req.iterations = Some(0);
        assert!(req.params().is_err());

        let mut req = request();
        req.max_depth = Some(50);
        assert!(req.params().is_err());
    }

    #[test]
    fn test_training_columns() {
        assert_eq!(
            training_columns(),
            vec!["DEWP", "WDSP", "MAX", "MIN", "PRCP", "MONTH", "pm25_value", "AQI"]
        );
    }
}
