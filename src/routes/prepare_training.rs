// src/routes/prepare_training.rs
//! `POST /prepare-training/`: merge a stored NOAA file with a stored OpenAQ
//! file into labelled train/validate tables and an unlabelled test table.

use axum::{extract::State, routing::post, Json, Router};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    catalog::{self, MergedDataset, NewMergedDataset},
    merge,
    storage::{MERGED_BUCKET, NOAA_BUCKET, OPENAQ_BUCKET},
    table, ApiError, AppState, Pollutant,
};

// ---

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    pub noaa_filename: String,
    pub openaq_filename: String,
    pub pollutant: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl PrepareRequest {
    /// Parse the pollutant and timezone; nothing is fetched until both are
    /// known to be valid.
    fn validate(&self) -> Result<(Pollutant, Tz), ApiError> {
        // ---
        let pollutant = self
            .pollutant
            .parse::<Pollutant>()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let tz_name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| ApiError::Validation(format!("Unknown timezone '{}'", tz_name)))?;

        if self.noaa_filename.trim().is_empty() || self.openaq_filename.trim().is_empty() {
            return Err(ApiError::Validation(
                "noaa_filename and openaq_filename are required".to_string(),
            ));
        }
        Ok((pollutant, tz))
    }
}

/// Output object names derived from the NOAA file name.
pub fn split_file_names(pollutant: Pollutant, noaa_filename: &str) -> [String; 3] {
    // ---
    let stem = noaa_filename.strip_suffix(".csv").unwrap_or(noaa_filename);
    ["train", "validate", "test"].map(|split| format!("{}_{}_{}.csv", split, pollutant, stem))
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/prepare-training/", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<MergedDataset>, ApiError> {
    // ---
    info!(
        "POST /prepare-training/ - {} + {} ({})",
        req.noaa_filename, req.openaq_filename, req.pollutant
    );
    let (pollutant, tz) = req.validate()?;

    // Step 1: load both inputs
    debug!("POST /prepare-training/ - Step 1");
    let noaa_bytes = state.store.get_object(NOAA_BUCKET, &req.noaa_filename).await?;
    let openaq_bytes = state
        .store
        .get_object(OPENAQ_BUCKET, &req.openaq_filename)
        .await?;
    let weather = table::read_weather(&noaa_bytes, &req.noaa_filename)?;
    let readings = table::read_readings(&openaq_bytes, &req.openaq_filename)?;

    // Step 2: merge and label
    debug!("POST /prepare-training/ - Step 2");
    let split = merge::prepare_training_table(&weather, &readings, tz, pollutant)?;
    info!(
        "Prepared {} train, {} validate, {} test rows",
        split.train.len(),
        split.validate.len(),
        split.test.len()
    );

    // Step 3: store the tables
    debug!("POST /prepare-training/ - Step 3");
    let [train_name, validate_name, test_name] = split_file_names(pollutant, &req.noaa_filename);
    let uploads = [
        (&train_name, table::write_labeled(&split.train)?),
        (&validate_name, table::write_labeled(&split.validate)?),
        (&test_name, table::write_unlabeled(&split.test)?),
    ];
    for (name, body) in uploads {
        state
            .store
            .put_object(MERGED_BUCKET, name, body, "text/csv")
            .await?;
    }

    // Step 4: record the merged dataset
    debug!("POST /prepare-training/ - Step 4");
    let noaa = catalog::find_noaa_data(&state.pool, &req.noaa_filename).await?;
    let openaq = catalog::find_openaq_data(&state.pool, &req.openaq_filename).await?;

    let merged = catalog::insert_merged_data(
        &state.pool,
        NewMergedDataset {
            train_filename: &train_name,
            validate_filename: &validate_name,
            test_filename: &test_name,
            bucket: MERGED_BUCKET,
            noaa_dataset_id: noaa.map(|n| n.id),
            openaq_dataset_id: openaq.map(|o| o.id),
            pollutant: pollutant.as_str(),
            train_record_count: i32::try_from(split.train.len()).unwrap_or(i32::MAX),
            test_record_count: i32::try_from(split.test.len()).unwrap_or(i32::MAX),
        },
    )
    .await?;

    info!("Merged dataset {} recorded", merged.id);
    Ok(Json(merged))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn request(pollutant: &str, timezone: Option<&str>) -> PrepareRequest {
        PrepareRequest {
            noaa_filename: "noaa.csv".to_string(),
            openaq_filename: "openaq.csv".to_string(),
            pollutant: pollutant.to_string(),
            timezone: timezone.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_defaults_timezone() {
        // ---
        let (pollutant, tz) = request("pm25", None).validate().unwrap();
        assert_eq!(pollutant, Pollutant::Pm25);
        assert_eq!(tz, chrono_tz::America::Los_Angeles);

        let (_, tz) = request("o3", Some("America/New_York")).validate().unwrap();
        assert_eq!(tz, chrono_tz::America::New_York);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        // ---
        let err = request("so2", None).validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(err.to_string().contains("so2"));

        let err = request("pm25", Some("Mars/Olympus")).validate().unwrap_err();
        assert_eq!(err.to_string(), "Unknown timezone 'Mars/Olympus'");
    }

    #[test]
    fn test_split_file_names() {
        // ---
        let names = split_file_names(Pollutant::Pm25, "noaa_72295023174_Los_Angeles_2023-2023.csv");
        assert_eq!(
            names,
            [
                "train_pm25_noaa_72295023174_Los_Angeles_2023-2023.csv",
                "validate_pm25_noaa_72295023174_Los_Angeles_2023-2023.csv",
                "test_pm25_noaa_72295023174_Los_Angeles_2023-2023.csv",
            ]
        );
    }
}
