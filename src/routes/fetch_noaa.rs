// src/routes/fetch_noaa.rs
//! `GET /fetch-noaa/`: copy one year of GSOD daily weather per city from the
//! public archive into the artifact store.

use axum::{extract::State, routing::get, Json, Router};
use tracing::{debug, error, info};

use super::summary::{key_segment, BatchSummary, CityOutcome};
use crate::{
    archive, catalog,
    cities::{City, CITIES},
    storage::NOAA_BUCKET,
    table, ApiError, AppState,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/fetch-noaa/", get(handler))
}

async fn handler(State(state): State<AppState>) -> Json<BatchSummary> {
    // ---
    info!("GET /fetch-noaa/ - Starting pipeline for {} cities", CITIES.len());

    let mut outcomes = Vec::with_capacity(CITIES.len());
    for city in CITIES.iter() {
        debug!("GET /fetch-noaa/ - {}", city.name);
        let outcome = match fetch_city(&state, city).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("NOAA fetch for {} failed: {}", city.name, e);
                CityOutcome::error(city.name, e.to_string())
            }
        };
        outcomes.push(outcome);
    }

    let summary = BatchSummary::from(outcomes);
    info!(
        "NOAA fetch complete: {} ok, {} failed",
        summary.successful, summary.failed
    );
    Json(summary)
}

// ---

pub fn noaa_file_name(city: &City, year: i32) -> String {
    format!(
        "noaa_{}_{}_{}-{}.csv",
        city.station_id,
        key_segment(city.name),
        year,
        year
    )
}

async fn fetch_city(state: &AppState, city: &City) -> Result<CityOutcome, ApiError> {
    // ---
    let year = state.config.data_year;

    // Step 1: station metadata
    let station_row_id = catalog::upsert_station(&state.pool, city).await?;

    // Step 2: archive download
    let records = archive::fetch_gsod_year(state.archive.as_ref(), city.station_id, year).await?;
    if records.is_empty() {
        return Ok(CityOutcome::error(
            city.name,
            format!("No NOAA data for station {} in {}", city.station_id, year),
        ));
    }

    // Step 3: store and record
    let file_name = noaa_file_name(city, year);
    let body = table::write_weather(&records)?;
    state
        .store
        .put_object(NOAA_BUCKET, &file_name, body, "text/csv")
        .await?;

    let record_count = i32::try_from(records.len()).unwrap_or(i32::MAX);
    catalog::insert_noaa_data(
        &state.pool,
        &file_name,
        NOAA_BUCKET,
        city.name,
        station_row_id,
        year,
        year,
        record_count,
    )
    .await?;

    Ok(CityOutcome::success(
        city.name,
        file_name,
        format!("Stored {} daily records", records.len()),
    ))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_noaa_file_name() {
        assert_eq!(
            noaa_file_name(&CITIES[0], 2023),
            "noaa_72295023174_Los_Angeles_2023-2023.csv"
        );
    }
}
