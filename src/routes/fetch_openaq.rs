// src/routes/fetch_openaq.rs
//! `GET /fetch-openaq/`: copy one year of OpenAQ sensor readings per city from
//! the public archive into the artifact store, in long format.

use std::collections::BTreeSet;

use axum::{extract::State, routing::get, Json, Router};
use tracing::{debug, error, info};

use super::summary::{key_segment, BatchSummary, CityOutcome};
use crate::{
    archive, catalog,
    cities::{City, CITIES},
    storage::OPENAQ_BUCKET,
    table, ApiError, AppState, SensorReading,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/fetch-openaq/", get(handler))
}

async fn handler(State(state): State<AppState>) -> Json<BatchSummary> {
    // ---
    info!("GET /fetch-openaq/ - Starting pipeline for {} cities", CITIES.len());

    let mut outcomes = Vec::with_capacity(CITIES.len());
    for city in CITIES.iter() {
        debug!("GET /fetch-openaq/ - {}", city.name);
        let outcome = match fetch_city(&state, city).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("OpenAQ fetch for {} failed: {}", city.name, e);
                CityOutcome::error(city.name, e.to_string())
            }
        };
        outcomes.push(outcome);
    }

    let summary = BatchSummary::from(outcomes);
    info!(
        "OpenAQ fetch complete: {} ok, {} failed",
        summary.successful, summary.failed
    );
    Json(summary)
}

// ---

pub fn openaq_file_name(city: &City, year: i32) -> String {
    format!(
        "openaq_{}_{}_{}.csv",
        key_segment(city.station_name),
        year,
        city.aq_location_id
    )
}

/// Distinct parameter names and location ids, sorted.
pub fn distinct_keys(readings: &[SensorReading]) -> (Vec<String>, Vec<String>) {
    // ---
    let parameters: BTreeSet<&str> = readings.iter().map(|r| r.parameter.as_str()).collect();
    let locations: BTreeSet<&str> = readings.iter().map(|r| r.location_id.as_str()).collect();
    (
        parameters.into_iter().map(str::to_string).collect(),
        locations.into_iter().map(str::to_string).collect(),
    )
}

async fn fetch_city(state: &AppState, city: &City) -> Result<CityOutcome, ApiError> {
    // ---
    let year = state.config.data_year;

    // Step 1: archive download
    let readings =
        archive::fetch_openaq_year(state.archive.as_ref(), city.aq_location_id, year).await?;
    if readings.is_empty() {
        return Ok(CityOutcome::error(
            city.name,
            format!(
                "No OpenAQ data for location {} in {}",
                city.aq_location_id, year
            ),
        ));
    }

    // Step 2: store and record
    let file_name = openaq_file_name(city, year);
    let body = table::write_readings(&readings)?;
    state
        .store
        .put_object(OPENAQ_BUCKET, &file_name, body, "text/csv")
        .await?;

    let (parameters, location_ids) = distinct_keys(&readings);
    let record_count = i32::try_from(readings.len()).unwrap_or(i32::MAX);
    catalog::insert_openaq_data(
        &state.pool,
        &file_name,
        OPENAQ_BUCKET,
        city.name,
        parameters,
        year,
        record_count,
        location_ids,
    )
    .await?;

    Ok(CityOutcome::success(
        city.name,
        file_name,
        format!("Stored {} readings", readings.len()),
    ))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::RawSensorRow;

    fn reading(location_id: &str, parameter: &str) -> SensorReading {
        RawSensorRow {
            location_id: location_id.to_string(),
            datetime: "2023-01-01T00:00:00-08:00".to_string(),
            lat: 34.0,
            lon: -118.0,
            parameter: parameter.to_string(),
            value: 1.0,
            units: "µg/m³".to_string(),
        }
        .to_reading()
        .unwrap()
    }

    #[test]
    fn test_openaq_file_name() {
        assert_eq!(
            openaq_file_name(&CITIES[0], 2023),
            "openaq_LOS_ANGELES_INTERNATIONAL_AIRPORT_2023_2138.csv"
        );
    }

    #[test]
    fn test_distinct_keys_are_sorted_and_unique() {
        // ---
        let readings = vec![
            reading("2138", "pm25"),
            reading("2138", "co"),
            reading("2140", "pm25"),
        ];
        let (parameters, locations) = distinct_keys(&readings);
        assert_eq!(parameters, vec!["co", "pm25"]);
        assert_eq!(locations, vec!["2138", "2140"]);
    }
}
