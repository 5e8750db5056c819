//! Metadata records for every artifact the pipeline stores.
//!
//! Objects live in the object store; these rows describe them so later
//! steps (training, forecasting) can find and validate their inputs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::Json, FromRow, PgPool};

use crate::cities::City;

// ---

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NoaaDataset {
    // ---
    pub id: i64,
    pub filename: String,
    pub bucket: String,
    pub city_name: String,
    pub station_id: String,
    pub station_name: String,
    pub station_lat: f64,
    pub station_lon: f64,
    pub year_start: i32,
    pub year_end: i32,
    pub record_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OpenAqDataset {
    // ---
    pub id: i64,
    pub filename: String,
    pub bucket: String,
    pub city_name: String,
    pub parameters: Json<Vec<String>>,
    pub year_start: i32,
    pub year_end: i32,
    pub record_count: i32,
    pub location_ids: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MergedDataset {
    // ---
    pub id: i64,
    pub train_filename: Option<String>,
    pub validate_filename: Option<String>,
    pub test_filename: Option<String>,
    pub bucket: Option<String>,
    pub noaa_dataset_id: Option<i64>,
    pub openaq_dataset_id: Option<i64>,
    pub pollutant: Option<String>,
    pub train_record_count: Option<i32>,
    pub test_record_count: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrainedModelRecord {
    // ---
    pub id: i64,
    pub model_name: String,
    pub model_path: String,
    pub bucket: String,
    pub merged_dataset_id: i64,
    pub leaderboard: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`insert_merged_data`].
#[derive(Debug, Clone)]
pub struct NewMergedDataset<'a> {
    pub train_filename: &'a str,
    pub validate_filename: &'a str,
    pub test_filename: &'a str,
    pub bucket: &'a str,
    pub noaa_dataset_id: Option<i64>,
    pub openaq_dataset_id: Option<i64>,
    pub pollutant: &'a str,
    pub train_record_count: i32,
    pub test_record_count: i32,
}

/// Insert the station if it is new; returns its row id either way.
pub async fn upsert_station(pool: &PgPool, city: &City) -> Result<i64, sqlx::Error> {
    // ---
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO gsod_station (
            station_id, usaf, wban, station_name, country, state, icao,
            latitude, longitude, elevation_m, begin_date, end_date
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (station_id) DO UPDATE SET station_id = EXCLUDED.station_id
        RETURNING id
        "#,
    )
    .bind(city.station_id)
    .bind(city.usaf)
    .bind(city.wban)
    .bind(city.station_name)
    .bind(city.country)
    .bind(city.state)
    .bind(city.icao)
    .bind(city.latitude)
    .bind(city.longitude)
    .bind(city.elevation_m)
    .bind(city.begin_date)
    .bind(city.end_date)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

const NOAA_SELECT: &str = r#"
    SELECT n.id, n.filename, n.bucket, n.city_name,
           s.station_id, s.station_name,
           s.latitude AS station_lat, s.longitude AS station_lon,
           n.year_start, n.year_end, n.record_count, n.created_at
    FROM noaa_data n
    JOIN gsod_station s ON s.id = n.station_id
"#;

#[allow(clippy::too_many_arguments)]
pub async fn insert_noaa_data(
    pool: &PgPool,
    filename: &str,
    bucket: &str,
    city_name: &str,
    station_row_id: i64,
    year_start: i32,
    year_end: i32,
    record_count: i32,
) -> Result<NoaaDataset, sqlx::Error> {
    // ---
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO noaa_data (filename, bucket, city_name, station_id, year_start, year_end, record_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(filename)
    .bind(bucket)
    .bind(city_name)
    .bind(station_row_id)
    .bind(year_start)
    .bind(year_end)
    .bind(record_count)
    .fetch_one(pool)
    .await?;

    sqlx::query_as::<_, NoaaDataset>(&format!("{NOAA_SELECT} WHERE n.id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

/// Most recent NOAA dataset stored under `filename`.
pub async fn find_noaa_data(pool: &PgPool, filename: &str) -> Result<Option<NoaaDataset>, sqlx::Error> {
    sqlx::query_as::<_, NoaaDataset>(&format!(
        "{NOAA_SELECT} WHERE n.filename = $1 ORDER BY n.id DESC LIMIT 1"
    ))
    .bind(filename)
    .fetch_optional(pool)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_openaq_data(
    pool: &PgPool,
    filename: &str,
    bucket: &str,
    city_name: &str,
    parameters: Vec<String>,
    year: i32,
    record_count: i32,
    location_ids: Vec<String>,
) -> Result<OpenAqDataset, sqlx::Error> {
    // ---
    sqlx::query_as::<_, OpenAqDataset>(
        r#"
        INSERT INTO openaq_data (filename, bucket, city_name, parameters, year_start, year_end, record_count, location_ids)
        VALUES ($1, $2, $3, $4, $5, $5, $6, $7)
        RETURNING id, filename, bucket, city_name, parameters, year_start, year_end,
                  record_count, location_ids, created_at
        "#,
    )
    .bind(filename)
    .bind(bucket)
    .bind(city_name)
    .bind(Json(parameters))
    .bind(year)
    .bind(record_count)
    .bind(Json(location_ids))
    .fetch_one(pool)
    .await
}

pub async fn find_openaq_data(
    pool: &PgPool,
    filename: &str,
) -> Result<Option<OpenAqDataset>, sqlx::Error> {
    sqlx::query_as::<_, OpenAqDataset>(
        r#"
        SELECT id, filename, bucket, city_name, parameters, year_start, year_end,
               record_count, location_ids, created_at
        FROM openaq_data WHERE filename = $1 ORDER BY id DESC LIMIT 1
        "#,
    )
    .bind(filename)
    .fetch_optional(pool)
    .await
}

const MERGED_COLUMNS: &str = "id, train_filename, validate_filename, test_filename, bucket, \
     noaa_dataset_id, openaq_dataset_id, pollutant, train_record_count, test_record_count, created_at";

pub async fn insert_merged_data(
    pool: &PgPool,
    new: NewMergedDataset<'_>,
) -> Result<MergedDataset, sqlx::Error> {
    // ---
    sqlx::query_as::<_, MergedDataset>(&format!(
        r#"
        INSERT INTO merged_data (
            train_filename, validate_filename, test_filename, bucket, noaa_dataset_id,
            openaq_dataset_id, pollutant, train_record_count, test_record_count
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {MERGED_COLUMNS}
        "#
    ))
    .bind(new.train_filename)
    .bind(new.validate_filename)
    .bind(new.test_filename)
    .bind(new.bucket)
    .bind(new.noaa_dataset_id)
    .bind(new.openaq_dataset_id)
    .bind(new.pollutant)
    .bind(new.train_record_count)
    .bind(new.test_record_count)
    .fetch_one(pool)
    .await
}

pub async fn get_merged_data(pool: &PgPool, id: i64) -> Result<Option<MergedDataset>, sqlx::Error> {
    sqlx::query_as::<_, MergedDataset>(&format!(
        "SELECT {MERGED_COLUMNS} FROM merged_data WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_trained_model(
    pool: &PgPool,
    model_name: &str,
    model_path: &str,
    bucket: &str,
    merged_dataset_id: i64,
    leaderboard: serde_json::Value,
) -> Result<TrainedModelRecord, sqlx::Error> {
    // ---
    sqlx::query_as::<_, TrainedModelRecord>(
        r#"
        INSERT INTO trained_model (model_name, model_path, bucket, merged_dataset_id, leaderboard)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, model_name, model_path, bucket, merged_dataset_id, leaderboard, created_at
        "#,
    )
    .bind(model_name)
    .bind(model_path)
    .bind(bucket)
    .bind(merged_dataset_id)
    .bind(Json(leaderboard))
    .fetch_one(pool)
    .await
}

pub async fn get_trained_model(
    pool: &PgPool,
    id: i64,
) -> Result<Option<TrainedModelRecord>, sqlx::Error> {
    sqlx::query_as::<_, TrainedModelRecord>(
        r#"
        SELECT id, model_name, model_path, bucket, merged_dataset_id, leaderboard, created_at
        FROM trained_model WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_generated_image(
    pool: &PgPool,
    filename: &str,
    bucket: &str,
    city_name: &str,
    aqi: f64,
    theme: &str,
    image_url: &str,
) -> Result<i64, sqlx::Error> {
    // ---
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO generated_image (filename, bucket, city_name, aqi, theme, image_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(filename)
    .bind(bucket)
    .bind(city_name)
    .bind(aqi)
    .bind(theme)
    .bind(image_url)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
