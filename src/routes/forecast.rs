// src/routes/forecast.rs
//! `POST /forecast-aqi/` and `POST /forecast-aqi-withimg/`: next-day AQI
//! from a stored model, optionally illustrated by a generated image.

use axum::{extract::State, routing::post, Json, Router};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    aqi::prompt_for,
    catalog,
    forecast::{Forecast, ForecastRequest, ForecastResponse},
    model::AqiModel,
    storage::IMAGE_BUCKET,
    ApiError, AppState,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/forecast-aqi/", post(forecast_handler))
        .route("/forecast-aqi-withimg/", post(forecast_with_image_handler))
}

async fn forecast_handler(
    State(state): State<AppState>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    // ---
    info!("POST /forecast-aqi/ - {} (model {})", req.city_name, req.model_id);
    let forecast = predict(&state, &req).await?;

    Ok(Json(ForecastResponse {
        city_name: req.city_name,
        forecast,
        image_url: None,
    }))
}

async fn forecast_with_image_handler(
    State(state): State<AppState>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    // ---
    info!(
        "POST /forecast-aqi-withimg/ - {} (model {})",
        req.city_name, req.model_id
    );
    let forecast = predict(&state, &req).await?;

    let image_url = match illustrate(&state, &forecast).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Image for {} not generated: {}", forecast.city_name, e);
            None
        }
    };

    Ok(Json(ForecastResponse {
        city_name: req.city_name,
        forecast,
        image_url: Some(image_url),
    }))
}

async fn predict(state: &AppState, req: &ForecastRequest) -> Result<Forecast, ApiError> {
    // ---
    let features = req.features().map_err(ApiError::Validation)?;

    let record = catalog::get_trained_model(&state.pool, req.model_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Model {} not found", req.model_id)))?;
    debug!("Loading model {} from {}/{}", record.id, record.bucket, record.model_path);

    let bytes = state
        .store
        .get_object(&record.bucket, &record.model_path)
        .await?;
    let model = AqiModel::from_bytes(&bytes)?;
    let predicted_aqi = model.predict(&features)?;

    // pm25_value is the last model feature
    let pm25_value = features.last().copied().unwrap_or_default();
    let forecast = Forecast::new(
        &req.city_name,
        pm25_value,
        predicted_aqi,
        local_today(),
    );
    info!(
        "Forecast for {} on {}: AQI {:.2} ({})",
        forecast.city_name, forecast.date, forecast.predicted_aqi, forecast.descriptor
    );
    Ok(forecast)
}

/// Forecast dates follow the server's local calendar.
fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Generate, store and record an image for the forecast's category.
///
/// `Ok(None)` when image generation is not configured.
async fn illustrate(state: &AppState, forecast: &Forecast) -> Result<Option<String>, ApiError> {
    // ---
    let Some(generator) = state.images.as_ref() else {
        debug!("Image generation disabled");
        return Ok(None);
    };

    let image = generator.generate(prompt_for(&forecast.descriptor)).await?;

    let key = format!("{}_{}", Uuid::new_v4().simple(), image.file_name);
    state
        .store
        .put_object(IMAGE_BUCKET, &key, image.bytes, "image/png")
        .await?;

    let image_url = format!(
        "{}/{}/{}",
        state.config.public_image_base_url, IMAGE_BUCKET, key
    );
    catalog::insert_generated_image(
        &state.pool,
        &key,
        IMAGE_BUCKET,
        &forecast.city_name,
        forecast.predicted_aqi,
        &forecast.descriptor,
        &image_url,
    )
    .await?;

    info!("Stored forecast image {} (from {})", key, image.source_url);
    Ok(Some(image_url))
}
