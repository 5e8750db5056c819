//! Next-day forecast assembly: request validation and the response record.

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    aqi::{categorize, compute_aqi},
    format_day,
    model::FEATURES,
    Pollutant,
};

// ---

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastRequest {
    pub model_id: i64,
    pub city_name: String,
    pub forecast_data: HashMap<String, f64>,
}

impl ForecastRequest {
    /// Feature vector in model column order, or an error naming every
    /// absent key.
    pub fn features(&self) -> Result<Vec<f64>, String> {
        // ---
        if self.city_name.trim().is_empty() || self.city_name.len() > 100 {
            return Err("city_name must be between 1 and 100 characters".to_string());
        }

        let missing: Vec<&str> = FEATURES
            .iter()
            .copied()
            .filter(|k| !self.forecast_data.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(format!("Missing keys in forecast_data: {:?}", missing));
        }

        Ok(FEATURES.iter().map(|k| self.forecast_data[*k]).collect())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Forecast {
    pub date: String,
    pub city_name: String,
    pub pm25_value: f64,
    pub predicted_aqi: f64,
    pub calculated_aqi: f64,
    pub descriptor: String,
    pub color: String,
}

impl Forecast {
    /// Forecast for the day after `today`, categorised by the predicted AQI.
    pub fn new(city_name: &str, pm25_value: f64, predicted_aqi: f64, today: NaiveDate) -> Self {
        // ---
        let category = categorize(predicted_aqi);
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);

        Self {
            date: format_day(tomorrow),
            city_name: city_name.to_string(),
            pm25_value,
            predicted_aqi,
            calculated_aqi: compute_aqi(Pollutant::Pm25, pm25_value),
            descriptor: category.descriptor().to_string(),
            color: category.color().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub city_name: String,
    pub forecast: Forecast,
    /// Only present on the image endpoint; `null` when generation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
}
