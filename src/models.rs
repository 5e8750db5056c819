//! Typed records flowing through the air quality pipeline.
//!
//! Raw CSV rows (`Raw*`) are deserialized as-is from the archives and then
//! converted into strongly typed records; the merger only ever sees the
//! typed form.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---

/// Pollutants accepted by training and merge requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    No2,
    Co,
    O3,
}

impl Pollutant {
    pub const ALL: [Pollutant; 4] = [Pollutant::Pm25, Pollutant::No2, Pollutant::Co, Pollutant::O3];

    /// Parameter name as it appears in OpenAQ records.
    pub fn as_str(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::No2 => "no2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported pollutant '{0}', expected one of {supported:?}", supported = Pollutant::ALL.map(Pollutant::as_str))]
pub struct UnsupportedPollutant(pub String);

impl FromStr for Pollutant {
    type Err = UnsupportedPollutant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pollutant::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnsupportedPollutant(s.to_string()))
    }
}

/// Render a date the way every output table labels it.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Parse `YYYY-MM-DD` (GSOD) or `YYYY/MM/DD` (our own tables).
pub fn parse_day(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
}

/// Raw daily summary row from the GSOD archive (or our trimmed copy of it).
#[derive(Debug, Clone, Deserialize)]
pub struct RawWeatherRow {
    // ---
    #[serde(rename = "STATION", default)]
    pub station: String,
    #[serde(rename = "DATE")]
    pub date: String,
    #[serde(rename = "LATITUDE")]
    pub latitude: f64,
    #[serde(rename = "LONGITUDE")]
    pub longitude: f64,
    #[serde(rename = "DEWP")]
    pub dewp: f64,
    #[serde(rename = "WDSP")]
    pub wdsp: f64,
    #[serde(rename = "MAX")]
    pub max: f64,
    #[serde(rename = "MIN")]
    pub min: f64,
    #[serde(rename = "PRCP")]
    pub prcp: f64,
}

/// One calendar day at one weather station.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    // ---
    pub station: String,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub dewp: f64,
    pub wdsp: f64,
    pub max: f64,
    pub min: f64,
    pub prcp: f64,
}

impl WeatherRecord {
    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

impl RawWeatherRow {
    // ---
    pub fn to_record(&self) -> Result<WeatherRecord, chrono::ParseError> {
        // ---
        Ok(WeatherRecord {
            station: self.station.clone(),
            date: parse_day(&self.date)?,
            latitude: self.latitude,
            longitude: self.longitude,
            dewp: self.dewp,
            wdsp: self.wdsp,
            max: self.max,
            min: self.min,
            prcp: self.prcp,
        })
    }
}

/// Raw long-format measurement row from the OpenAQ archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSensorRow {
    // ---
    pub location_id: String,
    pub datetime: String,
    pub lat: f64,
    pub lon: f64,
    pub parameter: String,
    pub value: f64,
    pub units: String,
}

/// A single sensor measurement with an offset-aware instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    // ---
    pub location_id: String,
    pub datetime: DateTime<FixedOffset>,
    pub lat: f64,
    pub lon: f64,
    pub parameter: String,
    pub value: f64,
    pub units: String,
}

impl RawSensorRow {
    // ---
    pub fn to_reading(&self) -> Result<SensorReading, chrono::ParseError> {
        // ---
        Ok(SensorReading {
            location_id: self.location_id.clone(),
            datetime: DateTime::parse_from_rfc3339(&self.datetime)?,
            lat: self.lat,
            lon: self.lon,
            parameter: self.parameter.clone(),
            value: self.value,
            units: self.units.clone(),
        })
    }
}

/// A reading kept as the daily representative, labelled with its local date.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReading {
    pub date: NaiveDate,
    pub reading: SensorReading,
}

/// Wide-format air quality row: one per (location, local date).
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedReading {
    // ---
    pub location_id: String,
    pub date: NaiveDate,
    pub lat: f64,
    pub lon: f64,
    /// parameter -> value, e.g. `pm25 -> 10.0`
    pub values: BTreeMap<String, f64>,
    /// parameter -> units, e.g. `pm25 -> µg/m³`
    pub units: BTreeMap<String, String>,
}

/// Weather joined with the pivoted air quality row of the same date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyObservation {
    // ---
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub dewp: f64,
    pub wdsp: f64,
    pub max: f64,
    pub min: f64,
    pub prcp: f64,
    pub values: BTreeMap<String, f64>,
    pub units: BTreeMap<String, String>,
}

impl DailyObservation {
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn value(&self, parameter: &str) -> Option<f64> {
        self.values.get(parameter).copied()
    }
}

/// A daily observation carrying its AQI label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledObservation {
    pub observation: DailyObservation,
    pub aqi: f64,
}

/// Month based split of the labelled table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSplit {
    // ---
    /// January through October, labelled.
    pub train: Vec<LabeledObservation>,
    /// November and December, labelled (offline evaluation).
    pub validate: Vec<LabeledObservation>,
    /// November and December with the label stripped.
    pub test: Vec<DailyObservation>,
}
