//! CSV encoding and decoding for every table the pipeline stores.
//!
//! Decoding is all-or-nothing: the first malformed row fails the whole
//! table with its line number, so a half-parsed dataset is never handed to
//! the merger or written back to storage.

use std::collections::BTreeSet;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{
    format_day, DailyObservation, LabeledObservation, RawSensorRow, RawWeatherRow, SensorReading,
    WeatherRecord,
};

// ---

pub const WEATHER_COLUMNS: [&str; 8] = [
    "DATE", "LATITUDE", "LONGITUDE", "DEWP", "WDSP", "MAX", "MIN", "PRCP",
];

pub const READING_COLUMNS: [&str; 7] = [
    "location_id",
    "datetime",
    "lat",
    "lon",
    "parameter",
    "value",
    "units",
];

/// Label column of the training tables.
pub const LABEL_COLUMN: &str = "AQI";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("{dataset} line {line}: {reason}")]
    Malformed {
        dataset: String,
        line: u64,
        reason: String,
    },

    #[error("Missing columns in {dataset}: {columns:?}")]
    MissingColumns {
        dataset: String,
        columns: Vec<String>,
    },

    #[error("CSV write failed: {0}")]
    Write(#[from] csv::Error),

    #[error("CSV buffer flush failed: {0}")]
    Flush(String),
}

fn malformed(dataset: &str, line: u64, reason: impl Into<String>) -> TableError {
    TableError::Malformed {
        dataset: dataset.to_string(),
        line,
        reason: reason.into(),
    }
}

fn require_columns(dataset: &str, headers: &StringRecord, columns: &[&str]) -> Result<(), TableError> {
    // ---
    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !headers.iter().any(|h| h == **c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TableError::MissingColumns {
            dataset: dataset.to_string(),
            columns: missing,
        })
    }
}

/// Deserialize every row, remembering each row's line number.
fn decode_rows<T: DeserializeOwned>(
    bytes: &[u8],
    dataset: &str,
    required: &[&str],
) -> Result<Vec<(u64, T)>, TableError> {
    // ---
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| malformed(dataset, 1, e.to_string()))?
        .clone();
    require_columns(dataset, &headers, required)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line());
            malformed(dataset, line, e.to_string())
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let row = record
            .deserialize::<T>(Some(&headers))
            .map_err(|e| malformed(dataset, line, e.to_string()))?;
        rows.push((line, row));
    }
    Ok(rows)
}

/// Decode a GSOD daily summary table.
pub fn read_weather(bytes: &[u8], dataset: &str) -> Result<Vec<WeatherRecord>, TableError> {
    // ---
    decode_rows::<RawWeatherRow>(bytes, dataset, &WEATHER_COLUMNS)?
        .into_iter()
        .map(|(line, raw)| {
            raw.to_record()
                .map_err(|e| malformed(dataset, line, format!("DATE '{}': {}", raw.date, e)))
        })
        .collect()
}

/// Decode a long-format OpenAQ measurement table.
pub fn read_readings(bytes: &[u8], dataset: &str) -> Result<Vec<SensorReading>, TableError> {
    // ---
    decode_rows::<RawSensorRow>(bytes, dataset, &READING_COLUMNS)?
        .into_iter()
        .map(|(line, raw)| {
            raw.to_reading().map_err(|e| {
                malformed(dataset, line, format!("datetime '{}': {}", raw.datetime, e))
            })
        })
        .collect()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, TableError> {
    wtr.into_inner()
        .map_err(|e| TableError::Flush(e.to_string()))
}

#[derive(Serialize)]
struct WeatherCsvRow<'a> {
    #[serde(rename = "STATION")]
    station: &'a str,
    #[serde(rename = "DATE")]
    date: String,
    #[serde(rename = "LATITUDE")]
    latitude: f64,
    #[serde(rename = "LONGITUDE")]
    longitude: f64,
    #[serde(rename = "DEWP")]
    dewp: f64,
    #[serde(rename = "WDSP")]
    wdsp: f64,
    #[serde(rename = "MAX")]
    max: f64,
    #[serde(rename = "MIN")]
    min: f64,
    #[serde(rename = "PRCP")]
    prcp: f64,
    #[serde(rename = "MONTH")]
    month: u32,
}

/// Encode the trimmed weather table stored after a NOAA fetch.
pub fn write_weather(records: &[WeatherRecord]) -> Result<Vec<u8>, TableError> {
    // ---
    let mut wtr = csv::Writer::from_writer(vec![]);
    for r in records {
        wtr.serialize(WeatherCsvRow {
            station: &r.station,
            date: r.date.format("%Y-%m-%d").to_string(),
            latitude: r.latitude,
            longitude: r.longitude,
            dewp: r.dewp,
            wdsp: r.wdsp,
            max: r.max,
            min: r.min,
            prcp: r.prcp,
            month: r.month(),
        })?;
    }
    finish(wtr)
}

/// Encode long-format readings, timestamps kept with their offsets.
pub fn write_readings(readings: &[SensorReading]) -> Result<Vec<u8>, TableError> {
    // ---
    let mut wtr = csv::Writer::from_writer(vec![]);
    for r in readings {
        wtr.serialize(RawSensorRow {
            location_id: r.location_id.clone(),
            datetime: r.datetime.to_rfc3339(),
            lat: r.lat,
            lon: r.lon,
            parameter: r.parameter.clone(),
            value: r.value,
            units: r.units.clone(),
        })?;
    }
    finish(wtr)
}

fn write_table<'a, I>(rows: I, with_label: bool) -> Result<Vec<u8>, TableError>
where
    I: Iterator<Item = (&'a DailyObservation, Option<f64>)> + Clone,
{
    // ---
    let parameters: BTreeSet<&str> = rows
        .clone()
        .flat_map(|(o, _)| o.values.keys().chain(o.units.keys()).map(String::as_str))
        .collect();

    let mut header: Vec<String> = ["DATE", "LATITUDE", "LONGITUDE", "DEWP", "WDSP", "MAX", "MIN", "PRCP", "MONTH"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for p in &parameters {
        header.push(format!("{p}_value"));
        header.push(format!("{p}_units"));
    }
    if with_label {
        header.push(LABEL_COLUMN.to_string());
    }

    let mut wtr = WriterBuilder::new().from_writer(vec![]);
    wtr.write_record(&header)?;

    for (o, aqi) in rows {
        let mut record = vec![
            format_day(o.date),
            o.latitude.to_string(),
            o.longitude.to_string(),
            o.dewp.to_string(),
            o.wdsp.to_string(),
            o.max.to_string(),
            o.min.to_string(),
            o.prcp.to_string(),
            o.month().to_string(),
        ];
        for p in &parameters {
            record.push(o.values.get(*p).map(f64::to_string).unwrap_or_default());
            record.push(o.units.get(*p).cloned().unwrap_or_default());
        }
        if with_label {
            record.push(aqi.map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Encode a labelled table (train or validate split).
pub fn write_labeled(rows: &[LabeledObservation]) -> Result<Vec<u8>, TableError> {
    write_table(rows.iter().map(|r| (&r.observation, Some(r.aqi))), true)
}

/// Encode an unlabelled table (test split).
pub fn write_unlabeled(rows: &[DailyObservation]) -> Result<Vec<u8>, TableError> {
    write_table(rows.iter().map(|o| (o, None)), false)
}

/// Numeric columns extracted from a stored table, in the requested order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericRows {
    pub rows: Vec<Vec<f64>>,
    /// Rows dropped because one of the requested cells was empty.
    pub skipped: usize,
}

/// Pull the named numeric columns out of a stored table.
///
/// Missing header columns are reported together; an empty cell drops the
/// row; a non-numeric cell fails the table.
pub fn read_numeric_columns(
    bytes: &[u8],
    dataset: &str,
    columns: &[&str],
) -> Result<NumericRows, TableError> {
    // ---
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| malformed(dataset, 1, e.to_string()))?
        .clone();
    require_columns(dataset, &headers, columns)?;

    let indexes: Vec<usize> = columns
        .iter()
        .filter_map(|c| headers.iter().position(|h| h == *c))
        .collect();

    let mut out = NumericRows::default();
    'records: for result in rdr.records() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line());
            malformed(dataset, line, e.to_string())
        })?;
        let line = record.position().map_or(0, |p| p.line());

        let mut row = Vec::with_capacity(indexes.len());
        for (&idx, name) in indexes.iter().zip(columns) {
            let cell = record.get(idx).unwrap_or("");
            if cell.is_empty() {
                out.skipped += 1;
                continue 'records;
            }
            let value = cell
                .parse::<f64>()
                .map_err(|e| malformed(dataset, line, format!("{name} '{cell}': {e}")))?;
            row.push(value);
        }
        out.rows.push(row);
    }
    Ok(out)
}
