//! Readers for the public weather and air quality archives.
//!
//! - NOAA GSOD: `s3://noaa-gsod-pds/{year}/{station_id}.csv`
//! - OpenAQ: `s3://openaq-data-archive/records/csv.gz/locationid={id}/year={year}/*.csv.gz`

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::{storage::ObjectStore, table, SensorReading, StorageError, WeatherRecord};

// ---

pub const GSOD_BUCKET: &str = "noaa-gsod-pds";
pub const OPENAQ_ARCHIVE_BUCKET: &str = "openaq-data-archive";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Table(#[from] table::TableError),

    #[error("Failed to decompress {key}: {source}")]
    Gzip {
        key: String,
        source: std::io::Error,
    },
}

pub fn gsod_key(year: i32, station_id: &str) -> String {
    format!("{}/{}.csv", year, station_id)
}

pub fn openaq_prefix(location_id: &str, year: i32) -> String {
    format!("records/csv.gz/locationid={}/year={}/", location_id, year)
}

/// Decompress an in-memory gzip object.
pub async fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    // ---
    let mut decoder = GzipDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}

/// Daily summaries for one station and one year.
pub async fn fetch_gsod_year(
    archive: &dyn ObjectStore,
    station_id: &str,
    year: i32,
) -> Result<Vec<WeatherRecord>, ArchiveError> {
    // ---
    let key = gsod_key(year, station_id);
    info!("Fetching NOAA data from S3: {}", key);

    let bytes = archive.get_object(GSOD_BUCKET, &key).await?;
    Ok(table::read_weather(&bytes, &key)?)
}

/// All readings archived for one location and one year.
///
/// Objects that fail to download, decompress or decode are skipped with a
/// warning; listing failures abort. An empty result means the archive had
/// nothing usable.
pub async fn fetch_openaq_year(
    archive: &dyn ObjectStore,
    location_id: &str,
    year: i32,
) -> Result<Vec<SensorReading>, ArchiveError> {
    // ---
    let prefix = openaq_prefix(location_id, year);
    info!("Listing s3://{}/{}", OPENAQ_ARCHIVE_BUCKET, prefix);

    let keys = archive.list_objects(OPENAQ_ARCHIVE_BUCKET, &prefix).await?;
    let mut readings = Vec::new();

    for key in keys.iter().filter(|k| k.ends_with(".csv.gz")) {
        match fetch_openaq_object(archive, key).await {
            Ok(mut rows) => readings.append(&mut rows),
            Err(e) => warn!("Failed to process {}: {}", key, e),
        }
    }

    info!(
        "Collected {} readings from {} objects for location {}",
        readings.len(),
        keys.len(),
        location_id
    );
    Ok(readings)
}

async fn fetch_openaq_object(
    archive: &dyn ObjectStore,
    key: &str,
) -> Result<Vec<SensorReading>, ArchiveError> {
    // ---
    let compressed = archive.get_object(OPENAQ_ARCHIVE_BUCKET, key).await?;
    let csv = gunzip(&compressed).await.map_err(|source| ArchiveError::Gzip {
        key: key.to_string(),
        source,
    })?;
    Ok(table::read_readings(&csv, key)?)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_archive_keys() {
        // ---
        assert_eq!(gsod_key(2023, "72295023174"), "2023/72295023174.csv");
        assert_eq!(
            openaq_prefix("2138", 2023),
            "records/csv.gz/locationid=2138/year=2023/"
        );
    }
}
