//! Air quality forecasting pipeline.
//!
//! Fetches daily weather (NOAA GSOD) and air quality readings (OpenAQ) from
//! the public archives, merges them into labelled training tables, trains a
//! regression model for the next day's AQI and serves forecasts over HTTP.
//!
//! Module boundaries follow the same gateway layout as the binary: handlers
//! under `routes` only reach the rest of the crate through the items
//! re-exported here.

use std::sync::Arc;

use sqlx::PgPool;

pub mod aqi;
pub mod archive;
pub mod catalog;
pub mod cities;
pub mod config;
pub mod error;
pub mod forecast;
pub mod imagegen;
pub mod merge;
pub mod model;
pub mod models;
pub mod routes;
pub mod schema;
pub mod storage;
pub mod table;

pub use config::Config;
pub use error::ApiError;
pub use models::*;
pub use storage::{ObjectStore, StorageError};

// ---

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub pool: PgPool,
    pub config: Config,

    /// Artifact store (MinIO).
    pub store: Arc<dyn ObjectStore>,

    /// Read-only public archive buckets.
    pub archive: Arc<dyn ObjectStore>,

    /// `None` disables forecast images.
    pub images: Option<Arc<dyn imagegen::ImageGenerator>>,
}
