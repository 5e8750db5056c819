//! Route gateway: every endpoint module exports a subrouter and this file
//! merges them into the application router.

use axum::Router;

use crate::AppState;

mod fetch_noaa;
mod fetch_openaq;
mod forecast;
mod health;
mod prepare_training;
mod summary;
mod train_model;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(fetch_noaa::router())
        .merge(fetch_openaq::router())
        .merge(prepare_training::router())
        .merge(train_model::router())
        .merge(forecast::router())
        .merge(health::router())
        .with_state(state)
}
