// src/routes/health.rs
//! Liveness endpoint used by container orchestrators and CI.
//!
//! Exports a subrouter with `GET /health` to the gateway (`mod.rs`).

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch the database, the object store or the image service.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter generic over the gateway state so it merges with any router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
