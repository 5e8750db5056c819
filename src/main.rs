//! Application entry point for the `airquality-forecast` backend service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool and creating the schema
//! - Connecting the artifact store (MinIO) and the public archive buckets
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! See [`airquality_forecast::config::load_from_env`] for the service
//! settings. Logging is controlled separately:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `FORCE_COLOR` (optional) – override TTY colour detection
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use airquality_forecast::{
    config,
    imagegen::{DashScopeClient, ImageGenerator},
    routes, schema,
    storage::{self, ObjectStore, S3ObjectStore},
    AppState,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::minio(
            &cfg.minio_endpoint,
            &cfg.minio_access_key,
            &cfg.minio_secret_key,
            cfg.minio_use_ssl,
        )
        .await,
    );
    storage::ensure_buckets(store.as_ref()).await?;

    let archive: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::public(&cfg.archive_region).await);

    let images = match cfg.dashscope_api_key.as_deref() {
        Some(key) => {
            let client = DashScopeClient::new(&cfg.dashscope_base_url, key)?;
            Some(Arc::new(client) as Arc<dyn ImageGenerator>)
        }
        None => {
            tracing::warn!("DASHSCOPE_API_KEY not set, forecast images disabled");
            None
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.bind_port));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(AppState {
        pool,
        config: cfg,
        store,
        archive,
        images,
    });

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR`:
///   `1|true|yes` forces colors on, `0|false|no` forces them off,
///   anything else auto-detects
/// - Span events from `AXUM_SPAN_EVENTS`: `full` (enter, exit, close),
///   `enter_exit`, or close only by default
/// - Level from `RUST_LOG` if set, else `AXUM_LOG_LEVEL`
///
/// Call once at startup before any logging macro is invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        // The AWS SDK and hyper are very chatty at debug
        EnvFilter::new(format!(
            "{level},sqlx::query=warn,aws_config=warn,aws_smithy_runtime=warn,hyper=info"
        ))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
