//! Database schema management for `airquality-forecast`.
//!
//! Ensures required tables exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// One table per pipeline artifact: stations and the fetched NOAA/OpenAQ
/// files, merged training tables, trained models and generated images.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // GSOD station metadata, one row per USAF+WBAN id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gsod_station (
            id           BIGSERIAL PRIMARY KEY,
            station_id   VARCHAR(20)  NOT NULL UNIQUE,
            usaf         VARCHAR(6)   NOT NULL,
            wban         VARCHAR(5)   NOT NULL,
            station_name VARCHAR(128) NOT NULL,
            country      VARCHAR(64)  NOT NULL DEFAULT '',
            state        VARCHAR(64)  NOT NULL DEFAULT '',
            icao         VARCHAR(64)  NOT NULL DEFAULT '',
            latitude     DOUBLE PRECISION NOT NULL,
            longitude    DOUBLE PRECISION NOT NULL,
            elevation_m  DOUBLE PRECISION NOT NULL,
            begin_date   VARCHAR(8)   NOT NULL,
            end_date     VARCHAR(8)   NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS noaa_data (
            id           BIGSERIAL PRIMARY KEY,
            filename     VARCHAR(255) NOT NULL,
            bucket       VARCHAR(100) NOT NULL,
            city_name    VARCHAR(100) NOT NULL,
            station_id   BIGINT       NOT NULL REFERENCES gsod_station (id) ON DELETE CASCADE,
            year_start   INTEGER      NOT NULL,
            year_end     INTEGER      NOT NULL,
            record_count INTEGER      NOT NULL,
            created_at   TIMESTAMPTZ  NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS openaq_data (
            id           BIGSERIAL PRIMARY KEY,
            filename     VARCHAR(255) NOT NULL,
            bucket       VARCHAR(100) NOT NULL,
            city_name    VARCHAR(100) NOT NULL,
            parameters   JSONB        NOT NULL,
            year_start   INTEGER      NOT NULL,
            year_end     INTEGER      NOT NULL,
            record_count INTEGER      NOT NULL,
            location_ids JSONB        NOT NULL,
            created_at   TIMESTAMPTZ  NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merged_data (
            id                 BIGSERIAL PRIMARY KEY,
            train_filename     VARCHAR(255),
            validate_filename  VARCHAR(255),
            test_filename      VARCHAR(255),
            bucket             VARCHAR(100),
            noaa_dataset_id    BIGINT REFERENCES noaa_data (id) ON DELETE CASCADE,
            openaq_dataset_id  BIGINT REFERENCES openaq_data (id) ON DELETE CASCADE,
            pollutant          VARCHAR(10),
            train_record_count INTEGER,
            test_record_count  INTEGER,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trained_model (
            id                BIGSERIAL PRIMARY KEY,
            model_name        VARCHAR(100) NOT NULL,
            model_path        VARCHAR(255) NOT NULL,
            bucket            VARCHAR(100) NOT NULL,
            merged_dataset_id BIGINT       NOT NULL REFERENCES merged_data (id) ON DELETE CASCADE,
            leaderboard       JSONB        NOT NULL,
            created_at        TIMESTAMPTZ  NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generated_image (
            id         BIGSERIAL PRIMARY KEY,
            filename   VARCHAR(255)     NOT NULL,
            bucket     VARCHAR(100)     NOT NULL,
            city_name  VARCHAR(100)     NOT NULL,
            aqi        DOUBLE PRECISION NOT NULL,
            theme      VARCHAR(50)      NOT NULL,
            image_url  TEXT             NOT NULL,
            created_at TIMESTAMPTZ      NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Lookups used by prepare-training
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_noaa_data_filename
            ON noaa_data (filename);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_openaq_data_filename
            ON openaq_data (filename);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
