//! HTTP-facing error type.
//!
//! Handlers return `Result<_, ApiError>`; every variant renders as
//! `{"error": "<message>"}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{
    archive::ArchiveError, imagegen::ImageError, merge::MergeError, model::ModelError,
    table::TableError, StorageError,
};

// ---

#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller input is malformed or outside the supported set.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// An external service failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", status, self);
        } else {
            tracing::warn!("{}: {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<MergeError> for ApiError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::MissingPollutant(_) => ApiError::Validation(e.to_string()),
            MergeError::DuplicateDate { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<TableError> for ApiError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::MissingColumns { .. } | TableError::Malformed { .. } => {
                ApiError::Validation(e.to_string())
            }
            TableError::Write(_) | TableError::Flush(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StorageError::Backend { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Storage(e) => e.into(),
            // archive rows are not caller input
            ArchiveError::Table(_) => ApiError::Upstream(e.to_string()),
            ArchiveError::Gzip { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::EmptyTrainingSet | ModelError::Shape { .. } => {
                ApiError::Validation(e.to_string())
            }
            ModelError::Artifact(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record not found".to_string()),
            other => ApiError::Internal(format!("Database error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Pollutant;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        // ---
        let e: ApiError = MergeError::MissingPollutant(Pollutant::Co).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "Pollutant co not found in OpenAQ data");

        let e: ApiError = MergeError::DuplicateDate {
            dataset: "NOAA",
            date: "2023/01/01".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let e: ApiError = StorageError::NotFound {
            bucket: "noaa-data".into(),
            key: "x.csv".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_table_errors_split_by_origin() {
        // ---
        let malformed = || TableError::Malformed {
            dataset: "noaa.csv".into(),
            line: 3,
            reason: "DATE 'yesterday': input contains invalid characters".into(),
        };

        let e: ApiError = malformed().into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert!(e.to_string().starts_with("noaa.csv line 3:"));

        let e: ApiError = ArchiveError::Table(malformed()).into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);

        let e: ApiError = TableError::Flush("closed".into()).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
