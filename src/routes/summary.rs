//! Per-city outcome reporting shared by the fetch endpoints.

use serde::Serialize;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minio_file: Option<String>,
}

impl CityOutcome {
    pub fn success(city: &str, minio_file: String, message: String) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message,
            city: city.to_string(),
            minio_file: Some(minio_file),
        }
    }

    pub fn error(city: &str, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: message.into(),
            city: city.to_string(),
            minio_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub results: Vec<CityOutcome>,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
}

impl From<Vec<CityOutcome>> for BatchSummary {
    fn from(results: Vec<CityOutcome>) -> Self {
        // ---
        let successful = results
            .iter()
            .filter(|r| r.status == OutcomeStatus::Success)
            .count();
        let total_processed = results.len();

        Self {
            failed: total_processed - successful,
            results,
            total_processed,
            successful,
        }
    }
}

/// `Los Angeles` -> `Los_Angeles`, for object keys.
pub fn key_segment(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_summary_counts() {
        // ---
        let summary = BatchSummary::from(vec![
            CityOutcome::success("Los Angeles", "a.csv".into(), "ok".into()),
            CityOutcome::error("San Francisco", "no data"),
            CityOutcome::success("PHILADELPHIA", "b.csv".into(), "ok".into()),
        ]);
        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"][1]["status"], "error");
        assert!(json["results"][1].get("minio_file").is_none());
        assert_eq!(json["results"][0]["minio_file"], "a.csv");
    }

    #[test]
    fn test_key_segment() {
        assert_eq!(key_segment("Los Angeles"), "Los_Angeles");
        assert_eq!(key_segment("LOS ANGELES DOWNTOWN/USC, CA US"), "LOS_ANGELES_DOWNTOWN_USC_CA_US");
    }
}
