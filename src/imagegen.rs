//! Illustrative image generation for forecasts.
//!
//! The DashScope text-to-image API is asynchronous: a task is submitted,
//! polled until it settles, and the resulting image is downloaded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

// ---

const TEXT2IMAGE_PATH: &str = "/api/v1/services/aigc/text2image/image-synthesis";
const TASKS_PATH: &str = "/api/v1/tasks";
const MODEL: &str = "wanx-v1";
const STYLE: &str = "<watercolor>";
const SIZE: &str = "1024*1024";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image generation failed: code={code}, message={message}")]
    TaskFailed { code: String, message: String },

    #[error("Image task {0} did not finish in time")]
    TimedOut(String),

    #[error("Image task returned no results")]
    NoResults,

    #[error("Invalid image URL: {0}")]
    BadUrl(String),
}

/// A downloaded image ready to be stored.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub file_name: String,
    pub source_url: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError>;
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    output: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: String,
    task_status: String,
    #[serde(default)]
    results: Vec<TaskResult>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    url: Option<String>,
}

pub struct DashScopeClient {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl DashScopeClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ImageError> {
        // ---
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
        })
    }

    async fn submit(&self, prompt: &str) -> Result<TaskOutput, ImageError> {
        // ---
        let body = json!({
            "model": MODEL,
            "input": { "prompt": prompt },
            "parameters": { "style": STYLE, "size": SIZE, "n": 1 },
        });

        let envelope: TaskEnvelope = self
            .client
            .post(format!("{}{}", self.base_url, TEXT2IMAGE_PATH))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(envelope.output)
    }

    async fn poll(&self, task_id: &str) -> Result<TaskOutput, ImageError> {
        // ---
        for attempt in 1..=self.max_polls {
            let envelope: TaskEnvelope = self
                .client
                .get(format!("{}{}/{}", self.base_url, TASKS_PATH, task_id))
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            debug!(
                "Image task {} poll {}: {}",
                task_id, attempt, envelope.output.task_status
            );
            match envelope.output.task_status.as_str() {
                "SUCCEEDED" | "FAILED" | "CANCELED" | "UNKNOWN" => return Ok(envelope.output),
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
        Err(ImageError::TimedOut(task_id.to_string()))
    }
}

/// Last path segment of an image URL, percent-decoding left to the store.
pub fn file_name_from_url(url: &str) -> Result<String, ImageError> {
    // ---
    let parsed = Url::parse(url).map_err(|_| ImageError::BadUrl(url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| ImageError::BadUrl(url.to_string()))
}

#[async_trait]
impl ImageGenerator for DashScopeClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError> {
        // ---
        let submitted = self.submit(prompt).await?;
        info!("Submitted image task {}", submitted.task_id);

        let settled = self.poll(&submitted.task_id).await?;
        if settled.task_status != "SUCCEEDED" {
            return Err(ImageError::TaskFailed {
                code: settled.code.unwrap_or_else(|| settled.task_status.clone()),
                message: settled.message.unwrap_or_default(),
            });
        }

        let url = settled
            .results
            .into_iter()
            .find_map(|r| r.url)
            .ok_or(ImageError::NoResults)?;
        let file_name = file_name_from_url(&url)?;

        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec();

        info!("Downloaded {} ({} bytes)", file_name, bytes.len());
        Ok(GeneratedImage {
            file_name,
            source_url: url,
            bytes,
        })
    }
}
