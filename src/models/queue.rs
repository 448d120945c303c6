use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::translate::AspectRatio;

pub const MIN_IMAGES: u32 = 1;
pub const MAX_IMAGES: u32 = 4;

/// Parameters submitted to a queue model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(rename = "num_images")]
    pub image_count: u32,
    pub aspect_ratio: AspectRatio,
}

impl GenerationRequest {
    /// `image_count` is clamped into `1..=4`.
    pub fn new(prompt: impl Into<String>, image_count: i64, aspect_ratio: AspectRatio) -> Self {
        let image_count = image_count.clamp(MIN_IMAGES as i64, MAX_IMAGES as i64) as u32;
        Self {
            prompt: prompt.into(),
            image_count,
            aspect_ratio,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStatus {
    Completed,
    Failed,
    Cancelled,
    /// `IN_QUEUE`, `IN_PROGRESS` or anything else not yet terminal.
    Pending(String),
}

impl StatusResponse {
    pub fn queue_status(&self) -> QueueStatus {
        match self.status.as_deref() {
            Some("COMPLETED") => QueueStatus::Completed,
            Some("FAILED") => QueueStatus::Failed,
            Some("CANCELLED") => QueueStatus::Cancelled,
            Some(other) => QueueStatus::Pending(other.to_string()),
            None => QueueStatus::Pending("UNKNOWN".to_string()),
        }
    }

    pub fn logs_summary(&self) -> String {
        match &self.logs {
            Some(logs) if !logs.is_null() => logs.to_string(),
            _ => "No logs.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultResponse {
    #[serde(default)]
    pub images: Option<Vec<GeneratedImage>>,
}

/// Terminal result of one queue job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { images: Vec<GeneratedImage> },
    Failed { reason: String },
    TimedOut { request_id: String, model: String },
}

impl JobOutcome {
    /// Images of a completed job; failures and timeouts become provider errors.
    pub fn into_images(self) -> Result<Vec<GeneratedImage>> {
        match self {
            JobOutcome::Completed { images } => Ok(images),
            JobOutcome::Failed { reason } => Err(GatewayError::Provider(reason)),
            JobOutcome::TimedOut { request_id, model } => Err(GatewayError::Provider(format!(
                "Image generation timed out for {} request {}.",
                model, request_id
            ))),
        }
    }
}
