use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};

pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Body of `POST /v1/images/generations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageGenerationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub n: Option<Value>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ImageGenerationRequest {
    /// Requested image count before clamping; accepts numbers and numeric strings.
    pub fn requested_count(&self) -> i64 {
        match &self.n {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(1),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f.trunc() as i64).unwrap_or(1),
            _ => 1,
        }
    }

    pub fn size_or_default(&self) -> &str {
        self.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Url,
    B64Json,
}

impl ResponseFormat {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw {
            None | Some("url") => Ok(ResponseFormat::Url),
            Some("b64_json") => Ok(ResponseFormat::B64Json),
            Some(_) => Err(GatewayError::InvalidRequest(
                "Parameter 'response_format' must be 'url' or 'b64_json'.".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImageData {
    Url { url: String },
    B64Json { b64_json: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
    pub model: String,
}
