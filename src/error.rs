use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Provider(String),
    #[error("Request error: {0}")]
    Request(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// OpenAI-style `error.type` reported to clients.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "configuration_error",
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::NotFound(_) => "not_found_error",
            GatewayError::Provider(_)
            | GatewayError::Request(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => "api_error",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
            }
        }))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types_and_statuses() {
        let err = GatewayError::Authentication("Invalid access token.".into());
        assert_eq!(err.error_type(), "authentication_error");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = GatewayError::Config("FAL_API_KEY is not configured.".into());
        assert_eq!(err.error_type(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = GatewayError::Provider("job failed".into());
        assert_eq!(err.error_type(), "api_error");
        assert_eq!(err.to_string(), "job failed");
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let err = GatewayError::InvalidRequest("Invalid JSON body".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "invalid_request_error");
    }
}
