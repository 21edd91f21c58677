use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::gateway::{GatewayError, UpstreamErrorKind};

/// Every way a request can end in something other than a verdict.  A model
/// reply that cannot be parsed is deliberately absent: it becomes the
/// fallback verdict instead.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),
    #[error("System configuration error: {0}")]
    Configuration(String),
    #[error("Too many requests. Please wait {retry_after_secs} seconds before trying again.")]
    RateLimited { retry_after_secs: u64 },
    #[error("AI limit reached. Please try again later.")]
    UpstreamOverloaded { retry_after_secs: Option<u64> },
    #[error("{0}")]
    UpstreamFailure(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Configuration(_) | AnalysisError::UpstreamFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AnalysisError::RateLimited { .. } | AnalysisError::UpstreamOverloaded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AnalysisError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            AnalysisError::UpstreamOverloaded { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    /// Metric/log label.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "validation",
            AnalysisError::Configuration(_) => "configuration",
            AnalysisError::RateLimited { .. } => "rate_limited",
            AnalysisError::UpstreamOverloaded { .. } => "upstream_overloaded",
            AnalysisError::UpstreamFailure(_) => "upstream_failure",
        }
    }
}

impl From<GatewayError> for AnalysisError {
    fn from(err: GatewayError) -> Self {
        match err.kind() {
            UpstreamErrorKind::Overloaded => AnalysisError::UpstreamOverloaded {
                retry_after_secs: err.retry_after_secs(),
            },
            UpstreamErrorKind::Failure => AnalysisError::UpstreamFailure(err.public_message()),
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_seconds = self.retry_after_secs();
        let body = ErrorBody {
            error: self.to_string(),
            retry_after_seconds,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_seconds {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
