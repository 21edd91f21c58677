//! Outbound calls to the generative model.
//!
//! The gateway returns the model's reply as opaque text; turning that text
//! into a typed result is the normalizer's job.  Failures are classified
//! once, here, into "overloaded" (caller should retry later) and everything
//! else.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::prompt::PromptPart;

pub mod gemini;

pub use self::gemini::GeminiGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Overloaded,
    Failure,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider returned HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider response envelope unreadable: {0}")]
    Envelope(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GatewayError::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn kind(&self) -> UpstreamErrorKind {
        let message = match self {
            GatewayError::Status { message, .. } => message.as_str(),
            GatewayError::Transport(detail) | GatewayError::Envelope(detail) => detail.as_str(),
        };
        classify_upstream_error(message, self.status())
    }

    /// Short text that is safe to show to the end user.  Transport details
    /// and envelope dumps stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Status { message, .. } if !message.is_empty() => {
                let clipped: String = message.chars().take(200).collect();
                format!("Analysis failed: {clipped}")
            }
            GatewayError::Status { .. } | GatewayError::Envelope(_) => "Analysis failed.".to_owned(),
            GatewayError::Transport(_) => {
                "Analysis failed: the analysis service could not be reached.".to_owned()
            }
        }
    }
}

static OVERLOAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)quota|overloaded|high demand|resource[ _]exhausted|\b429\b")
        .expect("overload pattern is valid")
});

/// Status 429 is the primary signal; message keywords cover providers that
/// report capacity problems with other codes or only in the body.
pub fn classify_upstream_error(message: &str, status: Option<u16>) -> UpstreamErrorKind {
    if status == Some(429) || OVERLOAD_RE.is_match(message) {
        UpstreamErrorKind::Overloaded
    } else {
        UpstreamErrorKind::Failure
    }
}

/// A text/audio-in, text-out model endpoint.
#[async_trait::async_trait]
pub trait ModelGateway: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, parts: &[PromptPart], api_key: &str) -> Result<String, GatewayError>;
}
