//! The request-to-verdict pipeline.
//!
//! `Analyzer` owns the two injected collaborators (rate limiter and model
//! gateway) and runs the stages in order, stopping at the first one that
//! produces a verdict or an error.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::AnalysisError;
use crate::gateway::ModelGateway;
use crate::normalize::{parse_model_output, ParseStage};
use crate::prompt::{prompt_parts, OutputMode};
use crate::rate_limit::{Admission, RateLimit};
use crate::sanitize::sanitize_request;
use crate::screening::{find_forbidden_term, forbidden_verdict};
use crate::verdict::Verdict;

/// Which stage produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forbidden,
    Model(ParseStage),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Forbidden => "forbidden",
            Outcome::Model(stage) => stage.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub verdict: Verdict,
    pub outcome: Outcome,
}

#[derive(Clone)]
pub struct Analyzer {
    limiter: Arc<dyn RateLimit>,
    gateway: Arc<dyn ModelGateway>,
    api_key: Option<String>,
    mode: OutputMode,
}

impl Analyzer {
    pub fn new(
        limiter: Arc<dyn RateLimit>,
        gateway: Arc<dyn ModelGateway>,
        api_key: Option<String>,
        mode: OutputMode,
    ) -> Self {
        Self {
            limiter,
            gateway,
            api_key,
            mode,
        }
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    pub fn admit(&self, identity: &str) -> Result<(), AnalysisError> {
        match self.limiter.admit(identity, Instant::now()) {
            Admission::Allowed => Ok(()),
            Admission::Denied { retry_after_secs } => {
                tracing::info!(%identity, retry_after_secs, "rate limited");
                Err(AnalysisError::RateLimited { retry_after_secs })
            }
        }
    }

    /// Everything after admission: credential check, sanitization,
    /// forbidden-term screening, prompt, model call, normalization.
    pub async fn analyze(&self, body: &Value) -> Result<Analysis, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            tracing::error!("GOOGLE_API_KEY is not configured");
            AnalysisError::Configuration("Missing API Key".into())
        })?;

        let req = sanitize_request(body);
        if !req.has_input() {
            return Err(AnalysisError::Validation(
                "Input text or audio is required".into(),
            ));
        }

        if let Some(term) = find_forbidden_term(&req.text, &req.forbidden_terms) {
            tracing::info!(term, "forbidden term found, skipping model call");
            return Ok(Analysis {
                verdict: forbidden_verdict(term, self.mode),
                outcome: Outcome::Forbidden,
            });
        }

        let parts = prompt_parts(&req, self.mode);
        tracing::debug!(
            gateway = self.gateway.name(),
            parts = parts.len(),
            audio = req.audio.is_some(),
            "calling model"
        );
        let raw = self.gateway.generate(&parts, api_key).await?;
        let normalized = parse_model_output(&raw, self.mode);
        Ok(Analysis {
            verdict: normalized.verdict,
            outcome: Outcome::Model(normalized.stage),
        })
    }
}
