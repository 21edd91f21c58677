use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use serde_json::Value;

use super::{GatewayError, ModelGateway};
use crate::prompt::PromptPart;

/// Wire shape of a `generateContent` request.
#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> From<&'a PromptPart> for WirePart<'a> {
    fn from(part: &'a PromptPart) -> Self {
        match part {
            PromptPart::Text(text) => WirePart::Text { text },
            PromptPart::InlineAudio { mime_type, data } => WirePart::Inline {
                inline_data: InlineData { mime_type, data },
            },
        }
    }
}

/// Client for Google's Generative Language `generateContent` endpoint.
pub struct GeminiGateway {
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GeminiGateway {
    pub fn new(
        api_base: &str,
        model: &str,
        timeout: Duration,
        temperature: Option<f32>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!(
                "{}/models/{}:generateContent",
                api_base.trim_end_matches('/'),
                model
            ),
            model: model.to_owned(),
            temperature,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn render_body<'a>(&self, parts: &'a [PromptPart]) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: [Content {
                parts: parts.iter().map(WirePart::from).collect(),
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        }
    }
}

/// `error.message` from a provider error body, when there is one.
fn provider_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

/// The first candidate's first text part.  `None` when the provider withheld
/// content, for example after a safety block.
fn candidate_text(envelope: &Value) -> Option<&str> {
    envelope
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
}

#[async_trait::async_trait]
impl ModelGateway for GeminiGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, parts: &[PromptPart], api_key: &str) -> Result<String, GatewayError> {
        let body = self.render_body(parts);
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(model = %self.model, error = ?err, "model request failed");
                GatewayError::Transport(err.to_string())
            })?;

        let status = resp.status();
        let retry_after_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await.map_err(|err| {
            tracing::warn!(model = %self.model, error = ?err, "model response read failed");
            GatewayError::Transport(err.to_string())
        })?;

        if !status.is_success() {
            let message = provider_error_message(&text)
                .unwrap_or_else(|| format!("model provider returned HTTP {}", status.as_u16()));
            tracing::warn!(model = %self.model, status = status.as_u16(), %message, "model provider error");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
                retry_after_secs,
            });
        }

        let envelope: Value = serde_json::from_str(&text).map_err(|err| {
            tracing::warn!(model = %self.model, error = %err, "model envelope is not JSON");
            GatewayError::Envelope(err.to_string())
        })?;
        match candidate_text(&envelope) {
            Some(reply) => Ok(reply.to_owned()),
            None => {
                let reason = envelope
                    .pointer("/promptFeedback/blockReason")
                    .or_else(|| envelope.pointer("/candidates/0/finishReason"))
                    .and_then(Value::as_str)
                    .unwrap_or("none");
                tracing::warn!(model = %self.model, reason, "model returned no text candidate");
                Ok(String::new())
            }
        }
    }
}
