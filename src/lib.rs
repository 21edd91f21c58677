//! Core library for tonescore.  Wires the analysis pipeline, shared state and
//! HTTP handlers together; `main.rs` only binds a listener.

mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod sanitize;
pub mod screening;
pub mod verdict;

pub use config::{clean_secret, AppConfig};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    ConnectInfo, DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::{AnalysisError, ErrorBody};
use crate::gateway::{GeminiGateway, ModelGateway};
use crate::metrics::Metrics;
use crate::pipeline::Analyzer;
use crate::rate_limit::CooldownLimiter;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<Analyzer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// State around an explicit gateway, so tests can substitute the model.
    pub fn new(config: AppConfig, gateway: Arc<dyn ModelGateway>) -> Self {
        let limiter = Arc::new(CooldownLimiter::new(
            Duration::from_secs(config.cooldown_secs),
            config.rate_limit_sweep,
        ));
        let analyzer = Analyzer::new(
            limiter,
            gateway,
            config.api_key.clone(),
            config.output_mode,
        );
        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// State backed by the Gemini gateway described by `config`.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let gateway = GeminiGateway::new(
            &config.api_base,
            &config.model,
            Duration::from_millis(config.upstream_timeout_ms),
            config.temperature,
        )?;
        Ok(Self::new(config, Arc::new(gateway)))
    }
}

/// Read configuration from the environment and build the application state.
pub fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    if config.api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY not set; analyze requests will fail until it is configured");
    }
    tracing::info!(
        model = %config.model,
        output_mode = config.output_mode.as_str(),
        cooldown_secs = config.cooldown_secs,
        max_request_bytes = config.max_request_bytes,
        "configuration loaded"
    );
    let state = AppState::from_config(config).map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    Ok(state)
}

pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.config.max_request_bytes;

    Router::new()
        .route(
            "/api/analyze",
            post(analyze_handler).fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// First `X-Forwarded-For` hop, else the socket peer, else `"unknown"`.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn analyze_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let identity = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));

    let result = match state.analyzer.admit(&identity) {
        Ok(()) => match payload {
            Ok(Json(body)) => state.analyzer.analyze(&body).await,
            Err(rejection) => {
                if let Some(resp) = oversized_body(&state, &rejection) {
                    return resp;
                }
                tracing::debug!(error = %rejection, "request body is not valid JSON");
                Err(AnalysisError::Validation("Request body must be valid JSON".into()))
            }
        },
        Err(err) => Err(err),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(analysis) => {
            state.metrics.record_success(analysis.outcome, latency_ms);
            tracing::info!(
                %identity,
                score = analysis.verdict.score(),
                tone = analysis.verdict.tone().as_str(),
                stage = analysis.outcome.as_str(),
                latency_ms,
                "analysis complete"
            );
            (StatusCode::OK, Json(analysis.verdict)).into_response()
        }
        Err(err) => {
            state.metrics.record_error(&err, latency_ms);
            tracing::info!(%identity, kind = err.kind(), status = err.status().as_u16(), latency_ms, "analysis rejected");
            err.into_response()
        }
    }
}

/// 413 for a body that tripped `DefaultBodyLimit`; other rejections are the
/// caller's to map.
fn oversized_body(state: &AppState, rejection: &JsonRejection) -> Option<Response> {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            let limit = state.config.max_request_bytes;
            tracing::warn!(limit, "request body exceeded configured limit");
            let body = ErrorBody {
                error: format!("Request too large (body exceeded limit {} bytes)", limit),
                retry_after_seconds: None,
            };
            Some((StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response())
        }
        _ => None,
    }
}

async fn method_not_allowed() -> Response {
    let body = ErrorBody {
        error: "Method not allowed".into(),
        retry_after_seconds: None,
    };
    let mut resp = (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response();
    resp.headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("POST"));
    resp
}

/// Readiness / liveness probe.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "model": state.config.model,
        "outputMode": state.config.output_mode.as_str(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
