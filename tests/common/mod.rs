#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::task::JoinHandle;
use tonescore::gateway::{GatewayError, ModelGateway};
use tonescore::prompt::PromptPart;
use tonescore::AppConfig;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Configuration with a key present and the cool-down disabled.
pub fn test_config() -> AppConfig {
    AppConfig {
        api_key: Some("test-key".into()),
        cooldown_secs: 0,
        ..AppConfig::default()
    }
}

/// Gateway double that replays one canned reply and records what it was sent.
pub struct ScriptedGateway {
    reply: Result<String, (u16, String)>,
    calls: AtomicUsize,
    last_parts: Mutex<Vec<PromptPart>>,
}

impl ScriptedGateway {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_owned()),
            calls: AtomicUsize::new(0),
            last_parts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16, message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err((status, message.to_owned())),
            calls: AtomicUsize::new(0),
            last_parts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_parts(&self) -> Vec<PromptPart> {
        self.last_parts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, parts: &[PromptPart], _api_key: &str) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_parts.lock().unwrap() = parts.to_vec();
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err((status, message)) => Err(GatewayError::Status {
                status: *status,
                message: message.clone(),
                retry_after_secs: None,
            }),
        }
    }
}

pub fn analyze_request(body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn read_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// One request as seen by the mock provider.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub api_key: Option<String>,
    pub body: serde_json::Value,
}

pub type MockProvider = (String, Arc<Mutex<Vec<Captured>>>, JoinHandle<()>);

pub async fn spawn_mock_provider(status: u16, body: String) -> MockProvider {
    spawn_mock_provider_with_headers(status, body, &[]).await
}

/// A stand-in for the Generative Language API answering every request with
/// `status`, `body` and any extra `headers`.  The `:generateContent` suffix
/// is not a valid route segment, so everything goes through the fallback.
pub async fn spawn_mock_provider_with_headers(
    status: u16,
    body: String,
    headers: &[(&'static str, &'static str)],
) -> MockProvider {
    let mut extra = HeaderMap::new();
    for (name, value) in headers {
        extra.insert(*name, HeaderValue::from_static(*value));
    }
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let app = Router::new().fallback(move |method: Method, uri: Uri, req: Request<Body>| {
        let log = log.clone();
        let body = body.clone();
        let extra = extra.clone();
        async move {
            let api_key = req
                .headers()
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .unwrap_or_default();
            let body_json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
            log.lock().unwrap().push(Captured {
                method,
                path: uri.path().to_owned(),
                api_key,
                body: body_json,
            });
            let code = StatusCode::from_u16(status).unwrap();
            (code, extra, [("content-type", "application/json")], body).into_response()
        }
    });
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1beta", addr), seen, handle)
}

/// A provider envelope carrying `text` as the first candidate part.
pub fn envelope(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
    .to_string()
}
