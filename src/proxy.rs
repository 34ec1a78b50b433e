//! Credential-hiding reverse proxy for the generation API.
//!
//! Browser and CLI clients post prompts here; the proxy injects the
//! server-held API key and forwards the request upstream. The key never
//! leaves this process.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/generate` | Buffered: one JSON envelope when the upstream call completes |
//! | `POST` | `/api/generate/stream` | Streamed: upstream chunks relayed as SSE `data:` events |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Request body for both generate endpoints:
//!
//! ```json
//! { "prompt": "...", "systemInstruction": "...", "generationConfig": { ... } }
//! ```
//!
//! # Error Contract
//!
//! Buffered mode answers failures with an HTTP status and a JSON body:
//!
//! | Condition | Status | Body |
//! |-----------|--------|------|
//! | method other than `POST` | 405 | `{"error": "Method not allowed"}` |
//! | no key configured | 500 | `{"error": "API key not configured"}` |
//! | unparseable body | 400 | `{"error": "Invalid request body", "message": ...}` |
//! | upstream non-2xx | upstream status | `{"error": "API Error: <status>", "details": ...}` |
//! | anything else | 500 | `{"error": "Internal server error", "message": ...}` |
//!
//! Streaming mode has already committed `200 text/event-stream` by the time
//! most failures surface, so after the method check every failure is sent
//! as a single `data: {"error": ..., "details"?: ...}` event and the stream
//! ends without `[DONE]`.
//!
//! # Streaming
//!
//! A spawned producer reads the upstream SSE body, decodes events and sends
//! them into a bounded channel; the response body drains the channel. When
//! the client disconnects the channel closes; the producer notices while
//! waiting on either side and drops the upstream response.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{any, get},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::sse::{SseDecoder, DONE};
use crate::wire::{GenerateContentRequest, ProxyRequest};

/// Events buffered between the upstream reader and the client.
const STREAM_BUFFER: usize = 32;

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    upstream_url: String,
    model: String,
    api_key: Option<Arc<str>>,
}

impl ProxyState {
    /// `api_key = None` keeps the server up but fails every generate call
    /// with "API key not configured".
    pub fn new(
        upstream_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            upstream_url: upstream_url.into(),
            model: model.into(),
            api_key: api_key.map(Arc::from),
        })
    }

    /// Reads upstream settings from `[server]` and the key from its env var.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.server.upstream_url.clone(),
            config.server.model.clone(),
            config.server.credential(),
        )
    }

    fn upstream(&self, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.upstream_url.trim_end_matches('/'),
            self.model,
            method
        )
    }
}

/// Builds the proxy router with permissive CORS for browser clients.
pub fn router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate", any(handle_generate))
        .route("/api/generate/stream", any(handle_stream))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serves the proxy on an already-bound listener until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: ProxyState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the proxy on `[server].bind`.
///
/// This is the entry point used by `weave serve proxy`.
pub async fn run_proxy(config: &Config) -> Result<()> {
    let state = ProxyState::from_config(config)?;
    if state.api_key.is_none() {
        log::warn!(
            "{} is not set; generate calls will fail with 500",
            config.server.api_key_env
        );
    }

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Proxy listening on http://{}", bind_addr);
    log::info!(
        "proxy: forwarding to {} (model {})",
        config.server.upstream_url,
        config.server.model
    );

    serve(listener, state).await
}

// ============ Error response ============

/// Buffered-mode failure, rendered as `(status, JSON body)`.
struct ProxyError {
    status: StatusCode,
    body: Value,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn method_not_allowed() -> ProxyError {
    ProxyError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        body: json!({ "error": "Method not allowed" }),
    }
}

fn missing_key() -> ProxyError {
    ProxyError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "error": "API key not configured" }),
    }
}

fn bad_request(message: impl ToString) -> ProxyError {
    ProxyError {
        status: StatusCode::BAD_REQUEST,
        body: json!({ "error": "Invalid request body", "message": message.to_string() }),
    }
}

fn internal(message: impl ToString) -> ProxyError {
    ProxyError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "error": "Internal server error", "message": message.to_string() }),
    }
}

fn upstream_error(status: u16, body: &str) -> ProxyError {
    ProxyError {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
        body: json!({ "error": format!("API Error: {}", status), "details": json_or_string(body) }),
    }
}

/// Error text without the request URL, which carries the key.
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

fn json_or_string(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/generate ============

/// Buffered generate. Relays the upstream envelope unchanged on success.
async fn handle_generate(
    State(state): State<ProxyState>,
    method: Method,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    if method != Method::POST {
        return Err(method_not_allowed());
    }
    let key = state.api_key.clone().ok_or_else(missing_key)?;
    let request: ProxyRequest = serde_json::from_slice(&body).map_err(bad_request)?;

    log::info!(
        "proxy: generate ({} prompt chars)",
        request.prompt.chars().count()
    );

    let response = state
        .http
        .post(state.upstream("generateContent"))
        .query(&[("key", &*key)])
        .json(&GenerateContentRequest::from(request))
        .send()
        .await
        .map_err(|e| {
            let message = redacted(e);
            log::error!("proxy: upstream request failed: {}", message);
            internal(message)
        })?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| internal(redacted(e)))?;

    if !(200..300).contains(&status) {
        log::warn!("proxy: upstream returned {}", status);
        return Err(upstream_error(status, &text));
    }

    let envelope: Value = serde_json::from_str(&text).map_err(internal)?;
    Ok(Json(envelope))
}

// ============ POST /api/generate/stream ============

/// A failure reported in-band on the event stream.
struct StreamFailure {
    error: String,
    details: Option<Value>,
}

impl StreamFailure {
    fn new(error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }

    fn into_event(self) -> Event {
        let mut body = json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        data_event(&body.to_string())
    }
}

/// SSE `data:` event. Carriage returns are not allowed inside event fields.
fn data_event(payload: &str) -> Event {
    if payload.contains('\r') {
        Event::default().data(payload.replace('\r', ""))
    } else {
        Event::default().data(payload)
    }
}

/// Streamed generate. Always answers `200 text/event-stream` after the
/// method check; later failures arrive as an error event.
async fn handle_stream(State(state): State<ProxyState>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return method_not_allowed().into_response();
    }

    let (tx, rx) = mpsc::channel::<Event>(STREAM_BUFFER);
    tokio::spawn(async move {
        if let Err(failure) = forward_stream(&state, &body, &tx).await {
            log::warn!("proxy: stream failed: {}", failure.error);
            let _ = tx.send(failure.into_event()).await;
        }
    });

    let events = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (
        [(header::CONNECTION, HeaderValue::from_static("keep-alive"))],
        Sse::new(events),
    )
        .into_response()
}

/// Producer half of the stream. Returns `Ok` both on completion and when
/// the client has gone away.
async fn forward_stream(
    state: &ProxyState,
    body: &[u8],
    tx: &mpsc::Sender<Event>,
) -> std::result::Result<(), StreamFailure> {
    let key = state
        .api_key
        .clone()
        .ok_or_else(|| StreamFailure::new("API key not configured", None))?;
    let request: ProxyRequest = serde_json::from_slice(body).map_err(|e| {
        StreamFailure::new("Invalid request body", Some(Value::String(e.to_string())))
    })?;

    log::info!(
        "proxy: stream ({} prompt chars)",
        request.prompt.chars().count()
    );

    let response = state
        .http
        .post(state.upstream("streamGenerateContent"))
        .query(&[("alt", "sse"), ("key", &*key)])
        .json(&GenerateContentRequest::from(request))
        .send()
        .await
        .map_err(|e| StreamFailure::new("Upstream request failed", Some(Value::String(redacted(e)))))?;

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let text = response.text().await.unwrap_or_default();
        return Err(StreamFailure::new(
            format!("API Error: {}", status),
            Some(json_or_string(&text)),
        ));
    }

    let mut upstream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut forwarded = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                log::debug!("proxy: client disconnected after {} events", forwarded);
                return Ok(());
            }
            next = upstream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| {
            StreamFailure::new("Stream interrupted", Some(Value::String(redacted(e))))
        })?;
        for payload in decoder.push(&chunk) {
            if payload.trim() == DONE {
                continue;
            }
            if tx.send(data_event(&payload)).await.is_err() {
                log::debug!("proxy: client disconnected after {} events", forwarded);
                return Ok(());
            }
            forwarded += 1;
        }
    }

    if let Some(payload) = decoder.finish() {
        if payload.trim() != DONE && tx.send(data_event(&payload)).await.is_err() {
            return Ok(());
        }
    }

    log::debug!("proxy: stream complete ({} events)", forwarded);
    let _ = tx.send(data_event(DONE)).await;
    Ok(())
}
