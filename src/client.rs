//! Generation backends.
//!
//! Defines the [`GenerationClient`] trait and its two implementations:
//!
//! - **[`ProxyClient`]**: talks to the proxy (see [`crate::proxy`]), which
//!   holds the provider key server-side. This is the recommended deployment:
//!   nothing on the client side ever sees the credential. Supports both the
//!   buffered endpoint and the SSE endpoint.
//! - **[`GeminiClient`]**: calls the provider directly with a key read from
//!   the environment. Intended for local development only.
//!
//! Use [`build_client`] to pick one from configuration.
//!
//! # Failure classification
//!
//! | Condition | Error |
//! |-----------|-------|
//! | connection refused, reset, timeout | [`GenerationError::Transport`] |
//! | non-2xx status | [`GenerationError::Remote`] with the body as `details` |
//! | 2xx without first-candidate text | [`GenerationError::MalformedResponse`] |
//! | in-band SSE error event | [`GenerationError::Remote`] with status 502 |
//!
//! No client retries. A failed attempt goes straight back to the caller.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Backend, GenerationConfig};
use crate::error::GenerationError;
use crate::sse::{SseDecoder, DONE};
use crate::wire::{chunk_text, first_candidate_text, GenerateContentRequest, GenerationRequest, ProxyRequest};

/// Status reported for errors the proxy relays in-band on a stream.
const STREAM_ERROR_STATUS: u16 = 502;

/// One request/response cycle against a generation backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Short label for logs (`"gemini"`, `"proxy"`).
    fn name(&self) -> &str;

    /// Returns the raw completion text of the first candidate.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Provider API key. `Debug` never prints the value.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Turns an HTTP response into the provider envelope, classifying failures.
async fn read_envelope(response: reqwest::Response) -> Result<Value, GenerationError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(GenerationError::Remote {
            status: status.as_u16(),
            details: parse_details(&body),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| GenerationError::MalformedResponse(format!("response is not JSON: {}", e)))
}

fn parse_details(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

// ============ Direct provider client ============

/// Calls `{api_url}/{model}:generateContent?key=...` directly.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    key: ApiKey,
}

impl GeminiClient {
    pub fn new(
        api_url: impl Into<String>,
        model: impl Into<String>,
        key: ApiKey,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            api_url: api_url.into(),
            model: model.into(),
            key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = GenerateContentRequest::from(request);
        log::debug!(
            "gemini: POST {} (prompt {} chars)",
            self.endpoint(),
            request.prompt.chars().count()
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.key.as_str())])
            .json(&body)
            .send()
            .await?;

        let envelope = read_envelope(response).await?;
        first_candidate_text(&envelope)
    }
}

// ============ Proxy client ============

/// Calls the proxy's `POST {endpoint}` (buffered) or `POST {endpoint}/stream` (SSE).
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
    stream: bool,
}

enum StreamStep {
    Continue,
    Done,
}

impl ProxyClient {
    pub fn new(endpoint: impl Into<String>, stream: bool, timeout_secs: Option<u64>) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            endpoint: endpoint.into(),
            stream,
        })
    }

    fn stream_endpoint(&self) -> String {
        format!("{}/stream", self.endpoint.trim_end_matches('/'))
    }

    /// Buffered call: one JSON envelope after the upstream call completes.
    pub async fn generate_buffered(
        &self,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ProxyRequest::from(request))
            .send()
            .await?;

        let envelope = read_envelope(response).await?;
        first_candidate_text(&envelope)
    }

    /// Streamed call: concatenates the candidate text of every event until `[DONE]`.
    ///
    /// `cancel` is checked before the request is sent and between chunks.
    /// Returning early drops the response, which closes the connection to
    /// the proxy and, through it, the upstream read.
    pub async fn generate_streamed(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let send = self
            .http
            .post(self.stream_endpoint())
            .json(&ProxyRequest::from(request))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(GenerationError::Remote {
                status: status.as_u16(),
                details: parse_details(&body),
            });
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut text = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for event in decoder.push(&chunk) {
                        if let StreamStep::Done = apply_event(&event, &mut text)? {
                            return finish_stream(text);
                        }
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        if let Some(event) = decoder.finish() {
            if let StreamStep::Done = apply_event(&event, &mut text)? {
                return finish_stream(text);
            }
        }

        Err(GenerationError::Transport(
            "stream ended before [DONE]".to_string(),
        ))
    }
}

fn apply_event(event: &str, text: &mut String) -> Result<StreamStep, GenerationError> {
    if event.trim() == DONE {
        return Ok(StreamStep::Done);
    }

    let chunk: Value = serde_json::from_str(event).map_err(|e| {
        GenerationError::MalformedResponse(format!("stream event is not JSON: {}", e))
    })?;

    if chunk.get("error").is_some() {
        return Err(GenerationError::Remote {
            status: STREAM_ERROR_STATUS,
            details: chunk,
        });
    }

    text.push_str(&chunk_text(&chunk));
    Ok(StreamStep::Continue)
}

fn finish_stream(text: String) -> Result<String, GenerationError> {
    if text.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "stream carried no candidate text".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl GenerationClient for ProxyClient {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.stream {
            self.generate_streamed(request, &CancellationToken::new())
                .await
        } else {
            self.generate_buffered(request).await
        }
    }
}

/// Builds the configured client, or `None` when no credential is available.
///
/// - `direct`: needs the key env var (`generation.api_key_env`) to be set.
/// - `proxy`: needs `generation.proxy_url`; the key stays on the server.
///
/// # Errors
///
/// Only if the HTTP client itself cannot be constructed.
pub fn build_client(config: &GenerationConfig) -> Result<Option<Arc<dyn GenerationClient>>> {
    match config.backend {
        Backend::Direct => {
            let Some(key) = config.credential() else {
                return Ok(None);
            };
            let client = GeminiClient::new(
                config.api_url.clone(),
                config.model.clone(),
                ApiKey::new(key),
                config.timeout_secs,
            )?;
            Ok(Some(Arc::new(client)))
        }
        Backend::Proxy => {
            let Some(url) = config.proxy_url.clone() else {
                return Ok(None);
            };
            let client = ProxyClient::new(url, config.stream, config.timeout_secs)?;
            Ok(Some(Arc::new(client)))
        }
    }
}
