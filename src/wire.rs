//! Wire types shared by the generation clients and the proxy.
//!
//! Provider request body:
//!
//! ```json
//! {
//!   "contents": [{ "parts": [{ "text": "..." }] }],
//!   "systemInstruction": { "parts": [{ "text": "..." }] },
//!   "generationConfig": { "temperature": 0.8, "topK": 40, "topP": 0.95, "maxOutputTokens": 65536 }
//! }
//! ```
//!
//! Provider success envelope: `{"candidates": [{"content": {"parts": [{"text": "..."}]}}]}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SamplingConfig;
use crate::error::GenerationError;

/// Everything one generation call needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub options: SamplingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

impl Content {
    fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireGenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl From<SamplingConfig> for WireGenerationConfig {
    fn from(s: SamplingConfig) -> Self {
        Self {
            temperature: s.temperature,
            top_k: s.top_k,
            top_p: s.top_p,
            max_output_tokens: s.max_output_tokens,
        }
    }
}

/// Body of a `generateContent` / `streamGenerateContent` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<WireGenerationConfig>,
}

impl GenerateContentRequest {
    pub fn new(
        prompt: &str,
        system_instruction: Option<&str>,
        generation_config: Option<WireGenerationConfig>,
    ) -> Self {
        Self {
            contents: vec![Content::text(prompt)],
            system_instruction: system_instruction.map(Content::text),
            generation_config,
        }
    }
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self::new(
            &req.prompt,
            req.system_instruction.as_deref(),
            Some(req.options.into()),
        )
    }
}

/// Body the proxy accepts from browser and CLI clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<WireGenerationConfig>,
}

impl From<&GenerationRequest> for ProxyRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            prompt: req.prompt.clone(),
            system_instruction: req.system_instruction.clone(),
            generation_config: Some(req.options.into()),
        }
    }
}

impl From<ProxyRequest> for GenerateContentRequest {
    fn from(req: ProxyRequest) -> Self {
        Self::new(
            &req.prompt,
            req.system_instruction.as_deref(),
            req.generation_config,
        )
    }
}

/// Concatenated text of the first candidate's parts.
///
/// Fails when there are no candidates (e.g. the prompt was blocked) or the
/// first candidate carries no text parts (e.g. finish reason `SAFETY`).
pub fn first_candidate_text(envelope: &Value) -> Result<String, GenerationError> {
    let candidate = envelope
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| GenerationError::MalformedResponse("no candidates in response".into()))?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            GenerationError::MalformedResponse(format!(
                "first candidate has no content (finishReason: {})",
                reason
            ))
        })?;

    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if texts.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "first candidate has no text parts".into(),
        ));
    }

    Ok(texts.concat())
}

/// Text carried by one streamed chunk. Chunks without text yield `""`.
pub fn chunk_text(chunk: &Value) -> String {
    chunk
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}
