//! Structured-block decoding for merge completions.
//!
//! Models rarely return bare JSON. The completion usually wraps the block
//! in a ```` ```json ```` fence, sometimes in an unlabeled fence, sometimes
//! in neither, with prose before and after. [`extract_structured_block`]
//! picks the candidate text in that order of preference, and
//! [`parse_segments`] decodes it against a fixed schema.

use serde::Deserialize;
use serde_json::Value;

use crate::error::GenerationError;
use crate::models::{Segment, SegmentKind};

const FENCE: &str = "```";

/// Title and segments recovered from a merge completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    /// `None` when the model left the title out or blank.
    pub title: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    segments: Option<Vec<RawSegment>>,
}

#[derive(Deserialize)]
struct RawSegment {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    source: Option<Value>,
}

/// Returns the text most likely to hold the structured block.
///
/// 1. The body of the first fence labeled `json` (any case).
/// 2. Otherwise the body of the first fence of any kind, minus its language tag.
/// 3. Otherwise the whole input.
///
/// The result is trimmed. An opening fence without a closing one runs to
/// the end of the input.
pub fn extract_structured_block(raw: &str) -> &str {
    if let Some(body) = labeled_fence_body(raw, "json") {
        return body.trim();
    }
    if let Some(body) = any_fence_body(raw) {
        return body.trim();
    }
    raw.trim()
}

fn labeled_fence_body<'a>(raw: &'a str, label: &str) -> Option<&'a str> {
    let mut offset = 0;
    while let Some(found) = raw[offset..].find(FENCE) {
        let after = offset + found + FENCE.len();
        let rest = &raw[after..];
        if rest.len() >= label.len()
            && rest.is_char_boundary(label.len())
            && rest[..label.len()].eq_ignore_ascii_case(label)
            && !rest[label.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric())
        {
            return Some(fence_body(&rest[label.len()..]));
        }
        offset = after;
    }
    None
}

fn any_fence_body(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE)? + FENCE.len();
    let rest = &raw[start..];
    // A bare word directly after the fence is a language tag.
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    let body = if rest[tag_len..].starts_with(['\n', '\r']) {
        &rest[tag_len..]
    } else {
        rest
    };
    Some(fence_body(body))
}

fn fence_body(after_open: &str) -> &str {
    match after_open.find(FENCE) {
        Some(end) => &after_open[..end],
        None => after_open,
    }
}

/// Decodes a structured block into a title and ordered segments.
///
/// # Errors
///
/// [`GenerationError::Parse`] when the block is not a JSON object, when
/// `segments` is missing or empty, or when any element lacks a non-empty
/// `text` or a string `type`. Unknown `type` values are kept as
/// [`SegmentKind::Other`].
pub fn parse_segments(block: &str) -> Result<ParsedBlock, GenerationError> {
    let raw: RawBlock = serde_json::from_str(block)
        .map_err(|e| GenerationError::Parse(format!("not a JSON object: {}", e)))?;

    let raw_segments = raw
        .segments
        .ok_or_else(|| GenerationError::Parse("missing `segments`".into()))?;
    if raw_segments.is_empty() {
        return Err(GenerationError::Parse("`segments` is empty".into()));
    }

    let segments = raw_segments
        .into_iter()
        .enumerate()
        .map(|(i, seg)| {
            let text = seg
                .text
                .filter(|t| !t.is_empty())
                .ok_or_else(|| GenerationError::Parse(format!("segment {} has no text", i)))?;
            let kind = seg
                .kind
                .map(SegmentKind::from)
                .ok_or_else(|| GenerationError::Parse(format!("segment {} has no type", i)))?;
            let source = seg.source.as_ref().and_then(source_index);
            Ok(Segment::new(text, kind, source))
        })
        .collect::<Result<Vec<_>, GenerationError>>()?;

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(ParsedBlock { title, segments })
}

/// Extract, then parse.
pub fn parse_merge_response(raw: &str) -> Result<ParsedBlock, GenerationError> {
    parse_segments(extract_structured_block(raw))
}

/// Accepts `1`, `1.0` or `"1"`; anything outside 1..=3 is dropped.
fn source_index(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.fract() != 0.0 || !(1.0..=3.0).contains(&n) {
        return None;
    }
    Some(n as u8)
}
