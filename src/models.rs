//! Core data types that flow through the creation pipeline.
//!
//! Materials go in, a [`GenerationResult`] comes out. Results are built once
//! per invocation and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// A user-supplied text fragment in one of the three input slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    /// 1-based input slot.
    pub slot: u8,
    /// Trimmed, non-empty text.
    pub text: String,
}

/// Provenance of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentKind {
    /// Taken verbatim from a source article.
    Original,
    /// Rewritten from a source article.
    Modified,
    /// New bridging text with no source.
    Generated,
    /// A type label the model invented. Kept, but rendered without styling.
    Other(String),
}

impl SegmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Original => "original",
            Self::Modified => "modified",
            Self::Generated => "generated",
            Self::Other(s) => s,
        }
    }

    /// Whether segments of this kind carry a source index.
    pub fn has_source(&self) -> bool {
        matches!(self, Self::Original | Self::Modified)
    }
}

impl From<String> for SegmentKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "original" => Self::Original,
            "modified" => Self::Modified,
            "generated" => Self::Generated,
            _ => Self::Other(s),
        }
    }
}

impl From<SegmentKind> for String {
    fn from(kind: SegmentKind) -> Self {
        match kind {
            SegmentKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// One provenance-tagged unit of output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<u8>,
}

impl Segment {
    /// Builds a segment, dropping `source` for kinds that cannot carry one.
    pub fn new(text: impl Into<String>, kind: SegmentKind, source: Option<u8>) -> Self {
        let source = if kind.has_source() { source } else { None };
        Self {
            text: text.into(),
            kind,
            source,
        }
    }

    pub fn original(text: impl Into<String>, source: u8) -> Self {
        Self::new(text, SegmentKind::Original, Some(source))
    }

    pub fn generated(text: impl Into<String>) -> Self {
        Self::new(text, SegmentKind::Generated, None)
    }
}

/// Plain-text result of the create operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleArticle {
    pub content: String,
}

/// Result of the merge operation.
///
/// `plain_text` is always the concatenation of the segment texts: the only
/// constructor derives it, and deserialisation rejects records where the
/// two disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MergedRecord")]
pub struct MergedArticle {
    plain_text: String,
    segments: Vec<Segment>,
    title: String,
}

impl MergedArticle {
    pub fn new(segments: Vec<Segment>, title: impl Into<String>) -> Self {
        let plain_text = segments.iter().map(|s| s.text.as_str()).collect();
        Self {
            plain_text,
            segments,
            title: title.into(),
        }
    }

    pub fn plain_text(&self) -> &str {
        &self.plain_text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Same segments, different title.
    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergedRecord {
    plain_text: String,
    segments: Vec<Segment>,
    title: String,
}

impl TryFrom<MergedRecord> for MergedArticle {
    type Error = String;

    fn try_from(record: MergedRecord) -> Result<Self, Self::Error> {
        let article = MergedArticle::new(record.segments, record.title);
        if article.plain_text != record.plain_text {
            return Err("plainText does not match the concatenated segments".to_string());
        }
        Ok(article)
    }
}

/// The pipeline's output, in the shape of the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Simple(SimpleArticle),
    Merged(MergedArticle),
}

/// Why the pipeline took the fallback branch.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// `generation.enabled = false`.
    AiDisabled,
    /// No key (direct) or no proxy URL (proxy).
    MissingCredential,
    /// The AI path was attempted and failed.
    Failed(GenerationError),
}

/// Which strategy produced a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Ai,
    Fallback(FallbackReason),
}

impl Branch {
    pub fn is_ai(&self) -> bool {
        matches!(self, Branch::Ai)
    }
}

/// Where a merged article's title came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    /// Suggested by the model inside the structured block.
    Embedded,
    /// Returned by the dedicated title call.
    Generated,
    /// Deterministic content prefix plus timestamp.
    Fallback,
}

/// Output of `Creator::create_article`.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub content: String,
    pub branch: Branch,
}

/// Output of `Creator::merge_articles`.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub article: MergedArticle,
    pub branch: Branch,
    pub title_source: TitleSource,
}

impl From<Created> for GenerationResult {
    fn from(created: Created) -> Self {
        GenerationResult::Simple(SimpleArticle {
            content: created.content,
        })
    }
}

impl From<Merged> for GenerationResult {
    fn from(merged: Merged) -> Self {
        GenerationResult::Merged(merged.article)
    }
}
