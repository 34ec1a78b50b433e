//! Error taxonomy for the creation pipeline.
//!
//! Two families, split by who ends up seeing them:
//!
//! - [`ValidationError`]: bad user input. Surfaced verbatim; no network
//!   call is ever attempted.
//! - [`GenerationError`]: everything that can go wrong on the AI path.
//!   The pipeline absorbs these into the deterministic fallback and reports
//!   them through [`crate::models::FallbackReason::Failed`].

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required slot is empty (after trimming).
    #[error("material {0} must not be empty")]
    MissingMaterial(u8),

    /// Merge needs at least two non-empty articles.
    #[error("at least two articles are required to merge, got {0}")]
    NotEnoughArticles(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The backend could not be reached, or the connection broke mid-response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Remote { status: u16, details: Value },

    /// Success status, but no first-candidate text in the envelope.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The merge completion did not contain a usable structured block.
    #[error("could not parse structured block: {0}")]
    Parse(String),

    /// The caller cancelled a streamed generation.
    #[error("generation cancelled")]
    Cancelled,
}

/// The request URL is dropped: direct calls carry the key in the query string.
impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Transport(err.without_url().to_string())
    }
}

impl GenerationError {
    /// Short machine-readable label, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Remote { .. } => "remote",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Parse(_) => "parse",
            Self::Cancelled => "cancelled",
        }
    }
}
