//! The persisted article record and its presentation helpers.
//!
//! The pipeline never builds an [`Article`]; the caller wraps a result once,
//! right before saving it.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MergedArticle;

const BOM: char = '\u{FEFF}';

/// One saved article. Field names match the browser store's JSON records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_inputs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<MergedArticle>,
}

impl Article {
    fn wrap(title: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            created_at: Utc::now(),
            content: None,
            original_inputs: None,
            merged_content: None,
        }
    }

    /// Wraps a created article with a fresh id and timestamp.
    pub fn from_created(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::wrap(title.into())
        }
    }

    /// Wraps a merged article, keeping the inputs it came from.
    pub fn from_merged(merged: MergedArticle, inputs: Vec<String>) -> Self {
        let mut article = Self::wrap(merged.title().to_string());
        article.original_inputs = Some(inputs);
        article.merged_content = Some(merged);
        article
    }

    /// Full plain text, whichever shape the record holds.
    pub fn body(&self) -> &str {
        match (&self.content, &self.merged_content) {
            (Some(content), _) => content,
            (None, Some(merged)) => merged.plain_text(),
            (None, None) => "",
        }
    }

    /// Creation time as `YYYY-MM-DD HH:MM` in local time.
    pub fn display_date(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

/// First `max_chars` characters, with `...` appended when truncated.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

/// `<title>.txt` with characters illegal in file names replaced by `_`.
pub fn export_file_name(title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{}.txt", safe)
}

/// Export body: UTF-8 BOM (so Windows editors pick the right encoding) + text.
pub fn export_text(article: &Article) -> String {
    let mut out = String::with_capacity(article.body().len() + BOM.len_utf8());
    out.push(BOM);
    out.push_str(article.body());
    out
}
