//! Deterministic, network-free composition.
//!
//! Used when AI generation is disabled, has no credential, or failed. None
//! of these functions can fail, so the pipeline always terminates with a
//! valid result.

use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

use crate::models::{Material, MergedArticle, Segment};

/// Paragraph separator between materials.
pub const SEPARATOR: &str = "\n\n";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Source of wall-clock time for fallback titles.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Clone)]
pub struct FallbackComposer {
    title_chars: usize,
    clock: Arc<dyn Clock>,
}

impl FallbackComposer {
    pub fn new(title_chars: usize, clock: Arc<dyn Clock>) -> Self {
        Self { title_chars, clock }
    }

    /// Joins the materials with a blank line, in slot order.
    pub fn simple_create(&self, materials: &[Material]) -> String {
        materials
            .iter()
            .map(|m| m.text.trim())
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    /// One `original` segment per article, `generated` blank-line separators
    /// between neighbours, and a deterministic title.
    pub fn simple_merge(&self, articles: &[Material]) -> MergedArticle {
        let mut segments = Vec::with_capacity(articles.len() * 2);
        for (i, article) in articles.iter().enumerate() {
            if i > 0 {
                segments.push(Segment::generated(SEPARATOR));
            }
            segments.push(Segment::original(article.text.trim(), article.slot));
        }
        let article = MergedArticle::new(segments, "");
        let title = self.title(article.plain_text());
        article.with_title(title)
    }

    /// Title from the content prefix and the current time.
    pub fn title(&self, content: &str) -> String {
        fallback_title(content, self.title_chars, self.clock.now())
    }
}

/// First `chars` non-whitespace characters of `content`, a space, then
/// `at` as `YYYY-MM-DD HH:MM`.
///
/// Never empty: the timestamp alone stands in when `content` is blank.
pub fn fallback_title(content: &str, chars: usize, at: NaiveDateTime) -> String {
    let prefix: String = content
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(chars)
        .collect();
    let stamp = at.format(TIMESTAMP_FORMAT).to_string();
    if prefix.is_empty() {
        stamp
    } else {
        format!("{} {}", prefix, stamp)
    }
}
