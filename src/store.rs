//! Local article persistence.
//!
//! A flat list of [`Article`] records, newest first. [`JsonFileStore`] keeps
//! the list in one JSON file (the CLI's equivalent of the browser's
//! localStorage key); [`MemoryStore`] backs tests.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::article::Article;

/// CRUD over saved articles.
pub trait ArticleStore: Send + Sync {
    /// All articles, newest first.
    fn list(&self) -> Result<Vec<Article>>;

    fn get(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.list()?.into_iter().find(|a| a.id == id))
    }

    /// Prepends `article`.
    fn save(&self, article: &Article) -> Result<()>;

    /// Removes the article with `id`. Returns whether one was removed.
    fn delete(&self, id: &str) -> Result<bool>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_all(&self, articles: &[Article]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(articles)?;
        // Replace via a temp file; readers never see a partial write.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl ArticleStore for JsonFileStore {
    fn list(&self) -> Result<Vec<Article>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read article store: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse article store: {}", self.path.display()))
    }

    fn save(&self, article: &Article) -> Result<()> {
        let mut articles = self.list()?;
        articles.insert(0, article.clone());
        self.write_all(&articles)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut articles = self.list()?;
        let before = articles.len();
        articles.retain(|a| a.id != id);
        if articles.len() == before {
            return Ok(false);
        }
        self.write_all(&articles)?;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArticleStore for MemoryStore {
    fn list(&self) -> Result<Vec<Article>> {
        Ok(self
            .articles
            .lock()
            .map_err(|_| anyhow::anyhow!("article store lock poisoned"))?
            .clone())
    }

    fn save(&self, article: &Article) -> Result<()> {
        self.articles
            .lock()
            .map_err(|_| anyhow::anyhow!("article store lock poisoned"))?
            .insert(0, article.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut articles = self
            .articles
            .lock()
            .map_err(|_| anyhow::anyhow!("article store lock poisoned"))?;
        let before = articles.len();
        articles.retain(|a| a.id != id);
        Ok(articles.len() != before)
    }
}
