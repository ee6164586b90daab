// src/ingest/types.rs
use anyhow::Result;

use crate::dedup::Deduplicator;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct Article {
    /// Content hash of `text`; empty until [`Article::with_content_id`] runs.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    pub source: String,      // e.g. "Reuters", "r/wallstreetbets"
    #[serde(default)]
    pub source_type: String, // "rss" | "web" | "social"
    #[serde(default)]
    pub asset_classes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    /// ISO-8601 as delivered by the source; may be absent or malformed.
    #[serde(default)]
    pub published_at: Option<String>,
}

impl Article {
    /// Derive `id` from the content hash of the raw text.
    pub fn with_content_id(mut self) -> Self {
        self.id = Deduplicator::hash_content(&self.text);
        self
    }
}

/// A contiguous token window of one article's cleaned text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_token: usize,
    pub end_token: usize,
    pub chunk_index: usize,
}

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch variant; the default embeds one text at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}
