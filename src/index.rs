//! Similarity-index seam: point/payload types and the [`SimilarityIndex`]
//! trait the ingest pipeline writes to and the retriever reads from.
//!
//! Vector search engines are external; [`MemoryIndex`] is a brute-force
//! cosine implementation for tests and single-node runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Metadata stored alongside each chunk in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub article_id: String,
    pub source: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// ISO-8601 timestamp as received from the source. May be missing or
    /// malformed; readers must tolerate both.
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub asset_classes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub chunk_index: usize,
    #[serde(default)]
    pub sentiment_label: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
}

impl ChunkMetadata {
    pub fn published_at_utc(&self) -> Option<DateTime<Utc>> {
        self.published_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A vector plus payload, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// One search result as returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f64,
    pub payload: ChunkPayload,
}

/// Server-side filters understood by every index implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    /// `metadata.asset_classes` contains the value.
    AssetClass(String),
    /// `metadata.source` equals the value.
    Source(String),
    /// `metadata.published_at` is strictly before the instant.
    PublishedBefore(DateTime<Utc>),
}

impl SearchFilter {
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            SearchFilter::AssetClass(ac) => meta.asset_classes.iter().any(|a| a == ac),
            SearchFilter::Source(s) => &meta.source == s,
            SearchFilter::PublishedBefore(cutoff) => meta
                .published_at_utc()
                .map(|ts| ts < *cutoff)
                .unwrap_or(false),
        }
    }
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Delete every point matching `filter`; returns how many were removed
    /// when the backend reports it.
    async fn delete(&self, filter: &SearchFilter) -> Result<usize>;
}

/// Parse an ISO-8601 timestamp with or without offset. Naive timestamps are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    points: RwLock<Vec<ChunkPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl SimilarityIndex for MemoryIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let points = self.points.read().expect("index lock poisoned");
        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload.metadata)))
            .map(|p| SearchHit {
                score: cosine_sim(vector, &p.vector) as f64,
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        let mut stored = self.points.write().expect("index lock poisoned");
        for p in points {
            match stored.iter_mut().find(|s| s.id == p.id) {
                Some(existing) => *existing = p,
                None => stored.push(p),
            }
        }
        Ok(())
    }

    async fn delete(&self, filter: &SearchFilter) -> Result<usize> {
        let mut stored = self.points.write().expect("index lock poisoned");
        let before = stored.len();
        stored.retain(|p| !filter.matches(&p.payload.metadata));
        Ok(before - stored.len())
    }
}
