// src/ingest/mod.rs
pub mod chunk;
pub mod clean;
pub mod types;

pub use chunk::chunk_text;
pub use clean::{clean_text, extract_headline};
pub use types::{Article, Chunk, Embedder};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;

use crate::config::ChunkSettings;
use crate::dedup::Deduplicator;
use crate::index::{ChunkMetadata, ChunkPayload, ChunkPoint, SearchFilter, SimilarityIndex};
use crate::sentiment::SentimentScorer;

/// Points per upsert call.
pub const INDEX_BATCH_SIZE: usize = 100;

/// Per-run counters, mirrored into metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub articles: usize,
    pub kept: usize,
    pub too_short: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub chunks: usize,
}

/// Why an article produced no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Indexed(usize),
    TooShort,
    Duplicate,
}

/// clean → chunk → embed → dedup gate → payloads.
pub struct ArticleProcessor {
    dedup: Arc<Deduplicator>,
    embedder: Arc<dyn Embedder>,
    scorer: Option<Arc<dyn SentimentScorer>>,
    settings: ChunkSettings,
}

impl ArticleProcessor {
    pub fn new(
        dedup: Arc<Deduplicator>,
        embedder: Arc<dyn Embedder>,
        settings: ChunkSettings,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            dedup,
            embedder,
            scorer: None,
            settings,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SentimentScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Process one article into index-ready points.
    ///
    /// Embedding happens before the dedup claim so a failed embed does not
    /// burn the content hash for the whole TTL.
    pub async fn process_article(&self, article: &Article) -> Result<(Outcome, Vec<ChunkPoint>)> {
        let article_id = if article.id.is_empty() {
            Deduplicator::hash_content(&article.text)
        } else {
            article.id.clone()
        };

        let text = clean_text(&article.text);
        if text.chars().count() < self.settings.min_article_chars {
            tracing::debug!(target: "ingest", %article_id, "article too short");
            return Ok((Outcome::TooShort, Vec::new()));
        }

        let chunks = chunk_text(&text, self.settings.chunk_size, self.settings.overlap);
        if chunks.is_empty() {
            return Ok((Outcome::TooShort, Vec::new()));
        }

        let sentiment = match &self.scorer {
            Some(s) => match s.score(&text).await {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(target: "ingest", %article_id, error = ?e, "sentiment scoring failed");
                    None
                }
            },
            None => None,
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("embedding article {article_id}"))?;
        anyhow::ensure!(
            vectors.len() == chunks.len(),
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );

        let content_hash = Deduplicator::hash_content(&article.text);
        if !self.dedup.claim(&content_hash).await {
            tracing::debug!(target: "ingest", %article_id, source = %article.source, "duplicate content");
            return Ok((Outcome::Duplicate, Vec::new()));
        }

        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkPoint {
                id: format!("{article_id}:{}", chunk.chunk_index),
                vector,
                payload: ChunkPayload {
                    text: chunk.text,
                    metadata: ChunkMetadata {
                        article_id: article_id.clone(),
                        source: article.source.clone(),
                        source_type: article.source_type.clone(),
                        url: article.url.clone(),
                        title: article.title.clone(),
                        published_at: article.published_at.clone(),
                        asset_classes: article.asset_classes.clone(),
                        regions: article.regions.clone(),
                        chunk_index: chunk.chunk_index,
                        sentiment_label: sentiment.map(|s| s.label.as_str().to_string()),
                        sentiment_score: sentiment.map(|s| s.score),
                    },
                },
            })
            .collect();

        tracing::debug!(target: "ingest", %article_id, chunks = points.len(), "article processed");
        Ok((Outcome::Indexed(points.len()), points))
    }

    /// Process a batch; a failing article is logged and skipped.
    pub async fn process_batch(&self, articles: &[Article]) -> (Vec<ChunkPoint>, IngestReport) {
        let mut report = IngestReport {
            articles: articles.len(),
            ..Default::default()
        };
        let mut all = Vec::new();

        for a in articles {
            match self.process_article(a).await {
                Ok((Outcome::Indexed(n), mut pts)) => {
                    report.kept += 1;
                    report.chunks += n;
                    all.append(&mut pts);
                }
                Ok((Outcome::TooShort, _)) => report.too_short += 1,
                Ok((Outcome::Duplicate, _)) => report.duplicates += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "ingest", error = ?e, source = %a.source, "article processing failed");
                }
            }
        }

        (all, report)
    }

    /// Process `articles` and upsert the resulting points into `index`.
    pub async fn run_once(
        &self,
        index: &dyn SimilarityIndex,
        articles: &[Article],
    ) -> Result<IngestReport> {
        let (points, report) = self.process_batch(articles).await;
        index_points(index, points).await?;

        counter!("ingest_articles_total").increment(report.articles as u64);
        counter!("ingest_chunks_total").increment(report.chunks as u64);
        counter!("ingest_skipped_total", "reason" => "too_short").increment(report.too_short as u64);
        counter!("ingest_skipped_total", "reason" => "duplicate").increment(report.duplicates as u64);
        counter!("ingest_skipped_total", "reason" => "failed").increment(report.failed as u64);
        gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

        tracing::info!(
            target: "ingest",
            articles = report.articles,
            kept = report.kept,
            duplicates = report.duplicates,
            too_short = report.too_short,
            failed = report.failed,
            chunks = report.chunks,
            "ingest run complete"
        );
        Ok(report)
    }
}

/// Upsert in batches of [`INDEX_BATCH_SIZE`]. Returns the number inserted.
pub async fn index_points(index: &dyn SimilarityIndex, points: Vec<ChunkPoint>) -> Result<usize> {
    if points.is_empty() {
        return Ok(0);
    }
    let mut inserted = 0usize;
    let mut rest = points;
    while !rest.is_empty() {
        let tail = rest.split_off(rest.len().min(INDEX_BATCH_SIZE));
        let n = rest.len();
        index.upsert(rest).await.context("index upsert")?;
        inserted += n;
        tracing::debug!(target: "ingest", batch = n, total = inserted, "indexed batch");
        rest = tail;
    }
    Ok(inserted)
}

/// Remove indexed chunks published more than `max_age_days` before `now`.
pub async fn delete_expired(
    index: &dyn SimilarityIndex,
    now: DateTime<Utc>,
    max_age_days: i64,
) -> Result<usize> {
    let cutoff = now - Duration::days(max_age_days);
    let removed = index
        .delete(&SearchFilter::PublishedBefore(cutoff))
        .await
        .context("deleting expired chunks")?;
    tracing::info!(target: "ingest", %cutoff, removed, "expired chunks deleted");
    Ok(removed)
}

/// Background task deleting chunks older than `max_age_days` once per
/// `every`. Failures are logged and retried on the next tick.
pub fn spawn_expiry_sweep(
    index: Arc<dyn SimilarityIndex>,
    max_age_days: i64,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = delete_expired(index.as_ref(), Utc::now(), max_age_days).await {
                tracing::warn!(target: "ingest", error = %format!("{e:#}"), "expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;

    struct LenEmbedder;

    #[async_trait::async_trait]
    impl Embedder for LenEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn point(i: usize) -> ChunkPoint {
        ChunkPoint {
            id: format!("p{i}"),
            vector: vec![1.0],
            payload: ChunkPayload {
                text: String::new(),
                metadata: ChunkMetadata::default(),
            },
        }
    }

    #[tokio::test]
    async fn batches_of_one_hundred() {
        let idx = MemoryIndex::new();
        let n = index_points(&idx, (0..250).map(point).collect()).await.unwrap();
        assert_eq!(n, 250);
        assert_eq!(idx.len(), 250);
        assert_eq!(index_points(&idx, Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn short_articles_are_skipped_before_embedding() {
        let p = ArticleProcessor::new(
            Arc::new(Deduplicator::in_memory()),
            Arc::new(LenEmbedder),
            ChunkSettings::default(),
        );
        let a = Article {
            text: "<p>too short</p>".into(),
            source: "Reuters".into(),
            ..Default::default()
        };
        let (outcome, pts) = p.process_article(&a).await.unwrap();
        assert_eq!(outcome, Outcome::TooShort);
        assert!(pts.is_empty());
    }
}
