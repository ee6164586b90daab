//! Time-weighted retrieval over a [`SimilarityIndex`].
//!
//! Over-fetches `overfetch_factor × k` candidates (3× by default), then
//! re-ranks by a blend of semantic similarity and exponential recency decay:
//!
//! ```text
//! age_h   = now - published_at            (missing/unparseable -> 48h)
//! recency = exp(-decay_per_hour * max(age_h, 0))
//! score   = semantic_weight * semantic + recency_weight * recency
//! ```
//!
//! With the default decay of 0.1/h the recency half-life is about 6.9 hours.
//! The sort is stable, so equal scores keep the index's order. Results are
//! never padded: fewer candidates in, fewer results out.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::{system_clock, SharedClock};
use crate::config::RetrievalSettings;
use crate::index::{ChunkMetadata, SearchFilter, SearchHit, SimilarityIndex};

#[derive(Error, Debug)]
pub enum RetrieveError {
    /// The similarity index (or its client) returned an error.
    #[error("similarity search failed: {0:#}")]
    Index(anyhow::Error),

    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),
}

/// Re-ranking knobs, decoupled from the settings file for tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub semantic_weight: f64,
    pub recency_weight: f64,
    pub decay_per_hour: f64,
    pub missing_age_hours: f64,
    pub overfetch_factor: usize,
    /// Result count used by [`TimeWeightedRetriever::retrieve_context`].
    pub top_k: usize,
    /// Deadline used by [`TimeWeightedRetriever::retrieve_context`].
    pub timeout: Duration,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for RetrievalParams {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            semantic_weight: s.semantic_weight,
            recency_weight: s.recency_weight,
            decay_per_hour: s.decay_per_hour,
            missing_age_hours: s.missing_age_hours,
            overfetch_factor: s.overfetch_factor.max(1),
            top_k: s.top_k,
            timeout: Duration::from_millis(s.timeout_ms),
        }
    }
}

/// A re-ranked chunk with its score components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub semantic_score: f64,
    pub recency: f64,
    pub score: f64,
}

pub struct TimeWeightedRetriever {
    index: Arc<dyn SimilarityIndex>,
    params: RetrievalParams,
    clock: SharedClock,
}

impl TimeWeightedRetriever {
    pub fn new(index: Arc<dyn SimilarityIndex>, params: RetrievalParams) -> Self {
        Self::with_clock(index, params, system_clock())
    }

    pub fn with_clock(
        index: Arc<dyn SimilarityIndex>,
        params: RetrievalParams,
        clock: SharedClock,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            index,
            params,
            clock,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Age in hours of a candidate; falls back to `missing_age_hours`.
    pub fn age_hours(&self, meta: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        match meta.published_at_utc() {
            Some(ts) => (now - ts).num_milliseconds() as f64 / 3_600_000.0,
            None => self.params.missing_age_hours,
        }
    }

    /// Returns `(recency, blended score)` for one hit.
    pub fn time_score(&self, hit: &SearchHit, now: DateTime<Utc>) -> (f64, f64) {
        let age = self.age_hours(&hit.payload.metadata, now);
        let recency = (-self.params.decay_per_hour * age.max(0.0)).exp();
        let score = self.params.semantic_weight * hit.score + self.params.recency_weight * recency;
        (recency, score)
    }

    /// Top-`k` chunks for `query_vector`, optionally restricted to one asset
    /// class. `hours_back` is carried for callers and logging; staleness is
    /// handled by the recency term rather than a hard cutoff.
    pub async fn retrieve(
        &self,
        query_vector: &[f32],
        k: usize,
        asset_class: Option<&str>,
        hours_back: u32,
    ) -> Result<Vec<RankedChunk>, RetrieveError> {
        counter!("retrieval_requests_total").increment(1);
        if k == 0 {
            return Ok(Vec::new());
        }

        let filter = asset_class
            .filter(|a| !a.is_empty())
            .map(|a| SearchFilter::AssetClass(a.to_string()));
        let limit = k.saturating_mul(self.params.overfetch_factor);

        let hits = self
            .index
            .search(query_vector, filter.as_ref(), limit)
            .await
            .map_err(RetrieveError::Index)?;

        histogram!("retrieval_candidates").record(hits.len() as f64);
        if hits.is_empty() {
            tracing::info!(target: "retrieval", asset_class, "no retrieval results");
            return Ok(Vec::new());
        }

        let candidates = hits.len();
        let ranked = self.rerank(hits, k);

        tracing::info!(
            target: "retrieval",
            candidates,
            returned = ranked.len(),
            asset_class,
            hours_back,
            "retrieval complete"
        );
        Ok(ranked)
    }

    /// [`retrieve`](Self::retrieve) under a caller-supplied deadline.
    pub async fn retrieve_with_timeout(
        &self,
        query_vector: &[f32],
        k: usize,
        asset_class: Option<&str>,
        hours_back: u32,
        timeout: Duration,
    ) -> Result<Vec<RankedChunk>, RetrieveError> {
        match tokio::time::timeout(
            timeout,
            self.retrieve(query_vector, k, asset_class, hours_back),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(RetrieveError::Timeout(timeout)),
        }
    }

    /// Request-path helper: any failure becomes an empty context list.
    pub async fn retrieve_or_empty(
        &self,
        query_vector: &[f32],
        k: usize,
        asset_class: Option<&str>,
        hours_back: u32,
        timeout: Duration,
    ) -> Vec<RankedChunk> {
        match self
            .retrieve_with_timeout(query_vector, k, asset_class, hours_back, timeout)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "retrieval", error = %e, "retrieval failed, continuing without context");
                counter!("retrieval_failures_total").increment(1);
                Vec::new()
            }
        }
    }

    /// [`retrieve_or_empty`](Self::retrieve_or_empty) with the configured
    /// `top_k` and deadline.
    pub async fn retrieve_context(
        &self,
        query_vector: &[f32],
        asset_class: Option<&str>,
        hours_back: u32,
    ) -> Vec<RankedChunk> {
        self.retrieve_or_empty(
            query_vector,
            self.params.top_k,
            asset_class,
            hours_back,
            self.params.timeout,
        )
        .await
    }

    /// Plain similarity search restricted to one source, no re-ranking.
    pub async fn retrieve_by_source(
        &self,
        query_vector: &[f32],
        source: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, RetrieveError> {
        let filter = SearchFilter::Source(source.to_string());
        self.index
            .search(query_vector, Some(&filter), k)
            .await
            .map_err(RetrieveError::Index)
    }

    fn rerank(&self, hits: Vec<SearchHit>, k: usize) -> Vec<RankedChunk> {
        let now = self.clock.now();
        let mut ranked: Vec<RankedChunk> = hits
            .into_iter()
            .map(|hit| {
                let (recency, score) = self.time_score(&hit, now);
                RankedChunk {
                    semantic_score: hit.score,
                    text: hit.payload.text,
                    metadata: hit.payload.metadata,
                    recency,
                    score,
                }
            })
            .collect();
        // stable: ties keep index order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::index::{ChunkPayload, MemoryIndex};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn hit(score: f64, published_at: Option<String>) -> SearchHit {
        SearchHit {
            score,
            payload: ChunkPayload {
                text: "test chunk".into(),
                metadata: ChunkMetadata {
                    published_at,
                    source: "test".into(),
                    asset_classes: vec!["equities".into()],
                    ..Default::default()
                },
            },
        }
    }

    fn retriever(now: DateTime<Utc>) -> TimeWeightedRetriever {
        TimeWeightedRetriever::with_clock(
            Arc::new(MemoryIndex::new()),
            RetrievalParams::default(),
            Arc::new(ManualClock::new(now)),
        )
    }

    #[test]
    fn fresh_full_match_scores_one() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap();
        let r = retriever(now);
        let (_, s) = r.time_score(&hit(1.0, Some(now.to_rfc3339())), now);
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn seven_hours_decays_to_about_085() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap();
        let r = retriever(now);
        let t = now - ChronoDuration::hours(7);
        let (_, s) = r.time_score(&hit(1.0, Some(t.to_rfc3339())), now);
        assert!(s > 0.8 && s < 0.9, "score {s}");
    }

    #[test]
    fn invalid_or_missing_date_uses_48h() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap();
        let r = retriever(now);
        let expected = 0.7 * 0.5 + 0.3 * (-4.8f64).exp();
        let (_, a) = r.time_score(&hit(0.5, Some("invalid".into())), now);
        let (_, b) = r.time_score(&hit(0.5, None), now);
        assert!((a - expected).abs() < 1e-9);
        assert!((b - expected).abs() < 1e-9);
    }

    #[test]
    fn future_timestamps_clamp_to_zero_age() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap();
        let r = retriever(now);
        let future = now + ChronoDuration::hours(3);
        let (recency, _) = r.time_score(&hit(0.2, Some(future.to_rfc3339())), now);
        assert!((recency - 1.0).abs() < 1e-12);
    }
}
