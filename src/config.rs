// src/config.rs
//! Runtime settings loaded from TOML with env overrides.
//!
//! Lookup order:
//! 1) `$FINSIGHT_CONFIG_PATH`
//! 2) `config/finsight.toml`
//! 3) built-in defaults
//!
//! Every section is optional; missing keys fall back to defaults. Values are
//! sanitized after loading so downstream code never sees a zero chunk size or
//! negative weights.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "FINSIGHT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/finsight.toml";

/// Redis URL for the shared TTL store. Unset or empty keeps state in memory.
pub const ENV_REDIS_URL: &str = "FINSIGHT_REDIS_URL";

const ENV_PRICE_THRESHOLD: &str = "FINSIGHT_ALERT_PRICE_THRESHOLD";
const ENV_CHUNK_SIZE: &str = "FINSIGHT_CHUNK_SIZE";
const ENV_CHUNK_OVERLAP: &str = "FINSIGHT_CHUNK_OVERLAP";
const ENV_TOP_K: &str = "FINSIGHT_RETRIEVAL_TOP_K";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub dedup: DedupSettings,
    pub chunking: ChunkSettings,
    pub retrieval: RetrievalSettings,
    pub alerts: AlertSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `redis://host:port/db`. `None` runs dedup and cooldowns in memory.
    pub redis_url: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            connect_timeout_ms: 2_000,
        }
    }
}

impl StoreSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    /// How long a seen hash is remembered by the durable backend.
    pub ttl_days: u64,
    /// Per-call deadline for store round-trips.
    pub store_timeout_ms: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            store_timeout_ms: 500,
        }
    }
}

impl DedupSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days * 24 * 3600)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Cleaned articles shorter than this (in chars) are not indexed.
    pub min_article_chars: usize,
    /// Indexed chunks older than this are removed by the expiry sweep.
    pub news_expiry_days: i64,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            min_article_chars: 50,
            news_expiry_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub overfetch_factor: usize,
    pub semantic_weight: f64,
    pub recency_weight: f64,
    /// Exponential decay per hour of age.
    pub decay_per_hour: f64,
    /// Age assumed when `published_at` is missing or unparseable.
    pub missing_age_hours: f64,
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 8,
            overfetch_factor: 3,
            semantic_weight: 0.7,
            recency_weight: 0.3,
            decay_per_hour: 0.1,
            missing_age_hours: 48.0,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Fractional move that counts as a spike (0.015 = 1.5%).
    pub price_move_threshold: f64,
    pub cooldown_secs: u64,
    pub news_min_score: f64,
    pub news_high_score: f64,
    pub news_title_prefix: usize,
    pub sentiment_min_samples: usize,
    pub sentiment_shift_threshold: f64,
    /// Minimum |percent change| for each leg of a correlation pair.
    pub correlation_min_move_pct: f64,
    pub history_cap: usize,
    pub store_timeout_ms: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            price_move_threshold: 0.015,
            cooldown_secs: 15 * 60,
            news_min_score: 0.75,
            news_high_score: 0.9,
            news_title_prefix: 50,
            sentiment_min_samples: 5,
            sentiment_shift_threshold: 0.5,
            correlation_min_move_pct: 0.5,
            history_cap: 500,
            store_timeout_ms: 500,
        }
    }
}

impl AlertSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Settings {
    /// Load from an explicit TOML file, then apply env overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let mut cfg: Settings = toml::from_str(&data)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using `$FINSIGHT_CONFIG_PATH`, then `config/finsight.toml`,
    /// then defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from_file(&fallback);
        }
        let mut cfg = Settings::default();
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_REDIS_URL) {
            self.store.redis_url = Some(url);
        }
        if let Some(v) = parse_env::<f64>(ENV_PRICE_THRESHOLD) {
            self.alerts.price_move_threshold = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_CHUNK_SIZE) {
            self.chunking.chunk_size = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_CHUNK_OVERLAP) {
            self.chunking.overlap = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_TOP_K) {
            self.retrieval.top_k = v;
        }
    }

    fn sanitize(&mut self) {
        let defaults = Settings::default();

        self.store.redis_url = self
            .store
            .redis_url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if self.chunking.chunk_size == 0 {
            self.chunking.chunk_size = defaults.chunking.chunk_size;
        }
        if self.retrieval.top_k == 0 {
            self.retrieval.top_k = defaults.retrieval.top_k;
        }
        self.retrieval.overfetch_factor = self.retrieval.overfetch_factor.max(1);
        if self.retrieval.semantic_weight < 0.0 || self.retrieval.recency_weight < 0.0 {
            self.retrieval.semantic_weight = defaults.retrieval.semantic_weight;
            self.retrieval.recency_weight = defaults.retrieval.recency_weight;
        }
        if !self.retrieval.decay_per_hour.is_finite() || self.retrieval.decay_per_hour < 0.0 {
            self.retrieval.decay_per_hour = defaults.retrieval.decay_per_hour;
        }

        let a = &mut self.alerts;
        if !(a.price_move_threshold > 0.0 && a.price_move_threshold < 1.0) {
            a.price_move_threshold = defaults.alerts.price_move_threshold;
        }
        a.news_min_score = a.news_min_score.clamp(0.0, 1.0);
        a.news_high_score = a.news_high_score.clamp(0.0, 1.0);
        if a.news_min_score > a.news_high_score {
            std::mem::swap(&mut a.news_min_score, &mut a.news_high_score);
        }
        if a.history_cap == 0 {
            a.history_cap = defaults.alerts.history_cap;
        }
        // the halves split needs at least one sample on each side
        a.sentiment_min_samples = a.sentiment_min_samples.max(2);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
}
