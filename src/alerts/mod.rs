// src/alerts/mod.rs
//! Alert engine: price spikes, breaking news, sentiment shifts and
//! cross-asset co-moves, all gated by one shared [`CooldownStore`].
//!
//! Every check is a no-op when it does not trigger. When it does, the
//! cooldown is armed, the sink is invoked synchronously, and the alert is
//! appended to the durable history list.
//!
//! History is only kept by the durable backend. With the in-memory backend
//! [`AlertEngine::get_recent_alerts`] always returns an empty list; callers
//! that need history must provide a reachable store.

pub mod cooldown;
pub mod correlation;

pub use cooldown::CooldownStore;
pub use correlation::{default_pairs, CoMove, CorrelationPair};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::AlertSettings;
use crate::ingest::Article;
use crate::sentiment::{Sentiment, SentimentLabel};
use crate::store::{self, BackendKind, TtlStore, ALERT_HISTORY_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PriceSpike,
    BreakingNews,
    SentimentShift,
    #[serde(rename = "cross_asset_correlation")]
    Correlation,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::PriceSpike => "price_spike",
            AlertType::BreakingNews => "breaking_news",
            AlertType::SentimentShift => "sentiment_shift",
            AlertType::Correlation => "cross_asset_correlation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// A fired alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub symbol: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Receives every fired alert, synchronously, before the check returns.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn on_alert(&self, alert: &Alert) {
        self(alert)
    }
}

/// Default sink: one structured log line per alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn on_alert(&self, alert: &Alert) {
        tracing::info!(
            target: "alerts",
            alert_type = alert.alert_type.as_str(),
            symbol = %alert.symbol,
            severity = alert.severity.as_str(),
            message = %alert.message,
            "alert triggered"
        );
    }
}

/// One live quote: last price and percent change over the quote period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
}

pub struct AlertEngine {
    settings: AlertSettings,
    cooldowns: CooldownStore,
    sink: Arc<dyn AlertSink>,
    pairs: Vec<CorrelationPair>,
    clock: SharedClock,
}

impl AlertEngine {
    /// Probe `store` once; an unreachable or missing store selects the
    /// in-memory backend for the lifetime of the engine.
    pub async fn connect(
        store: Option<Arc<dyn TtlStore>>,
        settings: AlertSettings,
        clock: SharedClock,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        let cooldowns = CooldownStore::connect(
            store,
            settings.cooldown(),
            settings.store_timeout(),
            clock.clone(),
        )
        .await;
        Self::from_parts(settings, cooldowns, clock)
    }

    pub fn in_memory(settings: AlertSettings, clock: SharedClock) -> Self {
        crate::metrics::ensure_metrics_described();
        let cooldowns = CooldownStore::in_memory(settings.cooldown(), clock.clone());
        Self::from_parts(settings, cooldowns, clock)
    }

    fn from_parts(settings: AlertSettings, cooldowns: CooldownStore, clock: SharedClock) -> Self {
        Self {
            settings,
            cooldowns,
            sink: Arc::new(LogSink),
            pairs: default_pairs(),
            clock,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_pairs(mut self, pairs: Vec<CorrelationPair>) -> Self {
        self.pairs = pairs;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.cooldowns.backend()
    }

    /// Fractional price-move threshold (0.015 = 1.5%).
    pub fn threshold(&self) -> f64 {
        self.settings.price_move_threshold
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    pub async fn check_price_move(
        &self,
        symbol: &str,
        current: f64,
        previous: f64,
    ) -> Option<Alert> {
        if !previous.is_finite() || previous <= 0.0 || !current.is_finite() {
            return None;
        }
        let pct = (current - previous).abs() / previous;
        self.price_alert(symbol, current, previous, pct, current > previous)
            .await
    }

    /// Gate on `pct` (absolute fraction) and fire. Callers that already know
    /// the move pass it through rather than recomputing it from prices.
    async fn price_alert(
        &self,
        symbol: &str,
        current: f64,
        previous: f64,
        pct: f64,
        up: bool,
    ) -> Option<Alert> {
        let threshold = self.threshold();
        if pct < threshold {
            return None;
        }

        let direction = if up { "surged" } else { "plunged" };
        let severity = if pct > threshold * 2.0 {
            Severity::High
        } else {
            Severity::Medium
        };

        let alert = self.build(
            AlertType::PriceSpike,
            symbol.to_string(),
            format!(
                "{symbol} {direction} {:.2}% - from {previous:.4} to {current:.4}",
                pct * 100.0
            ),
            severity,
            json!({
                "current_price": current,
                "previous_price": previous,
                "pct_change": round2(pct * 100.0),
                "direction": if up { "up" } else { "down" },
            }),
        );
        self.fire(&format!("price_{symbol}"), alert).await
    }

    pub async fn check_breaking_news(&self, article: &Article, sentiment: &Sentiment) -> Option<Alert> {
        if sentiment.label == SentimentLabel::Neutral || sentiment.score < self.settings.news_min_score
        {
            return None;
        }

        let prefix: String = article
            .title
            .chars()
            .take(self.settings.news_title_prefix)
            .collect();
        let severity = if sentiment.score > self.settings.news_high_score {
            Severity::High
        } else {
            Severity::Medium
        };
        let label = sentiment.label.as_str();
        let source = if article.source.is_empty() {
            "unknown"
        } else {
            article.source.as_str()
        };

        let alert = self.build(
            AlertType::BreakingNews,
            article.asset_classes.join(","),
            format!(
                "Breaking ({label}, confidence {:.0}%): {}",
                sentiment.score * 100.0,
                article.title
            ),
            severity,
            json!({
                "title": article.title,
                "source": source,
                "sentiment_label": label,
                "sentiment_score": sentiment.score,
                "url": article.url,
            }),
        );
        self.fire(&format!("news_{prefix}"), alert).await
    }

    /// `records` are oldest first. The first `n/2` records form the early
    /// half; the rest (including the middle one when `n` is odd) the late half.
    pub async fn check_sentiment_shift(
        &self,
        asset_class: &str,
        records: &[Sentiment],
    ) -> Option<Alert> {
        let n = records.len();
        if n < self.settings.sentiment_min_samples.max(2) {
            return None;
        }

        let (early, late) = records.split_at(n / 2);
        let early_avg = mean_polarity(early);
        let late_avg = mean_polarity(late);
        let shift = late_avg - early_avg;
        if shift.abs() < self.settings.sentiment_shift_threshold {
            return None;
        }

        let direction = if shift > 0.0 { "bullish" } else { "bearish" };
        let alert = self.build(
            AlertType::SentimentShift,
            asset_class.to_string(),
            format!("Sentiment shift to {direction} for {asset_class} (delta: {shift:+.2})"),
            Severity::Medium,
            json!({
                "early_avg": round2(early_avg),
                "late_avg": round2(late_avg),
                "shift": round2(shift),
                "sample_size": n,
            }),
        );
        self.fire(&format!("sentiment_{asset_class}"), alert).await
    }

    /// `changes` maps symbol to percent change (1.2 = +1.2%). Pairs with a
    /// missing leg are skipped. At most one alert per pair.
    pub async fn check_cross_asset_correlation(&self, changes: &HashMap<String, f64>) -> Vec<Alert> {
        let mut fired = Vec::new();
        for pair in &self.pairs {
            let (Some(&chg_a), Some(&chg_b)) =
                (changes.get(&pair.symbol_a), changes.get(&pair.symbol_b))
            else {
                continue;
            };
            let Some(co_move) = pair.evaluate(chg_a, chg_b, self.settings.correlation_min_move_pct)
            else {
                continue;
            };

            let alert = self.build(
                AlertType::Correlation,
                format!("{},{}", pair.symbol_a, pair.symbol_b),
                format!("Cross-asset: {} - {}", pair.name, pair.rationale),
                Severity::Info,
                json!({
                    "symbol_a": pair.symbol_a,
                    "change_a": chg_a,
                    "symbol_b": pair.symbol_b,
                    "change_b": chg_b,
                    "relation": co_move.as_str(),
                }),
            );
            if let Some(a) = self.fire(&pair.cooldown_key(), alert).await {
                fired.push(a);
            }
        }
        fired
    }

    /// Run the price check for every quote, then the correlation check over
    /// the whole batch. The quote's own percent change gates the price alert;
    /// quotes at or below -100% (no previous price) are skipped.
    pub async fn sweep_prices(&self, quotes: &[PriceQuote]) -> Vec<Alert> {
        let mut fired = Vec::new();
        let mut changes = HashMap::with_capacity(quotes.len());

        for q in quotes {
            if !q.change_pct.is_finite() || !q.price.is_finite() {
                continue;
            }
            changes.insert(q.symbol.clone(), q.change_pct);

            let base = 1.0 + q.change_pct / 100.0;
            if base <= 0.0 {
                continue;
            }
            let previous = q.price / base;
            let pct = q.change_pct.abs() / 100.0;
            if let Some(a) = self
                .price_alert(&q.symbol, q.price, previous, pct, q.change_pct > 0.0)
                .await
            {
                fired.push(a);
            }
        }

        fired.extend(self.check_cross_asset_correlation(&changes).await);
        tracing::debug!(target: "alerts", quotes = quotes.len(), fired = fired.len(), "price sweep done");
        fired
    }

    /// Up to `limit` most recent alerts, newest first. Always empty on the
    /// in-memory backend. Entries that fail to parse are skipped.
    pub async fn get_recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let Some(s) = self.cooldowns.durable() else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }
        match store::with_deadline(self.settings.store_timeout(), s.range(ALERT_HISTORY_KEY, limit))
            .await
        {
            Ok(raw) => raw
                .iter()
                .filter_map(|r| match serde_json::from_str::<Alert>(r) {
                    Ok(a) => Some(a),
                    Err(e) => {
                        tracing::warn!(target: "alerts", error = %e, "skipping unreadable history entry");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!(target: "alerts", error = %e, "alert history unavailable");
                counter!("store_degraded_total", "component" => "alert_history").increment(1);
                Vec::new()
            }
        }
    }

    fn build(
        &self,
        alert_type: AlertType,
        symbol: String,
        message: String,
        severity: Severity,
        data: serde_json::Value,
    ) -> Alert {
        Alert {
            alert_type,
            symbol,
            message,
            severity,
            data,
            timestamp: self.clock.now(),
        }
    }

    async fn fire(&self, cooldown_key: &str, alert: Alert) -> Option<Alert> {
        let kind = alert.alert_type.as_str();
        if !self.cooldowns.try_acquire(cooldown_key).await {
            tracing::debug!(target: "alerts", key = cooldown_key, "suppressed by cooldown");
            counter!("alerts_suppressed_total", "type" => kind).increment(1);
            return None;
        }

        self.sink.on_alert(&alert);
        counter!("alerts_fired_total", "type" => kind).increment(1);

        if let Some(s) = self.cooldowns.durable() {
            match serde_json::to_string(&alert) {
                Ok(raw) => {
                    let push = s.push_bounded(ALERT_HISTORY_KEY, raw, self.settings.history_cap);
                    if let Err(e) = store::with_deadline(self.settings.store_timeout(), push).await {
                        tracing::warn!(target: "alerts", error = %e, "failed to append alert history");
                        counter!("store_degraded_total", "component" => "alert_history").increment(1);
                    }
                }
                Err(e) => tracing::warn!(target: "alerts", error = %e, "failed to serialize alert"),
            }
        }
        Some(alert)
    }
}

fn mean_polarity(items: &[Sentiment]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|s| s.label.polarity()).sum::<f64>() / items.len() as f64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
