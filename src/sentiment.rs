use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    /// +1 / -1 / 0 polarity used by the shift detector.
    pub fn polarity(&self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
        }
    }
}

/// Classifier output: a label plus its confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        Self {
            label,
            score: score.clamp(0.0, 1.0),
        }
    }

    pub fn neutral() -> Self {
        Self::new(SentimentLabel::Neutral, 0.5)
    }
}

#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> anyhow::Result<Sentiment>;
}

static POSITIVE: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "surge", "rally", "gain", "rise", "jump", "soar", "boost", "bull",
        "optimistic", "growth", "beat", "exceed", "strong", "recovery",
        "upgrade", "outperform", "record high", "breakthrough",
    ]
});

static NEGATIVE: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "crash", "plunge", "drop", "fall", "decline", "slump", "bear",
        "pessimistic", "recession", "miss", "weak", "downturn", "selloff",
        "downgrade", "underperform", "record low", "crisis", "default",
    ]
});

/// Keyword-presence scorer used when no model-backed scorer is wired.
///
/// Counts distinct positive/negative cues (substring match on lowercased
/// text). A positive ratio above 0.6 is positive, below 0.4 negative,
/// anything else (including no cues) neutral at 0.5.
#[derive(Debug, Clone, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        let pos = POSITIVE.iter().filter(|w| lower.contains(*w)).count();
        let neg = NEGATIVE.iter().filter(|w| lower.contains(*w)).count();

        let total = pos + neg;
        if total == 0 {
            return Sentiment::neutral();
        }

        let pos_ratio = pos as f64 / total as f64;
        if pos_ratio > 0.6 {
            Sentiment::new(SentimentLabel::Positive, round4(pos_ratio))
        } else if pos_ratio < 0.4 {
            Sentiment::new(SentimentLabel::Negative, round4(neg as f64 / total as f64))
        } else {
            Sentiment::neutral()
        }
    }
}

#[async_trait]
impl SentimentScorer for KeywordScorer {
    async fn score(&self, text: &str) -> anyhow::Result<Sentiment> {
        Ok(self.classify(text))
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_cues() {
        let s = KeywordScorer::new()
            .classify("Markets surge and rally on strong growth data, beating expectations.");
        assert_eq!(s.label, SentimentLabel::Positive);
    }

    #[test]
    fn negative_cues() {
        let s = KeywordScorer::new().classify(
            "Markets crash and plunge in a massive selloff amid recession fears and crisis.",
        );
        assert_eq!(s.label, SentimentLabel::Negative);
        assert!((s.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_cues_is_neutral() {
        let s = KeywordScorer::new().classify("The weather is nice today and I had coffee.");
        assert_eq!(s, Sentiment::neutral());
    }

    #[test]
    fn label_serializes_lowercase() {
        let v = serde_json::to_string(&SentimentLabel::Negative).unwrap();
        assert_eq!(v, "\"negative\"");
        assert_eq!(SentimentLabel::Positive.polarity(), 1.0);
    }
}
