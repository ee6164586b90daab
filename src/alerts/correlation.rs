// src/alerts/correlation.rs
//! Cross-asset pair table.
//!
//! Each pair carries a human-readable rationale and an `inverse` flag. The
//! alert fires when both legs move the same direction by more than the
//! minimum move. For a positively related pair that is the relationship
//! playing out; for an inverse pair it is the notable case, because the
//! legs usually move against each other.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub symbol_a: String,
    pub symbol_b: String,
    pub name: String,
    pub rationale: String,
    #[serde(default)]
    pub inverse: bool,
}

impl CorrelationPair {
    pub fn new(a: &str, b: &str, name: &str, rationale: &str, inverse: bool) -> Self {
        Self {
            symbol_a: a.to_string(),
            symbol_b: b.to_string(),
            name: name.to_string(),
            rationale: rationale.to_string(),
            inverse,
        }
    }

    pub fn cooldown_key(&self) -> String {
        format!("corr_{}_{}", self.symbol_a, self.symbol_b)
    }

    /// Evaluate one tick of percent changes. `min_move_pct` is compared
    /// against the absolute percent change of each leg (strictly greater).
    pub fn evaluate(&self, chg_a: f64, chg_b: f64, min_move_pct: f64) -> Option<CoMove> {
        if !(chg_a.abs() > min_move_pct && chg_b.abs() > min_move_pct) {
            return None;
        }
        let same_direction = (chg_a > 0.0) == (chg_b > 0.0);
        if !same_direction {
            // positive pair diverging, or inverse pair behaving as usual
            return None;
        }
        Some(if self.inverse {
            CoMove::InverseBroken
        } else {
            CoMove::Confirmed
        })
    }
}

/// How a qualifying same-direction move relates to the pair's expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoMove {
    /// Positively related legs moved together.
    Confirmed,
    /// Inversely related legs moved together instead of apart.
    InverseBroken,
}

impl CoMove {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoMove::Confirmed => "confirmed",
            CoMove::InverseBroken => "inverse_broken",
        }
    }
}

pub fn default_pairs() -> Vec<CorrelationPair> {
    vec![
        CorrelationPair::new(
            "EURUSD=X",
            "GC=F",
            "EUR/USD vs Gold",
            "USD weakness driving both EUR and gold higher",
            false,
        ),
        CorrelationPair::new(
            "USDJPY=X",
            "^GSPC",
            "USD/JPY vs S&P 500",
            "Risk-on sentiment lifting both equities and USD/JPY",
            false,
        ),
        CorrelationPair::new(
            "GC=F",
            "^GSPC",
            "Gold vs S&P 500",
            "Unusual same-direction move in gold and equities",
            true,
        ),
        CorrelationPair::new(
            "CL=F",
            "USDCAD=X",
            "Oil vs USD/CAD",
            "Oil move impacting CAD (petrocurrency)",
            true,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_pair_flags_same_direction_only() {
        let p = CorrelationPair::new("GC=F", "^GSPC", "g", "r", true);
        assert_eq!(p.evaluate(1.5, 1.4, 0.5), Some(CoMove::InverseBroken));
        assert_eq!(p.evaluate(-0.9, -0.8, 0.5), Some(CoMove::InverseBroken));
        assert_eq!(p.evaluate(1.5, -1.4, 0.5), None);
    }

    #[test]
    fn both_legs_must_clear_minimum() {
        let p = CorrelationPair::new("A", "B", "n", "r", false);
        assert_eq!(p.evaluate(1.5, 0.5, 0.5), None);
        assert_eq!(p.evaluate(0.2, 3.0, 0.5), None);
        assert_eq!(p.evaluate(0.6, 0.7, 0.5), Some(CoMove::Confirmed));
    }

    #[test]
    fn default_table_has_two_inverse_pairs() {
        let pairs = default_pairs();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs.iter().filter(|p| p.inverse).count(), 2);
        assert_eq!(pairs[2].cooldown_key(), "corr_GC=F_^GSPC");
    }
}
