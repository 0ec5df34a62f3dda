//! Signal categories and per-message signal scores

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories of risky content detected by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    /// Unsolicited promotion and flooding
    Spam,
    /// Fraud: advance payment, fake deals, requests to hand over goods
    Scam,
    /// Manufactured time pressure and fear
    UrgencyAbuse,
    /// Pretending to be an authority, cooperative or trusted node
    Impersonation,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 4] = [
        SignalCategory::Spam,
        SignalCategory::Scam,
        SignalCategory::UrgencyAbuse,
        SignalCategory::Impersonation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Spam => "spam",
            SignalCategory::Scam => "scam",
            SignalCategory::UrgencyAbuse => "urgency_abuse",
            SignalCategory::Impersonation => "impersonation",
        }
    }

    fn index(&self) -> usize {
        match self {
            SignalCategory::Spam => 0,
            SignalCategory::Scam => 1,
            SignalCategory::UrgencyAbuse => 2,
            SignalCategory::Impersonation => 3,
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-category scores for one message, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    scores: [f64; 4],
}

impl SignalScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: SignalCategory) -> f64 {
        self.scores[category.index()]
    }

    /// Set a score, clamped to [0, 1]; NaN is treated as zero
    pub fn set(&mut self, category: SignalCategory, score: f64) {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        self.scores[category.index()] = score;
    }

    pub fn with(mut self, category: SignalCategory, score: f64) -> Self {
        self.set(category, score);
        self
    }

    /// Per-category maximum of two score sets
    pub fn max_merge(&self, other: &SignalScores) -> SignalScores {
        let mut merged = *self;
        for category in SignalCategory::ALL {
            merged.set(category, self.get(category).max(other.get(category)));
        }
        merged
    }

    /// Highest single category score
    pub fn max(&self) -> f64 {
        self.scores.iter().copied().fold(0.0, f64::max)
    }

    pub fn is_zero(&self) -> bool {
        self.scores.iter().all(|s| *s == 0.0)
    }

    /// Categories at or above `floor`, strongest first
    pub fn triggered(&self, floor: f64) -> Vec<SignalCategory> {
        let mut hits: Vec<SignalCategory> = SignalCategory::ALL
            .into_iter()
            .filter(|c| self.get(*c) > 0.0 && self.get(*c) >= floor)
            .collect();
        hits.sort_by(|a, b| self.get(*b).total_cmp(&self.get(*a)));
        hits
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalCategory, f64)> + '_ {
        SignalCategory::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_are_clamped() {
        let scores = SignalScores::new()
            .with(SignalCategory::Spam, 1.7)
            .with(SignalCategory::Scam, -0.2)
            .with(SignalCategory::Impersonation, f64::NAN);
        assert_eq!(scores.get(SignalCategory::Spam), 1.0);
        assert_eq!(scores.get(SignalCategory::Scam), 0.0);
        assert_eq!(scores.get(SignalCategory::Impersonation), 0.0);
    }

    #[test]
    fn test_max_merge() {
        let a = SignalScores::new().with(SignalCategory::Spam, 0.4);
        let b = SignalScores::new()
            .with(SignalCategory::Spam, 0.2)
            .with(SignalCategory::Scam, 0.6);
        let merged = a.max_merge(&b);
        assert_eq!(merged.get(SignalCategory::Spam), 0.4);
        assert_eq!(merged.get(SignalCategory::Scam), 0.6);
    }

    #[test]
    fn test_triggered_ordering() {
        let scores = SignalScores::new()
            .with(SignalCategory::Spam, 0.3)
            .with(SignalCategory::UrgencyAbuse, 0.8)
            .with(SignalCategory::Impersonation, 0.1);
        assert_eq!(
            scores.triggered(0.2),
            vec![SignalCategory::UrgencyAbuse, SignalCategory::Spam]
        );
    }
}
