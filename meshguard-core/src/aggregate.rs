//! Signal aggregation
//!
//! Only categories whose raw score reaches the trigger floor take part.
//! `aggregate = max(wᶜ·scoreᶜ) + overlap_bonus · Σ(other weighted scores)`
//! over those categories, so the bonus exists only when two or more trigger.
//! The result is clamped to [0, 1].

use crate::{CategoryWeights, SignalScores};

/// Combines per-category scores into one risk signal
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    weights: CategoryWeights,
    trigger_floor: f64,
}

impl SignalAggregator {
    pub fn new(weights: CategoryWeights, trigger_floor: f64) -> Self {
        Self {
            weights,
            trigger_floor,
        }
    }

    pub fn aggregate(&self, scores: &SignalScores) -> f64 {
        let mut weighted: Vec<f64> = scores
            .triggered(self.trigger_floor)
            .into_iter()
            .map(|category| scores.get(category) * self.weights.weight(category))
            .collect();
        weighted.sort_by(|a, b| b.total_cmp(a));

        let Some((top, others)) = weighted.split_first() else {
            return 0.0;
        };
        let bonus = self.weights.overlap_bonus * others.iter().sum::<f64>();

        crate::clamp_unit(top + bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalCategory::*;

    fn aggregator() -> SignalAggregator {
        SignalAggregator::new(CategoryWeights::default(), 0.2)
    }

    #[test]
    fn test_zero_scores() {
        assert_eq!(aggregator().aggregate(&SignalScores::new()), 0.0);
    }

    #[test]
    fn test_single_signal_is_weighted_max() {
        let scores = SignalScores::new().with(Scam, 0.8).with(Spam, 0.1);
        assert!((aggregator().aggregate(&scores) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_escalates_beyond_either_signal() {
        let agg = aggregator();
        let scam_only = agg.aggregate(&SignalScores::new().with(Scam, 0.6));
        let urgency_only = agg.aggregate(&SignalScores::new().with(UrgencyAbuse, 0.6));
        let both = agg.aggregate(&SignalScores::new().with(Scam, 0.6).with(UrgencyAbuse, 0.6));
        assert!(both > scam_only);
        assert!(both > urgency_only);
    }

    #[test]
    fn test_aggregate_is_capped() {
        let scores = SignalScores::new()
            .with(Scam, 1.0)
            .with(UrgencyAbuse, 1.0)
            .with(Impersonation, 1.0)
            .with(Spam, 1.0);
        assert_eq!(aggregator().aggregate(&scores), 1.0);
    }

    #[test]
    fn test_untriggered_category_contributes_nothing() {
        let scores = SignalScores::new().with(UrgencyAbuse, 0.15);
        assert_eq!(aggregator().aggregate(&scores), 0.0);
    }

    #[test]
    fn test_weak_co_signal_adds_no_bonus() {
        let scores = SignalScores::new().with(Scam, 0.5).with(Spam, 0.1);
        assert!((aggregator().aggregate(&scores) - 0.5).abs() < 1e-9);
    }
}
