//! Guard counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use meshguard_core::{Action, PowerMode, Reason, ReputationLevel, Verdict};

#[derive(Debug, Default)]
pub struct GuardStats {
    processed: AtomicU64,
    allowed: AtomicU64,
    flagged: AtomicU64,
    blocked: AtomicU64,
    blocklist_hits: AtomicU64,
    rate_limited: AtomicU64,
    duplicates: AtomicU64,
    escalations: AtomicU64,
    full_analyses: AtomicU64,
    quick_skips: AtomicU64,
}

impl GuardStats {
    pub fn record(&self, verdict: &Verdict) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match verdict.action {
            Action::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            Action::Flag => self.flagged.fetch_add(1, Ordering::Relaxed),
            Action::Block => self.blocked.fetch_add(1, Ordering::Relaxed),
        };
        for reason in &verdict.reasons {
            match reason {
                Reason::Blocklisted => {
                    self.blocklist_hits.fetch_add(1, Ordering::Relaxed);
                }
                Reason::RateLimited => {
                    self.rate_limited.fetch_add(1, Ordering::Relaxed);
                }
                Reason::Duplicate => {
                    self.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_full_analysis(&self) {
        self.full_analyses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quick_skip(&self) {
        self.quick_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> Counters {
        Counters {
            processed: self.processed.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            flagged: self.flagged.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            blocklist_hits: self.blocklist_hits.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            full_analyses: self.full_analyses.load(Ordering::Relaxed),
            quick_skips: self.quick_skips.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub processed: u64,
    pub allowed: u64,
    pub flagged: u64,
    pub blocked: u64,
    pub blocklist_hits: u64,
    pub rate_limited: u64,
    pub duplicates: u64,
    /// Senders automatically blocklisted after a BLOCK
    pub escalations: u64,
    /// Messages scored with the full pattern tables
    pub full_analyses: u64,
    /// Messages the quick check cleared without full analysis
    pub quick_skips: u64,
}

/// Senders per reputation band
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationDistribution {
    pub trusted: usize,
    pub normal: usize,
    pub suspicious: usize,
    pub low: usize,
}

impl ReputationDistribution {
    pub fn from_counts(counts: &[(ReputationLevel, usize)]) -> Self {
        let mut dist = Self::default();
        for (level, n) in counts {
            match level {
                ReputationLevel::Trusted => dist.trusted += n,
                ReputationLevel::Normal => dist.normal += n,
                ReputationLevel::Suspicious => dist.suspicious += n,
                ReputationLevel::Low => dist.low += n,
            }
        }
        dist
    }
}

/// Everything a dashboard needs in one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub power_mode: PowerMode,
    pub counters: Counters,
    pub tracked_senders: usize,
    pub blocklisted_senders: usize,
    pub trusted_senders: usize,
    pub reputation: ReputationDistribution,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshguard_core::Direction;

    fn verdict(action: Action, reasons: Vec<Reason>) -> Verdict {
        Verdict {
            action,
            risk_score: 0.0,
            signal: 0.0,
            reasons,
            direction: Direction::Inbound,
            sender: None,
        }
    }

    #[test]
    fn test_counters() {
        let stats = GuardStats::default();
        stats.record(&verdict(Action::Allow, vec![]));
        stats.record(&verdict(Action::Flag, vec![Reason::RateLimited]));
        stats.record(&verdict(Action::Flag, vec![Reason::Duplicate]));
        stats.record(&verdict(Action::Block, vec![Reason::Blocklisted]));
        stats.record_escalation();
        stats.record_full_analysis();
        stats.record_quick_skip();
        stats.record_quick_skip();

        let c = stats.counters();
        assert_eq!(c.processed, 4);
        assert_eq!(c.allowed, 1);
        assert_eq!(c.flagged, 2);
        assert_eq!(c.blocked, 1);
        assert_eq!(c.rate_limited, 1);
        assert_eq!(c.duplicates, 1);
        assert_eq!(c.blocklist_hits, 1);
        assert_eq!(c.escalations, 1);
        assert_eq!(c.full_analyses, 1);
        assert_eq!(c.quick_skips, 2);
    }

    #[test]
    fn test_distribution() {
        let dist = ReputationDistribution::from_counts(&[
            (ReputationLevel::Trusted, 2),
            (ReputationLevel::Low, 1),
        ]);
        assert_eq!(dist.trusted, 2);
        assert_eq!(dist.low, 1);
        assert_eq!(dist.normal, 0);
    }
}
