//! Per-sender memory and list entries
//!
//! `SenderState` is owned by the engine's decay store. Everything outside the
//! store sees it either through a scoped `&mut` inside the store's per-sender
//! lock or as an immutable [`SenderSnapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Fingerprint of a recently seen message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenFingerprint {
    pub fingerprint: String,
    pub seen_at: DateTime<Utc>,
}

/// Persistent state for one sender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderState {
    pub sender_id: String,
    /// Current estimated danger, [0, 1]
    pub risk_score: f64,
    /// Long-run trustworthiness, [0, 1]
    pub reputation: f64,
    /// Set once risk has reached the baseline; from then on it never falls below it
    pub baseline_reached: bool,
    pub first_seen: DateTime<Utc>,
    /// Monotonically non-decreasing
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    /// Messages that produced a FLAG or BLOCK
    pub flagged_count: u64,
    /// Remaining rate-limit tokens, [0, capacity]
    pub token_bucket_level: f64,
    /// Oldest first
    pub recent_message_hashes: VecDeque<SeenFingerprint>,
}

impl SenderState {
    pub fn new(sender_id: &str, now: DateTime<Utc>, reputation: f64, bucket_capacity: f64) -> Self {
        let mut state = Self {
            sender_id: sender_id.to_string(),
            risk_score: 0.0,
            reputation,
            baseline_reached: false,
            first_seen: now,
            last_seen: now,
            message_count: 0,
            flagged_count: 0,
            token_bucket_level: bucket_capacity,
            recent_message_hashes: VecDeque::new(),
        };
        state.clamp_invariants();
        state
    }

    /// Move the clock forward to `now` and return the elapsed seconds.
    ///
    /// Out-of-order timestamps leave `last_seen` untouched and report zero.
    pub fn advance_clock(&mut self, now: DateTime<Utc>) -> f64 {
        let elapsed = crate::elapsed_secs(self.last_seen, now);
        if now > self.last_seen {
            self.last_seen = now;
        }
        elapsed
    }

    /// Force numeric fields back into their documented ranges
    pub fn clamp_invariants(&mut self) {
        self.risk_score = clamp_unit(self.risk_score);
        self.reputation = clamp_unit(self.reputation);
        if !self.token_bucket_level.is_finite() || self.token_bucket_level < 0.0 {
            self.token_bucket_level = 0.0;
        }
    }

    pub fn snapshot(&self, reputation_floor: f64) -> SenderSnapshot {
        SenderSnapshot {
            sender_id: self.sender_id.clone(),
            risk_score: self.risk_score,
            reputation: self.reputation,
            level: ReputationLevel::from_reputation(self.reputation, reputation_floor),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            message_count: self.message_count,
            flagged_count: self.flagged_count,
            token_bucket_level: self.token_bucket_level,
            tracked_fingerprints: self.recent_message_hashes.len(),
        }
    }
}

/// Clamp to [0, 1]; NaN collapses to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Read-only view of a sender for verdicts and dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderSnapshot {
    pub sender_id: String,
    pub risk_score: f64,
    pub reputation: f64,
    pub level: ReputationLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    pub flagged_count: u64,
    pub token_bucket_level: f64,
    pub tracked_fingerprints: usize,
}

/// Coarse trust bands derived from reputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationLevel {
    Trusted,
    Normal,
    Suspicious,
    Low,
}

impl ReputationLevel {
    pub fn from_reputation(reputation: f64, floor: f64) -> Self {
        if reputation > 0.7 {
            ReputationLevel::Trusted
        } else if reputation > 0.4 {
            ReputationLevel::Normal
        } else if reputation > floor {
            ReputationLevel::Suspicious
        } else {
            ReputationLevel::Low
        }
    }
}

impl fmt::Display for ReputationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReputationLevel::Trusted => "trusted",
            ReputationLevel::Normal => "normal",
            ReputationLevel::Suspicious => "suspicious",
            ReputationLevel::Low => "low",
        };
        f.write_str(name)
    }
}

/// Who put a sender on the blocklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    Operator,
    Escalation,
}

/// A blocklisted sender; removed only by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub sender_id: String,
    pub added_at: DateTime<Utc>,
    pub reason: String,
    pub source: BlockSource,
    /// Messages rejected since the entry was added
    pub attempts: u64,
}

impl BlocklistEntry {
    pub fn new(sender_id: &str, reason: &str, source: BlockSource) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            added_at: Utc::now(),
            reason: reason.to_string(),
            source,
            attempts: 0,
        }
    }
}

/// A sender that skips the rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub sender_id: String,
    pub added_at: DateTime<Utc>,
    pub reason: String,
}

impl AllowlistEntry {
    pub fn new(sender_id: &str, reason: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            added_at: Utc::now(),
            reason: reason.to_string(),
        }
    }
}
