//! Decay/memory store
//!
//! The single source of truth for cross-message sender memory. Each sender's
//! state sits behind its own mutex inside a sharded map, so messages from the
//! same sender serialize while different senders never contend on a shared
//! lock.
//!
//! Risk moves asymmetrically: it absorbs new danger fast (`1 - γ` of the gap)
//! and sheds it slowly (`γ` of the gap). Reputation runs the other way. During
//! long silences both drift back (risk toward γ, reputation toward the
//! midpoint) following `pull = 1 - e^(-γ·Δt/idle)`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use meshguard_core::{clamp_unit, GuardConfig, ReputationLevel, SenderSnapshot, SenderState};

/// Asymmetric update rules, parameterized by γ
#[derive(Debug, Clone)]
pub struct DecayModel {
    gamma: f64,
    idle_threshold_secs: f64,
    reputation_midpoint: f64,
    alert_low: f64,
    /// Off in power modes that drop reputation tracking
    track_reputation: bool,
}

impl DecayModel {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            gamma: config.gamma(),
            idle_threshold_secs: config.decay.idle_threshold_secs,
            reputation_midpoint: config.decay.reputation_midpoint,
            alert_low: config.thresholds.alert_low,
            track_reputation: config.profile().reputation,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Forget during silence. Returns true when the idle threshold was exceeded.
    pub fn forget(&self, state: &mut SenderState, elapsed_secs: f64) -> bool {
        if !(elapsed_secs > self.idle_threshold_secs) {
            return false;
        }
        let pull = 1.0 - (-self.gamma * elapsed_secs / self.idle_threshold_secs).exp();

        if state.risk_score > self.gamma {
            let decayed = state.risk_score - pull * (state.risk_score - self.gamma);
            state.risk_score = decayed.max(self.gamma);
        }
        state.reputation += pull * (self.reputation_midpoint - state.reputation);

        state.clamp_invariants();
        true
    }

    /// Fold one message's aggregated signal into the sender's memory
    pub fn absorb(&self, state: &mut SenderState, signal: f64) {
        let s = clamp_unit(signal);
        let g = self.gamma;

        if s > state.risk_score {
            state.risk_score += (1.0 - g) * (s - state.risk_score);
        } else {
            state.risk_score -= g * (state.risk_score - s);
            if state.baseline_reached {
                state.risk_score = state.risk_score.max(g);
            }
        }
        state.risk_score = clamp_unit(state.risk_score);
        if state.risk_score >= g {
            state.baseline_reached = true;
        }

        if self.track_reputation {
            if s < self.alert_low {
                state.reputation += g * (1.0 - state.reputation);
            } else {
                state.reputation -= (1.0 - g) * s * state.reputation;
            }
        }

        state.clamp_invariants();
    }
}

/// Sender records indexed by sender id, one lock per sender
#[derive(Debug, Default)]
pub struct DecayStore {
    senders: DashMap<String, Arc<Mutex<SenderState>>>,
}

impl DecayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to a sender's state, creating it on first use.
    ///
    /// Only the per-sender mutex is held while `f` runs.
    pub fn with_sender<R>(
        &self,
        sender_id: &str,
        init: impl FnOnce() -> SenderState,
        f: impl FnOnce(&mut SenderState) -> R,
    ) -> R {
        let slot = self
            .senders
            .entry(sender_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone();

        let mut state = slot.lock();
        let out = f(&mut state);
        state.clamp_invariants();
        out
    }

    /// Run `f` on an existing sender only; returns None for unknown senders
    pub fn update_existing<R>(&self, sender_id: &str, f: impl FnOnce(&mut SenderState) -> R) -> Option<R> {
        let slot = self.senders.get(sender_id).map(|entry| entry.value().clone())?;
        let mut state = slot.lock();
        let out = f(&mut state);
        state.clamp_invariants();
        Some(out)
    }

    /// Read-only snapshot; never creates state
    pub fn snapshot(&self, sender_id: &str, reputation_floor: f64) -> Option<SenderSnapshot> {
        let slot = self.senders.get(sender_id).map(|entry| entry.value().clone())?;
        let state = slot.lock();
        Some(state.snapshot(reputation_floor))
    }

    pub fn contains(&self, sender_id: &str) -> bool {
        self.senders.contains_key(sender_id)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Copy of every sender record, sorted by id
    pub fn export(&self) -> Vec<SenderState> {
        let slots: Vec<Arc<Mutex<SenderState>>> =
            self.senders.iter().map(|entry| entry.value().clone()).collect();
        let mut states: Vec<SenderState> = slots.iter().map(|slot| slot.lock().clone()).collect();
        states.sort_by(|a, b| a.sender_id.cmp(&b.sender_id));
        states
    }

    /// Insert or replace records, clamping anything out of range
    pub fn import(&self, states: Vec<SenderState>) -> usize {
        let mut imported = 0;
        for mut state in states {
            if state.sender_id.trim().is_empty() {
                continue;
            }
            state.clamp_invariants();
            self.senders
                .insert(state.sender_id.clone(), Arc::new(Mutex::new(state)));
            imported += 1;
        }
        imported
    }

    /// Count of senders per reputation level
    pub fn level_counts(&self, reputation_floor: f64) -> [(ReputationLevel, usize); 4] {
        let mut counts = [
            (ReputationLevel::Trusted, 0),
            (ReputationLevel::Normal, 0),
            (ReputationLevel::Suspicious, 0),
            (ReputationLevel::Low, 0),
        ];
        let slots: Vec<Arc<Mutex<SenderState>>> =
            self.senders.iter().map(|entry| entry.value().clone()).collect();
        for slot in slots {
            let level = ReputationLevel::from_reputation(slot.lock().reputation, reputation_floor);
            if let Some(count) = counts.iter_mut().find(|(l, _)| *l == level) {
                count.1 += 1;
            }
        }
        counts
    }
}

/// Fresh state for a sender first seen at `now`
pub fn fresh_state(sender_id: &str, now: DateTime<Utc>, config: &GuardConfig) -> SenderState {
    SenderState::new(
        sender_id,
        now,
        config.decay.initial_reputation,
        config.rate_limit.capacity,
    )
}
