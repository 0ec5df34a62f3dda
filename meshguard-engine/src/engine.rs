//! The Safety Guard decision engine

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use meshguard_core::{
    Action, AllowlistEntry, BlockSource, BlocklistEntry, CategoryWeights, DedupParams, Direction,
    GuardConfig, GuardError, LexicalClassifier, Message, PowerMode, PowerProfile, RateLimitParams,
    Reason, ReputationLevel, SenderSnapshot, SenderState, SignalAggregator, SignalScores,
    Thresholds, Verdict,
};

use crate::blocklist::{Allowlist, Blocklist};
use crate::dedup::{fingerprint, Deduplicator};
use crate::memory::{fresh_state, DecayModel, DecayStore};
use crate::rate_limit::RateLimiter;
use crate::stats::{GuardStats, ReputationDistribution, StatsSnapshot};

/// Stages derived from one configuration; swapped as a unit
#[derive(Debug)]
struct Pipeline {
    config: GuardConfig,
    profile: PowerProfile,
    decay: DecayModel,
    limiter: RateLimiter,
    dedup: Deduplicator,
    aggregator: SignalAggregator,
}

impl Pipeline {
    fn build(config: GuardConfig) -> Self {
        let dedup = DedupParams {
            enabled: config.dedup_active(),
            ..config.dedup.clone()
        };
        Self {
            profile: config.profile(),
            decay: DecayModel::from_config(&config),
            limiter: RateLimiter::from_params(&config.rate_limit),
            dedup: Deduplicator::from_params(&dedup),
            aggregator: SignalAggregator::new(
                config.weights.clone(),
                config.thresholds.trigger_floor,
            ),
            config,
        }
    }
}

/// Serializable copy of everything the guard remembers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardSnapshot {
    pub saved_at: DateTime<Utc>,
    pub senders: Vec<SenderState>,
    pub blocklist: Vec<BlocklistEntry>,
    pub allowlist: Vec<AllowlistEntry>,
}

impl GuardSnapshot {
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty() && self.blocklist.is_empty() && self.allowlist.is_empty()
    }
}

/// Result of the per-sender critical section
enum Pass {
    Done { verdict: Verdict, escalated: bool },
    Blocklisted,
}

/// Multi-stage message safety guard
pub struct SafetyGuard {
    pipeline: RwLock<Arc<Pipeline>>,
    classifier: LexicalClassifier,
    store: DecayStore,
    blocklist: Blocklist,
    allowlist: Allowlist,
    stats: GuardStats,
}

impl SafetyGuard {
    /// Create a guard with the built-in language tables
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        let classifier = LexicalClassifier::new(config.max_text_len);
        Self::with_classifier(config, classifier)
    }

    /// Create a guard with a custom classifier
    pub fn with_classifier(
        config: GuardConfig,
        classifier: LexicalClassifier,
    ) -> Result<Self, GuardError> {
        config.validate()?;
        Ok(Self {
            pipeline: RwLock::new(Arc::new(Pipeline::build(config))),
            classifier,
            store: DecayStore::new(),
            blocklist: Blocklist::new(),
            allowlist: Allowlist::new(),
            stats: GuardStats::default(),
        })
    }

    fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.read().clone()
    }

    /// Current configuration
    pub fn config(&self) -> GuardConfig {
        self.pipeline().config.clone()
    }

    /// Run one message through the pipeline.
    ///
    /// Only malformed messages are errors; BLOCK and FLAG are ordinary verdicts.
    pub fn process(&self, message: &Message) -> Result<Verdict, GuardError> {
        message.validate()?;
        let pipeline = self.pipeline();
        let sender_id = message.sender_id.as_str();

        if let Some(entry) = self.blocklist.record_attempt(sender_id) {
            let verdict = self.blocklisted_verdict(message, &entry, &pipeline);
            self.stats.record(&verdict);
            return Ok(verdict);
        }

        let fp = pipeline.dedup.enabled().then(|| fingerprint(&message.text));
        let trusted = self.allowlist.contains(sender_id);
        let thresholds = &pipeline.config.thresholds;

        let pass = self.store.with_sender(
            sender_id,
            || fresh_state(sender_id, message.timestamp, &pipeline.config),
            |state| {
                // an escalation may have landed while we waited for the lock
                if self.blocklist.contains(sender_id) {
                    return Pass::Blocklisted;
                }

                let elapsed = state.advance_clock(message.timestamp);
                if pipeline.decay.forget(state, elapsed) {
                    debug!(sender = %sender_id, elapsed, "idle decay applied");
                }
                pipeline.limiter.refill(state, elapsed);
                state.message_count += 1;

                if !trusted && !pipeline.limiter.try_acquire(state) {
                    debug!(sender = %sender_id, "rate limited");
                    state.flagged_count += 1;
                    return Pass::Done {
                        verdict: short_circuit(message, Reason::RateLimited, state, thresholds),
                        escalated: false,
                    };
                }

                if let Some(fp) = &fp {
                    if pipeline.dedup.check_and_record(state, fp, message.timestamp) {
                        debug!(sender = %sender_id, fingerprint = %fp, "duplicate");
                        state.flagged_count += 1;
                        return Pass::Done {
                            verdict: short_circuit(message, Reason::Duplicate, state, thresholds),
                            escalated: false,
                        };
                    }
                }

                let scores = self.analyze(message, &pipeline);
                let signal = pipeline.aggregator.aggregate(&scores);
                pipeline.decay.absorb(state, signal);

                let (action, reasons) = decide(
                    thresholds,
                    message.direction,
                    state.risk_score,
                    pipeline.profile.reputation.then_some(state.reputation),
                    &scores,
                );
                if action != Action::Allow {
                    state.flagged_count += 1;
                }

                let mut escalated = false;
                if action == Action::Block {
                    let reason = format!(
                        "{} risk {:.3} reached block threshold",
                        message.direction, state.risk_score
                    );
                    escalated = self.blocklist.add(sender_id, &reason, BlockSource::Escalation);
                    self.allowlist.remove(sender_id);
                }

                debug!(
                    sender = %sender_id,
                    direction = %message.direction,
                    signal,
                    risk = state.risk_score,
                    reputation = state.reputation,
                    action = %action,
                    "classified"
                );

                Pass::Done {
                    verdict: Verdict {
                        action,
                        risk_score: state.risk_score,
                        signal,
                        reasons,
                        direction: message.direction,
                        sender: Some(state.snapshot(thresholds.reputation_floor)),
                    },
                    escalated,
                }
            },
        );

        let verdict = match pass {
            Pass::Done { verdict, escalated } => {
                if escalated {
                    self.stats.record_escalation();
                    info!(
                        sender = %sender_id,
                        risk = verdict.risk_score,
                        "sender automatically blocklisted"
                    );
                }
                verdict
            }
            Pass::Blocklisted => match self.blocklist.record_attempt(sender_id) {
                Some(entry) => self.blocklisted_verdict(message, &entry, &pipeline),
                None => {
                    // removed again in between; treat as a fresh attempt
                    return self.process(message);
                }
            },
        };

        self.stats.record(&verdict);
        Ok(verdict)
    }

    /// Full table scoring, or the quick check alone when the power mode
    /// sheds full analysis and the message looks harmless
    fn analyze(&self, message: &Message, pipeline: &Pipeline) -> SignalScores {
        if !pipeline.profile.full_analysis {
            let quick = self.classifier.quick_check(&message.text);
            if quick.score <= pipeline.config.power.quick_check_floor {
                debug!(
                    sender = %message.sender_id,
                    quick = quick.score,
                    "full analysis skipped"
                );
                self.stats.record_quick_skip();
                return SignalScores::new();
            }
        }
        self.stats.record_full_analysis();
        self.classifier.score(&message.text, message.language_hint)
    }

    fn blocklisted_verdict(
        &self,
        message: &Message,
        entry: &BlocklistEntry,
        pipeline: &Pipeline,
    ) -> Verdict {
        debug!(
            sender = %entry.sender_id,
            attempts = entry.attempts,
            "blocklisted sender rejected"
        );
        Verdict {
            action: Action::Block,
            risk_score: 1.0,
            signal: 0.0,
            reasons: vec![Reason::Blocklisted],
            direction: message.direction,
            sender: self
                .store
                .snapshot(&entry.sender_id, pipeline.config.thresholds.reputation_floor),
        }
    }

    /// Blocklist a sender; also drops it from the allowlist
    pub fn add_to_blocklist(&self, sender_id: &str, reason: &str) -> Result<(), GuardError> {
        let sender_id = checked_id(sender_id)?;
        self.blocklist.add(sender_id, reason, BlockSource::Operator);
        self.allowlist.remove(sender_id);
        info!(sender = %sender_id, reason = %reason, "sender blocklisted");
        Ok(())
    }

    /// Remove a sender from the blocklist and give it a fresh reputation.
    /// Returns false if it was not listed.
    pub fn remove_from_blocklist(&self, sender_id: &str) -> bool {
        let Some(entry) = self.blocklist.remove(sender_id) else {
            return false;
        };
        let initial = self.pipeline().config.decay.initial_reputation;
        self.store
            .update_existing(sender_id, |state| state.reputation = initial);
        info!(
            sender = %sender_id,
            attempts = entry.attempts,
            "sender removed from blocklist"
        );
        true
    }

    pub fn is_blocklisted(&self, sender_id: &str) -> bool {
        self.blocklist.contains(sender_id)
    }

    pub fn blocklist(&self) -> Vec<BlocklistEntry> {
        self.blocklist.entries()
    }

    /// Exempt a sender from rate limiting; lifts any blocklist entry
    pub fn trust_sender(&self, sender_id: &str, reason: &str) -> Result<(), GuardError> {
        let sender_id = checked_id(sender_id)?;
        if self.blocklist.remove(sender_id).is_some() {
            info!(sender = %sender_id, "blocklist entry lifted by trust");
        }
        self.allowlist.add(sender_id, reason);
        info!(sender = %sender_id, reason = %reason, "sender trusted");
        Ok(())
    }

    pub fn untrust_sender(&self, sender_id: &str) -> bool {
        let removed = self.allowlist.remove(sender_id);
        if removed {
            info!(sender = %sender_id, "sender no longer trusted");
        }
        removed
    }

    pub fn is_trusted(&self, sender_id: &str) -> bool {
        self.allowlist.contains(sender_id)
    }

    pub fn allowlist(&self) -> Vec<AllowlistEntry> {
        self.allowlist.entries()
    }

    /// Read-only view of a sender; never creates state
    pub fn get_sender_state(&self, sender_id: &str) -> Option<SenderSnapshot> {
        let floor = self.pipeline().config.thresholds.reputation_floor;
        self.store.snapshot(sender_id, floor)
    }

    /// Replace weights, thresholds and rate limits in one step.
    ///
    /// Messages already in flight finish with the previous values.
    pub fn configure(
        &self,
        weights: CategoryWeights,
        thresholds: Thresholds,
        rate_limit: RateLimitParams,
    ) -> Result<(), GuardError> {
        let mut current = self.pipeline.write();
        let mut candidate = current.config.clone();
        candidate.weights = weights;
        candidate.thresholds = thresholds;
        candidate.rate_limit = rate_limit;

        if let Err(e) = candidate.validate() {
            warn!(error = %e, "configuration rejected");
            return Err(e);
        }

        *current = Arc::new(Pipeline::build(candidate));
        info!("configuration updated");
        Ok(())
    }

    pub fn power_mode(&self) -> PowerMode {
        self.pipeline().profile.mode
    }

    pub fn power_profile(&self) -> PowerProfile {
        self.pipeline().profile
    }

    /// Switch power mode; stages are rebuilt and in-flight messages keep the old ones
    pub fn set_power_mode(&self, mode: PowerMode) {
        let mut current = self.pipeline.write();
        if current.profile.mode == mode {
            return;
        }
        let mut config = current.config.clone();
        config.power.mode = mode;
        *current = Arc::new(Pipeline::build(config));
        info!(mode = %mode, "power mode switched");
    }

    pub fn stats(&self) -> StatsSnapshot {
        let pipeline = self.pipeline();
        let floor = pipeline.config.thresholds.reputation_floor;
        StatsSnapshot {
            power_mode: pipeline.profile.mode,
            counters: self.stats.counters(),
            tracked_senders: self.store.len(),
            blocklisted_senders: self.blocklist.len(),
            trusted_senders: self.allowlist.len(),
            reputation: ReputationDistribution::from_counts(&self.store.level_counts(floor)),
        }
    }

    pub fn export_state(&self) -> GuardSnapshot {
        GuardSnapshot {
            saved_at: Utc::now(),
            senders: self.store.export(),
            blocklist: self.blocklist.entries(),
            allowlist: self.allowlist.entries(),
        }
    }

    /// Merge a snapshot into the live state; imported records win
    pub fn import_state(&self, snapshot: GuardSnapshot) -> usize {
        let imported = self.store.import(snapshot.senders);
        self.blocklist.import(snapshot.blocklist);
        self.allowlist.import(snapshot.allowlist);
        info!(
            senders = imported,
            blocklisted = self.blocklist.len(),
            trusted = self.allowlist.len(),
            "state imported"
        );
        imported
    }
}

fn checked_id(sender_id: &str) -> Result<&str, GuardError> {
    let trimmed = sender_id.trim();
    if trimmed.is_empty() {
        return Err(GuardError::InvalidMessage("empty sender id".to_string()));
    }
    Ok(trimmed)
}

fn short_circuit(
    message: &Message,
    reason: Reason,
    state: &SenderState,
    thresholds: &Thresholds,
) -> Verdict {
    Verdict {
        action: Action::Flag,
        risk_score: state.risk_score,
        signal: 0.0,
        reasons: vec![reason],
        direction: message.direction,
        sender: Some(state.snapshot(thresholds.reputation_floor)),
    }
}

/// Map post-update risk and reputation to an action.
///
/// `reputation` is None when the power mode does not track it.
fn decide(
    thresholds: &Thresholds,
    direction: Direction,
    risk: f64,
    reputation: Option<f64>,
    scores: &SignalScores,
) -> (Action, Vec<Reason>) {
    let action = if risk >= thresholds.block_threshold(direction) {
        Action::Block
    } else if risk >= thresholds.alert_low {
        Action::Flag
    } else {
        Action::Allow
    };

    if action == Action::Allow {
        let low = reputation.is_some_and(|rep| {
            ReputationLevel::from_reputation(rep, thresholds.reputation_floor)
                == ReputationLevel::Low
        });
        if low {
            return (Action::Flag, vec![Reason::LowReputation]);
        }
        return (Action::Allow, Vec::new());
    }

    let mut reasons: Vec<Reason> = scores
        .triggered(thresholds.trigger_floor)
        .into_iter()
        .map(Reason::from)
        .collect();
    if reasons.is_empty() {
        reasons.push(Reason::ElevatedRisk);
    }
    (action, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use meshguard_core::{Language, ALERT_HIGH, ALERT_LOW, GAMMA};

    fn guard() -> SafetyGuard {
        SafetyGuard::new(GuardConfig::default()).unwrap()
    }

    fn msg(sender: &str, text: &str, at: DateTime<Utc>) -> Message {
        Message::builder(sender, text).timestamp(at).build().unwrap()
    }

    fn attack(i: usize) -> String {
        format!("URGENTE! Envía el pago ahora, ganancia garantizada (lote {})", i)
    }

    #[test]
    fn test_inventory_message_is_allowed() {
        let g = guard();
        let v = g
            .process(&msg("farm-01", "Disponible: A1:100, B1:50", Utc::now()))
            .unwrap();
        assert_eq!(v.action, Action::Allow);
        assert!(v.reasons.is_empty());
        assert!(v.risk_score <= ALERT_LOW);
    }

    #[test]
    fn test_empty_sender_rejected() {
        let g = guard();
        let m = Message {
            sender_id: "   ".to_string(),
            direction: Direction::Inbound,
            text: "hola".to_string(),
            language_hint: None,
            timestamp: Utc::now(),
        };
        assert!(matches!(g.process(&m), Err(GuardError::InvalidMessage(_))));
        assert!(g.get_sender_state("   ").is_none());
    }

    #[test]
    fn test_escalation_to_block_and_blocklist() {
        let g = guard();
        let t0 = Utc::now();
        let mut first_block = None;

        for i in 0..10 {
            let at = t0 + Duration::seconds(10 * i as i64);
            let v = g.process(&msg("attacker", &attack(i), at)).unwrap();
            if v.is_blocked() && first_block.is_none() {
                first_block = Some(i);
                assert!(v.has_reason(Reason::Scam));
                assert!(v.has_reason(Reason::UrgencyAbuse));
                assert!(v.risk_score >= ALERT_HIGH);
            }
            if let Some(n) = first_block {
                if i > n {
                    assert!(v.has_reason(Reason::Blocklisted));
                    assert_eq!(v.risk_score, 1.0);
                }
            }
        }

        assert!(first_block.unwrap() < 3);
        assert!(g.is_blocklisted("attacker"));
        let entry = &g.blocklist()[0];
        assert_eq!(entry.source, BlockSource::Escalation);
        assert!(entry.attempts > 0);
        assert_eq!(g.stats().counters.escalations, 1);
    }

    #[test]
    fn test_outbound_is_stricter() {
        let g = guard();
        let text = "Envía el pago por adelantado, ganancia garantizada";
        let now = Utc::now();

        let inbound = g.process(&msg("peer-9", text, now)).unwrap();
        let outbound = g
            .process(
                &Message::builder("self", text)
                    .outbound()
                    .timestamp(now)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(inbound.action, Action::Flag);
        assert_eq!(outbound.action, Action::Block);
        assert!((inbound.risk_score - outbound.risk_score).abs() < 1e-12);
        assert!(g.is_blocklisted("self"));
    }

    #[test]
    fn test_duplicate_within_window() {
        let g = guard();
        let t0 = Utc::now();
        let text = "Tenemos 20 kg de maíz";
        assert_eq!(g.process(&msg("farm-02", text, t0)).unwrap().action, Action::Allow);
        let second = g
            .process(&msg("farm-02", "tenemos 20 KG de maíz!", t0 + Duration::seconds(5)))
            .unwrap();
        assert_eq!(second.action, Action::Flag);
        assert_eq!(second.reasons, vec![Reason::Duplicate]);
    }

    #[test]
    fn test_duplicate_after_window_is_allowed() {
        let g = guard();
        let t0 = Utc::now();
        let text = "Tenemos 20 kg de maíz";
        assert_eq!(g.process(&msg("farm-02", text, t0)).unwrap().action, Action::Allow);
        let later = t0 + Duration::seconds(301);
        assert_eq!(g.process(&msg("farm-02", text, later)).unwrap().action, Action::Allow);
    }

    #[test]
    fn test_rate_limit_after_capacity() {
        let g = guard();
        let now = Utc::now();
        for i in 0..5 {
            let text = format!("Inventario lote {}: maíz {} kg", i, 10 * i);
            assert_eq!(g.process(&msg("farm-03", &text, now)).unwrap().action, Action::Allow);
        }
        let v = g.process(&msg("farm-03", "Inventario lote 9", now)).unwrap();
        assert_eq!(v.action, Action::Flag);
        assert_eq!(v.reasons, vec![Reason::RateLimited]);

        let snap = g.get_sender_state("farm-03").unwrap();
        assert_eq!(snap.message_count, 6);
        assert_eq!(snap.token_bucket_level, 0.0);

        // three seconds buys one more token
        let later = now + Duration::seconds(3);
        let v = g.process(&msg("farm-03", "Inventario lote 10", later)).unwrap();
        assert_eq!(v.action, Action::Allow);
    }

    #[test]
    fn test_trusted_sender_skips_rate_limit() {
        let g = guard();
        g.trust_sender("coop-radio", "cooperative relay").unwrap();
        let now = Utc::now();
        for i in 0..12 {
            let text = format!("Parte diario {}: lluvia {} mm", i, i);
            assert_eq!(g.process(&msg("coop-radio", &text, now)).unwrap().action, Action::Allow);
        }
    }

    #[test]
    fn test_blocklisted_sender_does_not_mutate_state() {
        let g = guard();
        let now = Utc::now();
        g.process(&msg("node-5", "Disponible: frijol 30 kg", now)).unwrap();
        let before = g.get_sender_state("node-5").unwrap();

        g.add_to_blocklist("node-5", "operator decision").unwrap();
        for i in 0..3 {
            let text = format!("Disponible: arroz {} kg", i);
            let v = g.process(&msg("node-5", &text, now + Duration::seconds(i))).unwrap();
            assert_eq!(v.action, Action::Block);
            assert_eq!(v.reasons, vec![Reason::Blocklisted]);
            assert_eq!(v.risk_score, 1.0);
        }

        assert_eq!(g.get_sender_state("node-5").unwrap(), before);
        assert_eq!(g.blocklist()[0].attempts, 3);

        // never-seen senders are not materialized
        g.add_to_blocklist("ghost", "known bad").unwrap();
        let v = g.process(&msg("ghost", "hola", now)).unwrap();
        assert!(v.sender.is_none());
        assert!(g.get_sender_state("ghost").is_none());
    }

    #[test]
    fn test_unblock_resets_reputation() {
        let g = guard();
        let now = Utc::now();
        g.process(&msg("attacker", &attack(0), now)).unwrap();
        g.process(&msg("attacker", &attack(1), now + Duration::seconds(10)))
            .unwrap();
        assert!(g.is_blocklisted("attacker"));
        assert!(g.get_sender_state("attacker").unwrap().reputation < 0.2);

        assert!(g.remove_from_blocklist("attacker"));
        assert!(!g.remove_from_blocklist("attacker"));
        let snap = g.get_sender_state("attacker").unwrap();
        assert_eq!(snap.reputation, 0.5);
        // risk memory survives the unblock
        assert!(snap.risk_score >= ALERT_HIGH);
    }

    #[test]
    fn test_low_reputation_escalates_allow() {
        let g = guard();
        let now = Utc::now();
        let mut state = fresh_state("shady", now, &GuardConfig::default());
        state.reputation = 0.1;
        g.import_state(GuardSnapshot {
            senders: vec![state],
            ..GuardSnapshot::default()
        });

        let v = g
            .process(&msg("shady", "Disponible: A1:100", now + Duration::seconds(1)))
            .unwrap();
        assert_eq!(v.action, Action::Flag);
        assert_eq!(v.reasons, vec![Reason::LowReputation]);
    }

    #[test]
    fn test_risk_decays_toward_baseline_over_clean_messages() {
        let g = guard();
        let t0 = Utc::now();
        g.process(&msg("node-8", "Envía el pago por adelantado, ganancia garantizada", t0))
            .unwrap();
        let mut previous = g.get_sender_state("node-8").unwrap().risk_score;

        for i in 1..60 {
            let at = t0 + Duration::seconds(20 * i);
            let text = format!("Reporte {}: sin novedad en la parcela {}", i, i);
            g.process(&msg("node-8", &text, at)).unwrap();
            let risk = g.get_sender_state("node-8").unwrap().risk_score;
            assert!(risk <= previous);
            assert!(risk >= GAMMA);
            previous = risk;
        }
        assert!(previous < 0.11);
    }

    #[test]
    fn test_hint_restricts_tables() {
        let g = guard();
        let now = Utc::now();
        let text = "Sou do governo, obedeça";
        let hinted = g
            .process(
                &Message::builder("a", text)
                    .language(Language::English)
                    .timestamp(now)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let auto = g.process(&msg("b", text, now)).unwrap();
        assert!(auto.signal > hinted.signal);
    }

    #[test]
    fn test_configure_is_validated_and_applied() {
        let g = guard();
        let bad = Thresholds {
            alert_low: 0.9,
            alert_high: 0.5,
            ..Thresholds::default()
        };
        assert!(matches!(
            g.configure(CategoryWeights::default(), bad, RateLimitParams::default()),
            Err(GuardError::Configuration(_))
        ));
        assert_eq!(g.config(), GuardConfig::default());

        let tight = RateLimitParams {
            capacity: 2.0,
            ..RateLimitParams::default()
        };
        g.configure(CategoryWeights::default(), Thresholds::default(), tight)
            .unwrap();
        let now = Utc::now();
        let actions: Vec<Action> = (0..3)
            .map(|i| {
                let text = format!("Inventario {}", i);
                g.process(&msg("farm-04", &text, now)).unwrap().action
            })
            .collect();
        assert_eq!(actions, vec![Action::Allow, Action::Allow, Action::Flag]);
    }

    #[test]
    fn test_trust_and_block_are_exclusive() {
        let g = guard();
        g.add_to_blocklist("node-x", "noise").unwrap();
        g.trust_sender("node-x", "verified in person").unwrap();
        assert!(!g.is_blocklisted("node-x"));
        assert!(g.is_trusted("node-x"));

        g.add_to_blocklist("node-x", "relapsed").unwrap();
        assert!(!g.is_trusted("node-x"));
        assert!(g.add_to_blocklist("  ", "x").is_err());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let g = guard();
        let now = Utc::now();
        g.process(&msg("farm-01", "Disponible: A1:100", now)).unwrap();
        g.add_to_blocklist("bad", "scam").unwrap();
        g.trust_sender("coop", "relay").unwrap();

        let snapshot = g.export_state();
        let restored = guard();
        assert_eq!(restored.import_state(snapshot), 1);
        assert_eq!(
            restored.get_sender_state("farm-01"),
            g.get_sender_state("farm-01")
        );
        assert!(restored.is_blocklisted("bad"));
        assert!(restored.is_trusted("coop"));
    }

    #[test]
    fn test_stats_distribution() {
        let g = guard();
        let now = Utc::now();
        g.process(&msg("farm-01", "Disponible: A1:100", now)).unwrap();
        g.process(&msg("attacker", &attack(0), now)).unwrap();

        let stats = g.stats();
        assert_eq!(stats.counters.processed, 2);
        assert_eq!(stats.counters.allowed, 1);
        assert_eq!(stats.counters.blocked, 1);
        assert_eq!(stats.tracked_senders, 2);
        assert_eq!(stats.blocklisted_senders, 1);
        assert_eq!(stats.reputation.normal, 1);
        assert_eq!(stats.reputation.low, 1);
    }

    #[test]
    fn test_everyday_farm_wording_is_allowed() {
        let g = guard();
        let t0 = Utc::now();
        let everyday = [
            "Maiz disponible ahora, 20 kg",
            "Oferta de semillas en la cooperativa",
            "Free seeds at the coop on Saturday",
            "Milho disponível agora na feira",
            "Reunión con el ministerio de agricultura el lunes",
            "Descuento en fertilizante esta semana",
            "We can pick up the harvest now",
            "MAIZ Y FRIJOL DISPONIBLE",
        ];
        for (i, text) in everyday.iter().enumerate() {
            let v = g.process(&msg(&format!("farm-{:02}", i), text, t0)).unwrap();
            assert_eq!(v.action, Action::Allow, "{}: {:?}", text, v);
            assert_eq!(v.signal, 0.0);
        }

        // the farm that said "ahora" keeps relaying cleanly
        for i in 1..=50 {
            let at = t0 + Duration::seconds(60 * i);
            let text = format!("INV: A1:{}, B1:{}", i, 2 * i);
            let v = g.process(&msg("farm-00", &text, at)).unwrap();
            assert_eq!(v.action, Action::Allow);
        }
        let later = t0 + Duration::days(30);
        let v = g.process(&msg("farm-00", "INV: A1:7", later)).unwrap();
        assert_eq!(v.action, Action::Allow);
        assert!(v.risk_score < ALERT_LOW);
    }

    #[test]
    fn test_lingering_risk_is_explained() {
        let g = guard();
        let t0 = Utc::now();
        let first = g
            .process(&msg("node-3", "Envía el pago por adelantado, ganancia garantizada", t0))
            .unwrap();
        assert_eq!(first.action, Action::Flag);
        assert_eq!(first.reasons, vec![Reason::Scam]);

        let next = g
            .process(&msg("node-3", "Reporte: sin novedad", t0 + Duration::seconds(30)))
            .unwrap();
        assert_eq!(next.action, Action::Flag);
        assert_eq!(next.signal, 0.0);
        assert_eq!(next.reasons, vec![Reason::ElevatedRisk]);
    }

    fn guard_in(mode: PowerMode) -> SafetyGuard {
        let mut config = GuardConfig::default();
        config.power.mode = mode;
        SafetyGuard::new(config).unwrap()
    }

    /// Scores every English-table match as certain scam
    struct Alarmist;

    impl meshguard_core::LanguageClassifier for Alarmist {
        fn language(&self) -> Language {
            Language::English
        }

        fn score(&self, _text: &str) -> SignalScores {
            SignalScores::new().with(meshguard_core::SignalCategory::Scam, 1.0)
        }
    }

    fn alarmist_guard(mode: PowerMode) -> SafetyGuard {
        let mut config = GuardConfig::default();
        config.power.mode = mode;
        let mut classifier = LexicalClassifier::new(config.max_text_len);
        classifier.register(Box::new(Alarmist));
        SafetyGuard::with_classifier(config, classifier).unwrap()
    }

    #[test]
    fn test_quick_check_gates_full_analysis() {
        let now = Utc::now();
        let text = "Maiz disponible en la parcela 4";

        let full = alarmist_guard(PowerMode::Full);
        assert_eq!(full.process(&msg("farm-01", text, now)).unwrap().action, Action::Block);
        assert_eq!(full.stats().counters.full_analyses, 1);

        let low = alarmist_guard(PowerMode::LowPower);
        let v = low.process(&msg("farm-01", text, now)).unwrap();
        assert_eq!(v.action, Action::Allow);
        assert_eq!(v.signal, 0.0);
        let counters = low.stats().counters;
        assert_eq!(counters.quick_skips, 1);
        assert_eq!(counters.full_analyses, 0);
    }

    #[test]
    fn test_quick_check_passes_hostile_text_on() {
        let g = guard_in(PowerMode::UltraLow);
        let v = g.process(&msg("attacker", &attack(0), Utc::now())).unwrap();
        assert_eq!(v.action, Action::Block);
        assert_eq!(g.stats().counters.full_analyses, 1);
        assert!(g.is_blocklisted("attacker"));
    }

    #[test]
    fn test_ultra_low_skips_dedup() {
        let g = guard_in(PowerMode::UltraLow);
        let t0 = Utc::now();
        let text = "Tenemos 20 kg de maíz";
        for i in 0..3 {
            let v = g.process(&msg("farm-02", text, t0 + Duration::seconds(5 * i))).unwrap();
            assert_eq!(v.action, Action::Allow);
        }
        assert_eq!(g.get_sender_state("farm-02").unwrap().tracked_fingerprints, 0);
        assert_eq!(g.stats().counters.duplicates, 0);

        let low = guard_in(PowerMode::LowPower);
        low.process(&msg("farm-02", text, t0)).unwrap();
        let v = low.process(&msg("farm-02", text, t0 + Duration::seconds(5))).unwrap();
        assert_eq!(v.reasons, vec![Reason::Duplicate]);
    }

    #[test]
    fn test_low_power_drops_reputation_stage() {
        let g = guard_in(PowerMode::LowPower);
        let now = Utc::now();
        let mut state = fresh_state("shady", now, &GuardConfig::default());
        state.reputation = 0.1;
        g.import_state(GuardSnapshot {
            senders: vec![state],
            ..GuardSnapshot::default()
        });

        let v = g
            .process(&msg("shady", "Disponible: A1:100", now + Duration::seconds(1)))
            .unwrap();
        assert_eq!(v.action, Action::Allow);
        assert_eq!(g.get_sender_state("shady").unwrap().reputation, 0.1);
    }

    #[test]
    fn test_set_power_mode_rebuilds_stages() {
        let g = guard();
        assert_eq!(g.power_mode(), PowerMode::Balanced);
        g.set_power_mode(PowerMode::UltraLow);
        assert_eq!(g.power_mode(), PowerMode::UltraLow);
        assert!(!g.power_profile().dedup);
        assert_eq!(g.config().power.mode, PowerMode::UltraLow);
        assert_eq!(g.stats().power_mode, PowerMode::UltraLow);

        // reconfiguring keeps the mode
        g.configure(
            CategoryWeights::default(),
            Thresholds::default(),
            RateLimitParams::default(),
        )
        .unwrap();
        assert_eq!(g.power_mode(), PowerMode::UltraLow);
    }

    #[test]
    fn test_concurrent_same_sender() {
        let g = guard();
        let now = Utc::now();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let g = &g;
                scope.spawn(move || {
                    for i in 0..10 {
                        let text = format!("Lectura {} del sensor {}", i, t);
                        g.process(&msg("relay-hub", &text, now)).unwrap();
                    }
                });
            }
        });

        let snap = g.get_sender_state("relay-hub").unwrap();
        assert_eq!(snap.message_count, 80);
        let stats = g.stats();
        assert_eq!(stats.counters.allowed, 5);
        assert_eq!(stats.counters.rate_limited, 75);
    }
}
