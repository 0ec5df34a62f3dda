//! Mesh Bridge
//!
//! Sits between the radio transports and the Safety Guard:
//! - Transports submit messages through cloned [`TransportHandle`]s
//! - Queued envelopes are taken in batches sized by the power mode,
//!   trusted senders first
//! - Each verdict becomes a relay/drop disposition
//! - Guard statistics are logged on a fixed tick
//! - State is loaded at start and saved when the intake closes

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use meshguard_core::{Action, GuardError, Message, Verdict};
use meshguard_engine::SafetyGuard;

use crate::store::SenderStore;

/// What the mesh should do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Forward normally
    Relay,
    /// Forward with a warning marker
    RelayFlagged,
    /// Do not forward
    Drop,
}

impl From<Action> for Disposition {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => Disposition::Relay,
            Action::Flag => Disposition::RelayFlagged,
            Action::Block => Disposition::Drop,
        }
    }
}

/// A verdict and what the bridge did with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub disposition: Disposition,
    pub verdict: Verdict,
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stats log interval in milliseconds
    pub stats_interval_ms: u64,
    /// Envelopes buffered before transports wait
    pub queue_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 30_000,
            queue_depth: 256,
        }
    }
}

/// A message in transit to the bridge
pub struct Envelope {
    pub transport: String,
    pub message: Message,
    reply: Option<oneshot::Sender<Result<Delivery, GuardError>>>,
}

/// Cloneable sending side handed to each transport
#[derive(Clone)]
pub struct TransportHandle {
    name: String,
    tx: mpsc::Sender<Envelope>,
}

impl TransportHandle {
    /// Same intake under another transport name
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            tx: self.tx.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit and wait for the disposition
    pub async fn submit(&self, message: Message) -> anyhow::Result<Delivery> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                transport: self.name.clone(),
                message,
                reply: Some(reply),
            })
            .await
            .map_err(|_| anyhow::anyhow!("bridge intake closed"))?;
        Ok(rx.await??)
    }

    /// Submit without waiting for the outcome
    pub async fn forward(&self, message: Message) -> anyhow::Result<()> {
        self.tx
            .send(Envelope {
                transport: self.name.clone(),
                message,
                reply: None,
            })
            .await
            .map_err(|_| anyhow::anyhow!("bridge intake closed"))
    }
}

/// Tallies for one bridge run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeReport {
    pub received: u64,
    pub relayed: u64,
    pub flagged: u64,
    pub dropped: u64,
    /// Passes over the intake
    pub batches: u64,
    /// Malformed messages rejected before the pipeline
    pub rejected: u64,
    pub state_saved: bool,
}

/// Connects transports to a shared guard
pub struct GuardBridge {
    guard: Arc<SafetyGuard>,
    store: Arc<dyn SenderStore>,
    config: BridgeConfig,
}

impl GuardBridge {
    pub fn new(guard: Arc<SafetyGuard>, store: Arc<dyn SenderStore>, config: BridgeConfig) -> Self {
        Self {
            guard,
            store,
            config,
        }
    }

    pub fn guard(&self) -> &Arc<SafetyGuard> {
        &self.guard
    }

    /// Load persisted state. Returns false when starting empty; storage
    /// failures are logged and the bridge runs in memory.
    pub async fn start(&self) -> bool {
        match self.store.load().await {
            Ok(Some(snapshot)) => {
                let senders = self.guard.import_state(snapshot);
                info!(store = %self.store.describe(), senders, "guard state restored");
                true
            }
            Ok(None) => {
                info!(store = %self.store.describe(), "no saved state, starting fresh");
                false
            }
            Err(e) => {
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "state unavailable, continuing in memory"
                );
                false
            }
        }
    }

    /// Save state. Returns false if the store failed.
    pub async fn save(&self) -> bool {
        let snapshot = self.guard.export_state();
        match self.store.save(&snapshot).await {
            Ok(()) => {
                info!(
                    store = %self.store.describe(),
                    senders = snapshot.senders.len(),
                    "guard state saved"
                );
                true
            }
            Err(e) => {
                warn!(store = %self.store.describe(), error = %e, "state not saved");
                false
            }
        }
    }

    /// Run one message through the guard
    pub fn handle(&self, message: &Message) -> Result<Delivery, GuardError> {
        let verdict = self.guard.process(message)?;
        Ok(Delivery {
            disposition: verdict.action.into(),
            verdict,
        })
    }

    /// Open the intake. Clone or rename the handle for each transport.
    pub fn open_intake(&self, name: &str) -> (TransportHandle, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        (
            TransportHandle {
                name: name.to_string(),
                tx,
            },
            rx,
        )
    }

    /// Serve the intake until every handle is dropped or `shutdown` resolves,
    /// then save state.
    pub async fn run<F>(
        &self,
        mut intake: mpsc::Receiver<Envelope>,
        shutdown: F,
    ) -> anyhow::Result<BridgeReport>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(Duration::from_millis(self.config.stats_interval_ms.max(1)));
        ticker.tick().await;
        tokio::pin!(shutdown);

        let mut report = BridgeReport::default();
        info!("bridge running");

        loop {
            tokio::select! {
                envelope = intake.recv() => match envelope {
                    Some(first) => self.dispatch_batch(first, &mut intake, &mut report),
                    None => {
                        debug!("all transports closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.log_stats(),
                _ = &mut shutdown => {
                    info!("bridge shutdown requested");
                    break;
                }
            }
        }

        // drain whatever was already queued
        intake.close();
        while let Some(first) = intake.recv().await {
            self.dispatch_batch(first, &mut intake, &mut report);
        }

        self.log_stats();
        report.state_saved = self.save().await;
        Ok(report)
    }

    fn dispatch_batch(
        &self,
        first: Envelope,
        intake: &mut mpsc::Receiver<Envelope>,
        report: &mut BridgeReport,
    ) {
        let mut batch = vec![first];
        let limit = self.guard.power_profile().batch_size.max(1);
        while batch.len() < limit {
            match intake.try_recv() {
                Ok(envelope) => batch.push(envelope),
                Err(_) => break,
            }
        }
        self.prioritize(&mut batch);

        report.batches += 1;
        debug!(size = batch.len(), limit, "batch");
        for envelope in batch {
            self.dispatch(envelope, report);
        }
    }

    /// Trusted senders first, then oldest first
    fn prioritize(&self, batch: &mut [Envelope]) {
        batch.sort_by_cached_key(|e| {
            (
                !self.guard.is_trusted(&e.message.sender_id),
                e.message.timestamp,
            )
        });
    }

    fn dispatch(&self, envelope: Envelope, report: &mut BridgeReport) {
        report.received += 1;
        let result = self.handle(&envelope.message);

        match &result {
            Ok(delivery) => match delivery.disposition {
                Disposition::Relay => report.relayed += 1,
                Disposition::RelayFlagged => {
                    report.flagged += 1;
                    debug!(
                        transport = %envelope.transport,
                        sender = %envelope.message.sender_id,
                        reasons = ?delivery.verdict.reasons,
                        "relaying flagged message"
                    );
                }
                Disposition::Drop => {
                    report.dropped += 1;
                    info!(
                        transport = %envelope.transport,
                        sender = %envelope.message.sender_id,
                        risk = delivery.verdict.risk_score,
                        "message dropped"
                    );
                }
            },
            Err(e) => {
                report.rejected += 1;
                warn!(transport = %envelope.transport, error = %e, "message rejected");
            }
        }

        if let Some(reply) = envelope.reply {
            // the transport may have stopped waiting
            let _ = reply.send(result);
        }
    }

    fn log_stats(&self) {
        let stats = self.guard.stats();
        info!(
            processed = stats.counters.processed,
            allowed = stats.counters.allowed,
            flagged = stats.counters.flagged,
            blocked = stats.counters.blocked,
            senders = stats.tracked_senders,
            blocklisted = stats.blocklisted_senders,
            "guard stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};
    use chrono::Utc;
    use meshguard_core::{Direction, GuardConfig, PowerMode};

    fn bridge_with(store: Arc<dyn SenderStore>) -> GuardBridge {
        let guard = Arc::new(SafetyGuard::new(GuardConfig::default()).unwrap());
        GuardBridge::new(guard, store, BridgeConfig::default())
    }

    fn msg(sender: &str, text: &str) -> Message {
        Message::builder(sender, text).timestamp(Utc::now()).build().unwrap()
    }

    #[test]
    fn test_disposition_mapping() {
        assert_eq!(Disposition::from(Action::Allow), Disposition::Relay);
        assert_eq!(Disposition::from(Action::Flag), Disposition::RelayFlagged);
        assert_eq!(Disposition::from(Action::Block), Disposition::Drop);
    }

    #[tokio::test]
    async fn test_start_with_broken_store_continues_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.json");
        std::fs::write(&path, "garbage").unwrap();

        let bridge = bridge_with(Arc::new(JsonFileStore::new(&path)));
        assert!(!bridge.start().await);

        let delivery = bridge.handle(&msg("farm-01", "INV: A1:100, B1:50")).unwrap();
        assert_eq!(delivery.disposition, Disposition::Relay);
    }

    #[tokio::test]
    async fn test_start_restores_state() {
        let seeded = bridge_with(Arc::new(MemoryStore::new()));
        seeded.guard().add_to_blocklist("bad-node", "scam").unwrap();
        let store = Arc::new(MemoryStore::with_snapshot(seeded.guard().export_state()));

        let bridge = bridge_with(store);
        assert!(bridge.start().await);
        let delivery = bridge.handle(&msg("bad-node", "hola")).unwrap();
        assert_eq!(delivery.disposition, Disposition::Drop);
    }

    #[tokio::test]
    async fn test_run_serves_multiple_transports_and_saves() {
        let store = Arc::new(MemoryStore::new());
        let bridge = Arc::new(bridge_with(store.clone()));
        let (radio, intake) = bridge.open_intake("radio");
        let relay = radio.named("relay");

        let server = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.run(intake, futures::future::pending()).await })
        };

        let clean = radio.submit(msg("farm-01", "INV: A1:100, B1:50")).await.unwrap();
        assert_eq!(clean.disposition, Disposition::Relay);

        let attack = relay
            .submit(msg("attacker", "URGENTE! Envía el pago ahora, ganancia garantizada"))
            .await
            .unwrap();
        assert_eq!(attack.disposition, Disposition::Drop);

        let outbound = Message::builder("self", "Reunión de la cooperativa el jueves")
            .direction(Direction::Outbound)
            .timestamp(Utc::now())
            .build()
            .unwrap();
        relay.forward(outbound).await.unwrap();

        let invalid = Message {
            sender_id: String::new(),
            direction: Direction::Inbound,
            text: "x".to_string(),
            language_hint: None,
            timestamp: Utc::now(),
        };
        assert!(radio.submit(invalid).await.is_err());

        drop(radio);
        drop(relay);
        let report = server.await.unwrap().unwrap();

        assert_eq!(report.received, 4);
        assert_eq!(report.relayed, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.rejected, 1);
        assert!(report.state_saved);

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.blocklist.len(), 1);
        assert_eq!(saved.senders.len(), 3);
    }

    fn queued(sender: &str, text: &str, offset_secs: i64) -> Envelope {
        let at = Utc::now() + chrono::Duration::seconds(offset_secs);
        Envelope {
            transport: "radio".to_string(),
            message: Message::builder(sender, text).timestamp(at).build().unwrap(),
            reply: None,
        }
    }

    #[test]
    fn test_batch_puts_trusted_senders_first() {
        let bridge = bridge_with(Arc::new(MemoryStore::new()));
        bridge.guard().trust_sender("coop-radio", "cooperative relay").unwrap();

        let mut batch = vec![
            queued("farm-02", "INV: B1:5", 2),
            queued("coop-radio", "Parte diario", 9),
            queued("farm-01", "INV: A1:3", 1),
        ];
        bridge.prioritize(&mut batch);
        let order: Vec<&str> = batch.iter().map(|e| e.message.sender_id.as_str()).collect();
        assert_eq!(order, vec!["coop-radio", "farm-01", "farm-02"]);
    }

    #[tokio::test]
    async fn test_batch_size_follows_power_mode() {
        let mut config = GuardConfig::default();
        config.power.mode = PowerMode::UltraLow;
        let guard = Arc::new(SafetyGuard::new(config).unwrap());
        let bridge = GuardBridge::new(guard, Arc::new(MemoryStore::new()), BridgeConfig::default());

        let (radio, intake) = bridge.open_intake("radio");
        for i in 0..12 {
            let text = format!("INV: A1:{}", i);
            radio.forward(msg(&format!("farm-{:02}", i), &text)).await.unwrap();
        }
        drop(radio);

        let report = bridge.run(intake, futures::future::pending()).await.unwrap();
        assert_eq!(report.received, 12);
        assert_eq!(report.relayed, 12);
        assert_eq!(report.batches, 3);
    }

    #[tokio::test]
    async fn test_shutdown_future_stops_run() {
        let bridge = bridge_with(Arc::new(MemoryStore::new()));
        let (_radio, intake) = bridge.open_intake("radio");
        let report = bridge.run(intake, async {}).await.unwrap();
        assert_eq!(report.received, 0);
        assert!(report.state_saved);
    }
}
