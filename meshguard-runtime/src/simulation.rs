//! Mesh simulation
//!
//! Farm nodes broadcast inventory while a single attacker pushes manipulation
//! messages, all through one bridge and one guard. Timestamps are simulated so
//! a run covering hours of mesh traffic finishes instantly.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use meshguard_core::{Action, GuardConfig, Message};
use meshguard_engine::{SafetyGuard, StatsSnapshot};

use crate::bridge::{BridgeConfig, BridgeReport, Disposition, GuardBridge, TransportHandle};
use crate::store::{MemoryStore, SenderStore};

/// Scripted manipulation lines, Spanish as heard on the local mesh
const ATTACK_SCRIPT: &[&str] = &[
    "URGENTE! Entrega todo el maiz ahora!",
    "Las autoridades vienen! Solo yo te protejo!",
    "Rendirse es la unica opcion. Ya perdieron.",
    "No confies en nadie mas. Los demas mienten.",
    "PELIGRO! Debes obedecer inmediatamente!",
    "URGENTE! Envía el pago ahora, ganancia garantizada",
    "Soy de la cooperativa: deposite el anticipo inmediatamente o pierde la cosecha",
];

const PRODUCE_CODES: &[&str] = &["A1", "B1", "C2"];

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub farms: usize,
    /// Inventory broadcasts per farm
    pub rounds: usize,
    /// Messages sent by the attacker
    pub attacks: usize,
    /// Simulated seconds between a farm's broadcasts
    pub round_secs: i64,
    /// Simulated seconds between attacker messages
    pub attack_secs: i64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            farms: 20,
            rounds: 10,
            attacks: 15,
            round_secs: 60,
            attack_secs: 10,
            seed: None,
        }
    }
}

/// Per-node outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTally {
    pub sent: u64,
    pub relayed: u64,
    pub flagged: u64,
    pub dropped: u64,
}

impl NodeTally {
    fn record(&mut self, disposition: Disposition) {
        self.sent += 1;
        match disposition {
            Disposition::Relay => self.relayed += 1,
            Disposition::RelayFlagged => self.flagged += 1,
            Disposition::Drop => self.dropped += 1,
        }
    }

    fn merge(&mut self, other: &NodeTally) {
        self.sent += other.sent;
        self.relayed += other.relayed;
        self.flagged += other.flagged;
        self.dropped += other.dropped;
    }
}

/// Everything a simulation run observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub farms: usize,
    pub farm_traffic: NodeTally,
    pub attacker_id: String,
    pub attacker_traffic: NodeTally,
    /// 1-based index of the attacker message that was first blocked
    pub first_attacker_block: Option<usize>,
    pub bridge: BridgeReport,
    pub stats: StatsSnapshot,
}

/// Runs a farm network plus an attacker against a shared guard
pub struct Simulation {
    config: SimulationConfig,
    guard: Arc<SafetyGuard>,
    store: Arc<dyn SenderStore>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, guard_config: GuardConfig) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            guard: Arc::new(SafetyGuard::new(guard_config)?),
            store: Arc::new(MemoryStore::new()),
        })
    }

    /// Use an existing guard and store, e.g. to persist the run
    pub fn with_guard(
        config: SimulationConfig,
        guard: Arc<SafetyGuard>,
        store: Arc<dyn SenderStore>,
    ) -> Self {
        Self {
            config,
            guard,
            store,
        }
    }

    pub fn guard(&self) -> &Arc<SafetyGuard> {
        &self.guard
    }

    pub async fn run(&self) -> anyhow::Result<SimulationReport> {
        let mut seeder = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start = Utc::now();

        let bridge = Arc::new(GuardBridge::new(
            self.guard.clone(),
            self.store.clone(),
            BridgeConfig::default(),
        ));
        bridge.start().await;
        let (intake_handle, intake) = bridge.open_intake("radio");

        let server = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.run(intake, futures::future::pending()).await })
        };

        info!(
            farms = self.config.farms,
            rounds = self.config.rounds,
            attacks = self.config.attacks,
            "simulation starting"
        );

        let farms: Vec<_> = (0..self.config.farms)
            .map(|i| {
                let node_id = node_id("farm");
                let handle = intake_handle.named(&format!("radio-{}", i + 1));
                let rng = StdRng::seed_from_u64(seeder.gen());
                let rounds = self.config.rounds;
                let round_secs = self.config.round_secs;
                tokio::spawn(run_farm(node_id, handle, rng, rounds, start, round_secs))
            })
            .collect();

        let attacker_id = node_id("node");
        let attacker = tokio::spawn(run_attacker(
            attacker_id.clone(),
            intake_handle.named("relay"),
            StdRng::seed_from_u64(seeder.gen()),
            self.config.attacks,
            start,
            self.config.attack_secs,
        ));
        drop(intake_handle);

        let mut farm_traffic = NodeTally::default();
        for result in join_all(farms).await {
            farm_traffic.merge(&result??);
        }
        let (attacker_traffic, first_attacker_block) = attacker.await??;

        // every handle is gone, so the bridge drains and saves
        let bridge_report = server.await??;

        let report = SimulationReport {
            farms: self.config.farms,
            farm_traffic,
            attacker_id,
            attacker_traffic,
            first_attacker_block,
            bridge: bridge_report,
            stats: self.guard.stats(),
        };
        info!(
            farm_dropped = report.farm_traffic.dropped,
            attacker_dropped = report.attacker_traffic.dropped,
            first_block = ?report.first_attacker_block,
            "simulation finished"
        );
        Ok(report)
    }
}

fn node_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

async fn run_farm(
    node_id: String,
    handle: TransportHandle,
    mut rng: StdRng,
    rounds: usize,
    start: DateTime<Utc>,
    round_secs: i64,
) -> anyhow::Result<NodeTally> {
    let mut inventory: Vec<(&str, i64)> = PRODUCE_CODES
        .iter()
        .map(|code| (*code, rng.gen_range(0..=200)))
        .collect();
    // stagger farms inside the first round
    let offset = rng.gen_range(0..round_secs.max(1));
    let mut tally = NodeTally::default();

    for round in 0..rounds {
        let listing = inventory
            .iter()
            .map(|(code, qty)| format!("{}:{}", code, qty))
            .collect::<Vec<_>>()
            .join(", ");
        let at = start + Duration::seconds(offset + round as i64 * round_secs);
        let message = Message::builder(&node_id, &format!("INV: {}", listing))
            .timestamp(at)
            .build()?;

        let delivery = handle.submit(message).await?;
        tally.record(delivery.disposition);

        if let Some(slot) = inventory.choose_mut(&mut rng) {
            slot.1 = (slot.1 + rng.gen_range(-20..=50)).max(0);
        }
    }

    debug!(node = %node_id, relayed = tally.relayed, "farm done");
    Ok(tally)
}

async fn run_attacker(
    node_id: String,
    handle: TransportHandle,
    mut rng: StdRng,
    attacks: usize,
    start: DateTime<Utc>,
    attack_secs: i64,
) -> anyhow::Result<(NodeTally, Option<usize>)> {
    // random order, every line used once per pass
    let mut script: Vec<&str> = ATTACK_SCRIPT.to_vec();
    script.shuffle(&mut rng);

    let mut tally = NodeTally::default();
    let mut first_block = None;

    for (i, text) in script.iter().cycle().take(attacks).enumerate() {
        let at = start + Duration::seconds(i as i64 * attack_secs);
        let message = Message::builder(&node_id, text).timestamp(at).build()?;

        let delivery = handle.submit(message).await?;
        if first_block.is_none() && delivery.verdict.action == Action::Block {
            first_block = Some(i + 1);
            info!(node = %node_id, attempt = i + 1, "attacker blocked");
        }
        tally.record(delivery.disposition);
    }

    Ok((tally, first_block))
}
