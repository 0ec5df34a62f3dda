//! Meshguard CLI
//!
//! Operator tooling for the mesh Safety Guard: score messages, manage the
//! block and allow lists, inspect senders and run mesh simulations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use meshguard_core::{Action, Direction, GuardConfig, Language, Message, PowerMode};
use meshguard_engine::SafetyGuard;
use meshguard_runtime::{
    BridgeConfig, GuardBridge, JsonFileStore, Simulation, SimulationConfig,
};

#[derive(Parser)]
#[command(name = "meshguard")]
#[command(author, version, about = "Meshguard: message Safety Guard for offline farm meshes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Guard configuration (TOML); defaults apply when omitted
    #[arg(short, long, env = "MESHGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Persisted guard state (JSON)
    #[arg(short, long, env = "MESHGUARD_STATE", default_value = "meshguard-state.json")]
    state: PathBuf,

    /// Power mode override (full, balanced, low_power, ultra_low)
    #[arg(short, long, env = "MESHGUARD_POWER")]
    power: Option<PowerMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one message and record it in the sender's memory
    Check {
        /// Sender node id
        #[arg(short, long)]
        sender: String,

        /// Message text
        #[arg(short, long)]
        text: String,

        /// inbound or outbound
        #[arg(short, long, default_value = "inbound")]
        direction: Direction,

        /// Language hint (es, en, pt); all tables are tried when omitted
        #[arg(short, long)]
        language: Option<Language>,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Blocklist a sender
    Block {
        sender: String,

        #[arg(short, long, default_value = "operator decision")]
        reason: String,
    },

    /// Remove a sender from the blocklist
    Unblock { sender: String },

    /// Exempt a sender from rate limiting
    Trust {
        sender: String,

        #[arg(short, long, default_value = "operator decision")]
        reason: String,
    },

    /// Revoke a trust entry
    Untrust { sender: String },

    /// Show a sender's risk and reputation
    Inspect { sender: String },

    /// Show the block and allow lists
    Lists,

    /// Show guard statistics
    Stats,

    /// Print the effective configuration as TOML
    Config,

    /// Show what each power mode keeps, or pick one for a battery level
    Power {
        /// Battery level between 0 and 1
        #[arg(long)]
        battery: Option<f64>,

        /// The node is charging
        #[arg(long)]
        charging: bool,
    },

    /// Simulate farm traffic with one attacker
    Simulate {
        /// Number of farm nodes
        #[arg(long, default_value = "20")]
        farms: usize,

        /// Inventory broadcasts per farm
        #[arg(long, default_value = "10")]
        rounds: usize,

        /// Attacker messages
        #[arg(long, default_value = "15")]
        attacks: usize,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Save the resulting guard state to --state
        #[arg(long)]
        persist: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut guard_config = match &cli.config {
        Some(path) => GuardConfig::load(path)?,
        None => GuardConfig::default(),
    };
    if let Some(mode) = cli.power {
        guard_config.power.mode = mode;
    }

    match cli.command {
        Commands::Check {
            sender,
            text,
            direction,
            language,
            json,
        } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            let mut builder = Message::builder(&sender, &text)
                .direction(direction)
                .timestamp(Utc::now());
            if let Some(language) = language {
                builder = builder.language(language);
            }
            let delivery = bridge.handle(&builder.build()?)?;
            bridge.save().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&delivery)?);
            } else {
                let verdict = &delivery.verdict;
                let icon = match verdict.action {
                    Action::Allow => "✅",
                    Action::Flag => "⚠️ ",
                    Action::Block => "⛔",
                };
                println!("{} {} ({:?})", icon, verdict.action, delivery.disposition);
                println!("   Risk: {:.3} | Signal: {:.3}", verdict.risk_score, verdict.signal);
                if !verdict.reasons.is_empty() {
                    let reasons: Vec<&str> = verdict.reasons.iter().map(|r| r.as_str()).collect();
                    println!("   Reasons: {}", reasons.join(", "));
                }
                if let Some(sender) = &verdict.sender {
                    println!(
                        "   Reputation: {:.3} ({}) | Messages: {}",
                        sender.reputation, sender.level, sender.message_count
                    );
                }
            }
        }
        Commands::Block { sender, reason } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            bridge.guard().add_to_blocklist(&sender, &reason)?;
            bridge.save().await;
            println!("⛔ {} blocklisted: {}", sender, reason);
        }
        Commands::Unblock { sender } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            if bridge.guard().remove_from_blocklist(&sender) {
                bridge.save().await;
                println!("✅ {} removed from blocklist (reputation reset)", sender);
            } else {
                println!("{} is not blocklisted", sender);
            }
        }
        Commands::Trust { sender, reason } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            bridge.guard().trust_sender(&sender, &reason)?;
            bridge.save().await;
            println!("🤝 {} trusted: {}", sender, reason);
        }
        Commands::Untrust { sender } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            if bridge.guard().untrust_sender(&sender) {
                bridge.save().await;
                println!("{} is no longer trusted", sender);
            } else {
                println!("{} was not trusted", sender);
            }
        }
        Commands::Inspect { sender } => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            match bridge.guard().get_sender_state(&sender) {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("No state recorded for {}", sender),
            }
            if bridge.guard().is_blocklisted(&sender) {
                println!("⛔ blocklisted");
            }
            if bridge.guard().is_trusted(&sender) {
                println!("🤝 trusted");
            }
        }
        Commands::Lists => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            let guard = bridge.guard();

            println!("⛔ Blocklist ({}):", guard.blocklist().len());
            for entry in guard.blocklist() {
                println!(
                    "   {} [{:?}] {} | attempts: {} | since {}",
                    entry.sender_id,
                    entry.source,
                    entry.reason,
                    entry.attempts,
                    entry.added_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("🤝 Allowlist ({}):", guard.allowlist().len());
            for entry in guard.allowlist() {
                println!("   {} {}", entry.sender_id, entry.reason);
            }
        }
        Commands::Stats => {
            let bridge = open_bridge(guard_config, &cli.state).await?;
            println!("{}", serde_json::to_string_pretty(&bridge.guard().stats())?);
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&guard_config)?);
        }
        Commands::Power { battery, charging } => {
            println!("🔋 Power modes (configured: {})", guard_config.power.mode);
            for mode in PowerMode::ALL {
                let p = mode.profile();
                println!(
                    "   {:<10} batch {:>2} | reputation {} | dedup {} | full analysis {}",
                    mode.as_str(),
                    p.batch_size,
                    on_off(p.reputation),
                    on_off(p.dedup),
                    on_off(p.full_analysis)
                );
            }
            if let Some(level) = battery {
                let mode = PowerMode::for_battery(level.clamp(0.0, 1.0), charging);
                println!("\n   Battery {:.0}% → {}", level * 100.0, mode);
            }
        }
        Commands::Simulate {
            farms,
            rounds,
            attacks,
            seed,
            persist,
        } => {
            run_simulation(guard_config, &cli.state, farms, rounds, attacks, seed, persist).await?;
        }
    }

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

async fn open_bridge(config: GuardConfig, state: &Path) -> Result<GuardBridge> {
    let guard = Arc::new(SafetyGuard::new(config)?);
    let bridge = GuardBridge::new(
        guard,
        Arc::new(JsonFileStore::new(state)),
        BridgeConfig::default(),
    );
    bridge.start().await;
    Ok(bridge)
}

async fn run_simulation(
    guard_config: GuardConfig,
    state: &Path,
    farms: usize,
    rounds: usize,
    attacks: usize,
    seed: Option<u64>,
    persist: bool,
) -> Result<()> {
    println!("🌾 Meshguard simulation\n");
    println!("   Farms: {} | Rounds: {} | Attacks: {}", farms, rounds, attacks);

    let config = SimulationConfig {
        farms,
        rounds,
        attacks,
        seed,
        ..SimulationConfig::default()
    };

    let simulation = if persist {
        let guard = Arc::new(SafetyGuard::new(guard_config)?);
        Simulation::with_guard(config, guard, Arc::new(JsonFileStore::new(state)))
    } else {
        Simulation::new(config, guard_config)?
    };
    let report = simulation.run().await?;

    let farm = &report.farm_traffic;
    println!("\n📊 Farm traffic");
    println!(
        "   Sent: {} | Relayed: {} | Flagged: {} | Dropped: {}",
        farm.sent, farm.relayed, farm.flagged, farm.dropped
    );

    let attacker = &report.attacker_traffic;
    println!("\n🦹 Attacker {}", report.attacker_id);
    println!(
        "   Sent: {} | Relayed: {} | Flagged: {} | Dropped: {}",
        attacker.sent, attacker.relayed, attacker.flagged, attacker.dropped
    );
    match report.first_attacker_block {
        Some(n) => println!("   ⛔ Blocked at message {}", n),
        None => println!("   ⚠️  Never blocked"),
    }

    let stats = &report.stats;
    println!("\n🛡️  Guard ({})", stats.power_mode);
    println!(
        "   Processed: {} | Allowed: {} | Flagged: {} | Blocked: {}",
        stats.counters.processed,
        stats.counters.allowed,
        stats.counters.flagged,
        stats.counters.blocked
    );
    println!(
        "   Full analyses: {} | Quick-check skips: {}",
        stats.counters.full_analyses, stats.counters.quick_skips
    );
    println!(
        "   Reputation: {} trusted, {} normal, {} suspicious, {} low",
        stats.reputation.trusted,
        stats.reputation.normal,
        stats.reputation.suspicious,
        stats.reputation.low
    );
    if persist {
        println!("\n💾 State saved to {}", state.display());
    }

    Ok(())
}
