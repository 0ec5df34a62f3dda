//! Meshguard Core - message and sender-state model for the mesh Safety Guard
//!
//! This crate provides the pure, synchronous building blocks:
//! - Message, direction and language types
//! - Per-category signal scores and the verdict model
//! - Sender state with asymmetric risk/reputation memory
//! - Per-language lexical classifiers and the signal aggregator
//! - Validated, TOML-loadable configuration

pub mod aggregate;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod message;
pub mod signals;
pub mod state;
pub mod verdict;

pub use aggregate::*;
pub use config::*;
pub use error::*;
pub use lexicon::*;
pub use message::*;
pub use signals::*;
pub use state::*;
pub use verdict::*;

/// Golden ratio
pub const PHI: f64 = 1.618_033_988_749_894_9;

/// Memory rate: 1 / (6·PHI) ≈ 0.103
pub const GAMMA: f64 = 1.0 / (6.0 * PHI);

/// Minimum persistent risk baseline
pub const ALERT_LOW: f64 = GAMMA;

/// Mandatory-intervention ceiling
pub const ALERT_HIGH: f64 = 1.0 - GAMMA;

/// Starting reputation for unknown senders
pub const DEFAULT_REPUTATION: f64 = 0.5;

/// Seconds elapsed between two timestamps, never negative
pub fn elapsed_secs(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 1000.0).max(0.0)
}
