//! Meshguard Engine
//!
//! The stateful half of the Safety Guard. Every message runs the same fixed
//! pipeline:
//! - **Blocklist**: listed senders are blocked before anything else runs
//! - **Rate limiter**: per-sender token bucket
//! - **Deduplicator**: normalized fingerprints in a sliding window
//! - **Classifier + aggregator**: lexical scoring folded into one signal
//! - **Decay store**: asymmetric risk and reputation memory
//! - **Decision**: risk bands mapped to ALLOW / FLAG / BLOCK
//!
//! [`SafetyGuard`] is the entry point; it is `Send + Sync` and meant to be
//! shared behind an `Arc` by every transport callback.

pub mod blocklist;
pub mod dedup;
pub mod engine;
pub mod memory;
pub mod rate_limit;
pub mod stats;

pub use blocklist::*;
pub use dedup::*;
pub use engine::*;
pub use memory::*;
pub use rate_limit::*;
pub use stats::*;
