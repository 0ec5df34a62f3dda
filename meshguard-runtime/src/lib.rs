//! Meshguard Runtime
//!
//! Async plumbing around the engine:
//! - **Bridge**: transports in, relay/drop dispositions out
//! - **Store**: JSON and in-memory persistence of guard state
//! - **Simulation**: farm nodes and an attacker on a virtual mesh

pub mod bridge;
pub mod simulation;
pub mod store;

pub use bridge::*;
pub use simulation::*;
pub use store::*;
