//! Simulation core shared by the data simulator and the samplers.
//!
//! - Deterministic RNG (PCG with partitioned seeds)
//! - Jidoka guards for stop-on-error

pub mod jidoka;
pub mod rng;

pub use jidoka::{JidokaViolation, SweepGuard};
pub use rng::SimRng;
