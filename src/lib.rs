//! # occusim
//!
//! Reproducible occupancy-model simulation and MCMC fitting.
//!
//! A scenario runs four stages once, top to bottom:
//!
//! 1. **Parameters**: a validated [`config::ScenarioConfig`]
//! 2. **Simulation**: latent occupancy and repeated detections
//!    ([`domains::occupancy`])
//! 3. **Model**: BUGS-dialect model text matching the simulator
//!    ([`model`])
//! 4. **Inference**: an [`mcmc::McmcEngine`] fits the model and the
//!    draws are summarised with Rhat, n.eff and DIC ([`scenarios`])
//!
//! ## Example
//!
//! ```rust
//! use occusim::prelude::*;
//!
//! let config = ScenarioConfig::builder().seed(42).sites(50).build()?;
//! let data = OccupancyScenario::new(config)?.simulate()?;
//! assert!(data.naive_occupancy_rate() <= data.true_occupancy_rate());
//! # Ok::<(), occusim::SimError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names, // i, j, n, p, z follow the model notation
    clippy::suboptimal_flops,
    clippy::imprecise_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,
    clippy::needless_range_loop,
    clippy::float_cmp,
)]

pub mod cli;
pub mod config;
pub mod domains;
pub mod engine;
pub mod error;
pub mod mcmc;
pub mod model;
pub mod scenarios;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ScenarioConfig, ScenarioConfigBuilder};
    pub use crate::domains::occupancy::{OccupancyProcess, OccupancySimulator, SimulatedData};
    pub use crate::engine::rng::SimRng;
    pub use crate::error::{SimError, SimResult};
    pub use crate::mcmc::{GibbsEngine, JagsEngine, McmcEngine, PosteriorSummary};
    pub use crate::model::{Model, ModelTemplate};
    pub use crate::scenarios::{OccupancyScenario, ScenarioReport};
}

/// Re-export for public API
pub use error::{SimError, SimResult};
