//! MCMC engines and posterior summaries.
//!
//! An engine receives a [`SamplerJob`] (model, data, monitored names,
//! per-chain initial values and [`ChainSettings`]) and returns raw
//! [`Samples`]. Two engines implement [`McmcEngine`]:
//!
//! - [`gibbs::GibbsEngine`]: in-process single-site sampler
//! - [`jags::JagsEngine`]: drives an external JAGS binary

pub mod data;
pub mod diagnostics;
pub mod distributions;
pub mod gibbs;
pub mod graph;
pub mod jags;
pub mod samples;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use data::{Array, DataSet};
pub use diagnostics::{ParameterSummary, PosteriorSummary};
pub use gibbs::GibbsEngine;
pub use jags::JagsEngine;
pub use samples::{ChainTrace, Samples};

use crate::error::{SimError, SimResult};
use crate::model::Model;

/// Name of the monitored deviance (-2 x log-likelihood of the data).
pub const DEVIANCE: &str = "deviance";

/// Chain length and count.
///
/// `iterations` includes the burn-in, so each chain keeps
/// `(iterations - burn_in) / thin` draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ChainSettings {
    /// Number of independent chains.
    #[validate(range(min = 1, max = 64))]
    pub chains: usize,
    /// Total iterations per chain, burn-in included.
    #[validate(range(min = 1))]
    pub iterations: usize,
    /// Iterations discarded at the start of each chain.
    pub burn_in: usize,
    /// Keep every `thin`-th post-burn-in iteration.
    #[validate(range(min = 1))]
    pub thin: usize,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chains: 3,
            iterations: 1000,
            burn_in: 100,
            thin: 5,
        }
    }
}

impl ChainSettings {
    /// Draws kept per chain.
    #[must_use]
    pub const fn kept_per_chain(&self) -> usize {
        self.iterations.saturating_sub(self.burn_in) / self.thin
    }

    /// Whether 1-based iteration `t` is kept.
    #[must_use]
    pub const fn keeps(&self, t: usize) -> bool {
        t > self.burn_in && (t - self.burn_in) % self.thin == 0
    }

    /// Check the settings can produce at least one draw.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for out-of-range fields and `Config` when the
    /// burn-in consumes every iteration.
    pub fn check(&self) -> SimResult<()> {
        self.validate()?;
        if self.kept_per_chain() == 0 {
            return Err(SimError::config(format!(
                "burn_in ({}) and thin ({}) leave no draws out of {} iterations",
                self.burn_in, self.thin, self.iterations
            )));
        }
        Ok(())
    }
}

/// Starting values for one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inits {
    /// Values of latent nodes; NaN cells are left to the engine.
    pub values: DataSet,
    /// Seed of the chain's random stream.
    pub seed: u64,
}

/// Everything an engine needs to run.
#[derive(Debug, Clone)]
pub struct SamplerJob {
    /// Parsed model.
    pub model: Model,
    /// Observed data and constants.
    pub data: DataSet,
    /// Variables to record; vectors expand to every cell.
    pub monitor: Vec<String>,
    /// One entry per chain.
    pub inits: Vec<Inits>,
    /// Chain settings.
    pub settings: ChainSettings,
}

impl SamplerJob {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` when the number of inits differs from
    /// the number of chains and `Config` for an empty monitor list.
    pub fn check(&self) -> SimResult<()> {
        self.settings.check()?;
        if self.inits.len() != self.settings.chains {
            return Err(SimError::dimension_mismatch(
                "inits",
                format!("{} chains", self.settings.chains),
                self.inits.len(),
            ));
        }
        if self.monitor.is_empty() {
            return Err(SimError::config("nothing to monitor"));
        }
        Ok(())
    }
}

/// An MCMC backend.
pub trait McmcEngine {
    /// Short engine name for logs and reports.
    fn name(&self) -> &'static str;

    /// Run every chain of `job` and collect the kept draws.
    ///
    /// # Errors
    ///
    /// Implementations return `InconsistentNode` for initial states with
    /// zero density, `Compile` for models they cannot handle and `Engine`
    /// or `Sampler` when sampling fails.
    fn run(&self, job: &SamplerJob) -> SimResult<Samples>;
}
