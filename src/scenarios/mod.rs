//! Occupancy scenarios: simulate, specify, infer.
//!
//! Provides ready-to-use scenarios:
//! - Model of the mean (constant occupancy and detection)
//! - Vegetation covariate (logit-linear occupancy and detection)

pub mod driver;
pub mod occupancy;

pub use driver::{FitResult, InferenceDriver};
pub use occupancy::{DataSummary, OccupancyScenario, ScenarioReport, TrueValue};

use crate::config::ScenarioConfig;

/// Scenarios of the walkthrough, in order.
#[must_use]
pub fn walkthrough() -> Vec<ScenarioConfig> {
    vec![ScenarioConfig::model_of_the_mean(), ScenarioConfig::vegetation()]
}
