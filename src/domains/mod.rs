//! Domain models.
//!
//! - [`link`]: logit link and site-level linear predictors
//! - [`occupancy`]: detection/non-detection data simulator

pub mod link;
pub mod occupancy;

pub use link::{ilogit, logit, LinearPredictor};
pub use occupancy::{DetectionMatrix, OccupancyProcess, OccupancySimulator, SimulatedData};
