//! Detection/non-detection data simulator.
//!
//! # Generative Model
//!
//! ```text
//! z_i    ~ Bernoulli(ψ_i)             i = 1..R   (latent occupancy)
//! y_ij   ~ Bernoulli(z_i · p_i)       j = 1..T   (repeated surveys)
//! ```
//!
//! With a constant process `ψ_i = ψ` and `p_i = p`. With a covariate process
//! `ψ_i = ilogit(α_ψ + β₁ψ x_i [+ β₂ψ x_i²])` and likewise for `p_i`.
//!
//! An unoccupied site can never yield a detection, so the naive estimate
//! (fraction of sites with at least one detection) can only undershoot the
//! true occupancy rate.

use serde::{Deserialize, Serialize};

use super::link::LinearPredictor;
use crate::engine::jidoka::{check_count, check_probabilities, check_probability};
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

/// How site-level occupancy and detection probabilities are produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OccupancyProcess {
    /// One shared occupancy and one shared detection probability.
    Constant {
        /// Occupancy probability ψ.
        psi: f64,
        /// Detection probability p.
        p: f64,
    },
    /// Logit-linear functions of a site covariate.
    Covariate {
        /// Covariate value per site.
        covariate: Vec<f64>,
        /// Occupancy predictor.
        occupancy: LinearPredictor,
        /// Detection predictor.
        detection: LinearPredictor,
    },
}

impl OccupancyProcess {
    /// Per-site occupancy probabilities.
    fn occupancy_probabilities(&self, sites: usize) -> Vec<f64> {
        match self {
            Self::Constant { psi, .. } => vec![*psi; sites],
            Self::Covariate {
                covariate,
                occupancy,
                ..
            } => covariate.iter().map(|&x| occupancy.probability(x)).collect(),
        }
    }

    /// Per-site detection probabilities.
    fn detection_probabilities(&self, sites: usize) -> Vec<f64> {
        match self {
            Self::Constant { p, .. } => vec![*p; sites],
            Self::Covariate {
                covariate,
                detection,
                ..
            } => covariate.iter().map(|&x| detection.probability(x)).collect(),
        }
    }
}

/// Draw a sorted covariate vector, uniform on `[min, max)`.
///
/// Sorting mirrors a gradient survey design and makes printed data easy to
/// read; it does not change the model.
#[must_use]
pub fn sorted_uniform_covariate(rng: &mut SimRng, sites: usize, min: f64, max: f64) -> Vec<f64> {
    let mut values = rng.uniform_n(sites, min, max);
    values.sort_by(f64::total_cmp);
    values
}

/// R × T binary detection matrix, stored row-major (site-major).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionMatrix {
    sites: usize,
    surveys: usize,
    cells: Vec<u8>,
}

impl DetectionMatrix {
    /// Create an all-zero matrix.
    #[must_use]
    pub fn zeros(sites: usize, surveys: usize) -> Self {
        Self {
            sites,
            surveys,
            cells: vec![0; sites * surveys],
        }
    }

    /// Build from per-site rows.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for ragged rows and `InvalidParameter`
    /// for cells other than 0 or 1.
    pub fn from_rows(rows: &[Vec<u8>]) -> SimResult<Self> {
        let surveys = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(rows.len() * surveys);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != surveys {
                return Err(SimError::dimension_mismatch(
                    format!("y[{},]", i + 1),
                    surveys,
                    row.len(),
                ));
            }
            if let Some(bad) = row.iter().find(|&&v| v > 1) {
                return Err(SimError::invalid_parameter(
                    format!("y[{},]", i + 1),
                    format!("detection outcome {bad} is not binary"),
                ));
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            sites: rows.len(),
            surveys,
            cells,
        })
    }

    /// Number of sites (rows).
    #[must_use]
    pub const fn sites(&self) -> usize {
        self.sites
    }

    /// Number of surveys (columns).
    #[must_use]
    pub const fn surveys(&self) -> usize {
        self.surveys
    }

    /// Outcome at site `i`, survey `j` (0-based).
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> u8 {
        self.cells[i * self.surveys + j]
    }

    fn set(&mut self, i: usize, j: usize, value: u8) {
        self.cells[i * self.surveys + j] = value;
    }

    /// All survey outcomes of site `i`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[u8] {
        &self.cells[i * self.surveys..(i + 1) * self.surveys]
    }

    /// Iterate over site rows.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks(self.surveys.max(1)).take(self.sites)
    }

    /// Total number of detections.
    #[must_use]
    pub fn total_detections(&self) -> usize {
        self.cells.iter().map(|&c| usize::from(c)).sum()
    }

    /// Values in column-major order, the layout engines expect.
    #[must_use]
    pub fn to_column_major(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.cells.len());
        for j in 0..self.surveys {
            for i in 0..self.sites {
                out.push(f64::from(self.get(i, j)));
            }
        }
        out
    }
}

/// One realisation of the generative process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedData {
    /// Latent occupancy per site (0 or 1).
    pub z: Vec<u8>,
    /// Observed detections.
    pub y: DetectionMatrix,
    /// Occupancy probability used at each site.
    pub psi: Vec<f64>,
    /// Detection probability used at each site.
    pub p: Vec<f64>,
    /// Site covariate, when the process has one.
    pub covariate: Option<Vec<f64>>,
}

impl SimulatedData {
    /// Number of sites.
    #[must_use]
    pub fn sites(&self) -> usize {
        self.z.len()
    }

    /// Number of truly occupied sites.
    #[must_use]
    pub fn occupied_sites(&self) -> usize {
        self.z.iter().filter(|&&z| z == 1).count()
    }

    /// Number of sites with at least one detection.
    #[must_use]
    pub fn detected_sites(&self) -> usize {
        self.y.rows().filter(|row| row.contains(&1)).count()
    }

    /// Fraction of sites truly occupied.
    #[must_use]
    pub fn true_occupancy_rate(&self) -> f64 {
        ratio(self.occupied_sites(), self.sites())
    }

    /// Fraction of sites with at least one detection.
    #[must_use]
    pub fn naive_occupancy_rate(&self) -> f64 {
        ratio(self.detected_sites(), self.sites())
    }

    /// Observed maximum per site: 1 if the species was ever detected.
    ///
    /// This is the only latent-state guess guaranteed to be consistent
    /// with the data, which is why it seeds the sampler.
    #[must_use]
    pub fn naive_z(&self) -> Vec<u8> {
        self.y
            .rows()
            .map(|row| row.iter().copied().max().unwrap_or(0))
            .collect()
    }

    /// Fraction of surveys at occupied sites that produced a detection.
    #[must_use]
    pub fn detection_frequency(&self) -> f64 {
        let occupied = self.occupied_sites() * self.y.surveys();
        ratio(self.y.total_detections(), occupied)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Simulator for detection/non-detection data.
///
/// # Example
///
/// ```rust
/// use occusim::domains::occupancy::{OccupancyProcess, OccupancySimulator};
/// use occusim::engine::rng::SimRng;
///
/// let sim = OccupancySimulator::new(100, 3, OccupancyProcess::Constant { psi: 0.7, p: 0.4 })?;
/// let data = sim.simulate(&mut SimRng::new(2))?;
/// assert!(data.naive_occupancy_rate() <= data.true_occupancy_rate());
/// # Ok::<(), occusim::SimError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OccupancySimulator {
    sites: usize,
    surveys: usize,
    process: OccupancyProcess,
}

impl OccupancySimulator {
    /// Create a simulator, validating every parameter up front.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for zero sites/surveys, probabilities outside
    ///   [0, 1] or non-finite coefficients
    /// - `DimensionMismatch` if the covariate length differs from `sites`
    pub fn new(sites: usize, surveys: usize, process: OccupancyProcess) -> SimResult<Self> {
        check_count("sites", sites)?;
        check_count("surveys", surveys)?;

        match &process {
            OccupancyProcess::Constant { psi, p } => {
                check_probability("psi", *psi)?;
                check_probability("p", *p)?;
            }
            OccupancyProcess::Covariate {
                covariate,
                occupancy,
                detection,
            } => {
                if covariate.len() != sites {
                    return Err(SimError::dimension_mismatch(
                        "covariate",
                        sites,
                        covariate.len(),
                    ));
                }
                if let Some(i) = covariate.iter().position(|x| !x.is_finite()) {
                    return Err(SimError::invalid_parameter(
                        format!("covariate[{}]", i + 1),
                        "must be finite",
                    ));
                }
                if !occupancy.is_finite() {
                    return Err(SimError::invalid_parameter(
                        "occupancy",
                        "coefficients must be finite",
                    ));
                }
                if !detection.is_finite() {
                    return Err(SimError::invalid_parameter(
                        "detection",
                        "coefficients must be finite",
                    ));
                }
            }
        }

        Ok(Self {
            sites,
            surveys,
            process,
        })
    }

    /// Number of sites.
    #[must_use]
    pub const fn sites(&self) -> usize {
        self.sites
    }

    /// Number of surveys per site.
    #[must_use]
    pub const fn surveys(&self) -> usize {
        self.surveys
    }

    /// The generative process.
    #[must_use]
    pub const fn process(&self) -> &OccupancyProcess {
        &self.process
    }

    /// Draw each site's latent state followed by its `T` detections.
    ///
    /// Exactly `R × (1 + T)` uniforms are consumed, site by site, whatever
    /// the latent states turn out to be, so the stream layout is fixed by
    /// the design alone.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if a site probability is not in [0, 1].
    pub fn simulate(&self, rng: &mut SimRng) -> SimResult<SimulatedData> {
        let psi = self.process.occupancy_probabilities(self.sites);
        let p = self.process.detection_probabilities(self.sites);
        check_probabilities("psi", &psi)?;
        check_probabilities("p", &p)?;

        let mut z = Vec::with_capacity(self.sites);
        let mut y = DetectionMatrix::zeros(self.sites, self.surveys);
        for i in 0..self.sites {
            let occupied = rng.gen_bernoulli(psi[i]);
            z.push(u8::from(occupied));
            let effective = if occupied { p[i] } else { 0.0 };
            for j in 0..self.surveys {
                y.set(i, j, u8::from(rng.gen_bernoulli(effective)));
            }
        }

        let covariate = match &self.process {
            OccupancyProcess::Covariate { covariate, .. } => Some(covariate.clone()),
            OccupancyProcess::Constant { .. } => None,
        };

        Ok(SimulatedData {
            z,
            y,
            psi,
            p,
            covariate,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Falsification test: naive occupancy never exceeds the truth.
        #[test]
        fn prop_naive_never_exceeds_truth(
            seed in 0u64..u64::MAX,
            sites in 1usize..300,
            surveys in 1usize..6,
            psi in 0.0f64..=1.0,
            p in 0.0f64..1.0,
        ) {
            let sim = OccupancySimulator::new(sites, surveys, OccupancyProcess::Constant { psi, p }).unwrap();
            let data = sim.simulate(&mut SimRng::new(seed)).unwrap();
            prop_assert!(data.naive_occupancy_rate() <= data.true_occupancy_rate());
            prop_assert!(data.naive_z().iter().zip(&data.z).all(|(n, z)| n <= z));
        }

        /// Falsification test: same seed, same data, for any seed.
        #[test]
        fn prop_deterministic(seed in 0u64..u64::MAX) {
            let sim = OccupancySimulator::new(50, 3, OccupancyProcess::Constant { psi: 0.7, p: 0.4 }).unwrap();
            let a = sim.simulate(&mut SimRng::new(seed)).unwrap();
            let b = sim.simulate(&mut SimRng::new(seed)).unwrap();
            prop_assert_eq!(a.y, b.y);
        }
    }
}
