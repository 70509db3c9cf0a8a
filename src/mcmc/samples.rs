//! Raw posterior draws.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Draws of one chain: one series per monitored scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainTrace {
    series: Vec<Vec<f64>>,
}

impl ChainTrace {
    /// Empty trace for `width` scalars.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            series: vec![Vec::new(); width],
        }
    }

    /// Trace from complete series.
    #[must_use]
    pub const fn from_series(series: Vec<Vec<f64>>) -> Self {
        Self { series }
    }

    /// Append one kept iteration.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `values` has the wrong width.
    pub fn push(&mut self, values: &[f64]) -> SimResult<()> {
        if values.len() != self.series.len() {
            return Err(SimError::dimension_mismatch(
                "draw",
                self.series.len(),
                values.len(),
            ));
        }
        for (s, &v) in self.series.iter_mut().zip(values) {
            s.push(v);
        }
        Ok(())
    }

    /// Number of kept iterations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.first().map_or(0, Vec::len)
    }

    /// Whether nothing was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kept draws of every chain, keyed by scalar label (`psi`, `z[3]`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    names: Vec<String>,
    chains: Vec<ChainTrace>,
}

impl Samples {
    /// Assemble chains.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if chains differ in width or length.
    pub fn new(names: Vec<String>, chains: Vec<ChainTrace>) -> SimResult<Self> {
        let length = chains.first().map_or(0, ChainTrace::len);
        for (c, chain) in chains.iter().enumerate() {
            if chain.series.len() != names.len() {
                return Err(SimError::dimension_mismatch(
                    format!("chain {}", c + 1),
                    format!("{} series", names.len()),
                    chain.series.len(),
                ));
            }
            if chain.series.iter().any(|s| s.len() != length) {
                return Err(SimError::dimension_mismatch(
                    format!("chain {}", c + 1),
                    format!("{length} draws per series"),
                    "ragged series",
                ));
            }
        }
        Ok(Self { names, chains })
    }

    /// Monitored labels in output order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of chains.
    #[must_use]
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Kept draws per chain.
    #[must_use]
    pub fn n_kept(&self) -> usize {
        self.chains.first().map_or(0, ChainTrace::len)
    }

    /// Whether `name` was monitored.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Per-chain series for one scalar.
    #[must_use]
    pub fn chains_of(&self, name: &str) -> Option<Vec<&[f64]>> {
        let k = self.names.iter().position(|n| n == name)?;
        Some(self.chains.iter().map(|c| c.series[k].as_slice()).collect())
    }

    /// All chains of one scalar concatenated.
    #[must_use]
    pub fn pooled(&self, name: &str) -> Option<Vec<f64>> {
        self.chains_of(name).map(|chains| chains.concat())
    }
}
