//! Jidoka (自働化) - stop-on-error guards.
//!
//! Detects invalid inputs and numerical anomalies and stops the scenario
//! immediately, before a bad value can propagate into simulated data or into
//! a chain.
//!
//! # Checks
//!
//! 1. **Probability range**: probabilities must be finite and in [0, 1]
//! 2. **Counts**: site and survey counts must be positive
//! 3. **Non-finite values**: NaN or Inf in sampler state

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Jidoka violation types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JidokaViolation {
    /// Probability outside [0, 1] or not finite.
    ProbabilityOutOfRange {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: f64,
    },
    /// Count that must be positive was zero.
    EmptyCount {
        /// Parameter name.
        name: String,
    },
    /// Non-finite value (NaN or Inf) detected.
    NonFiniteValue {
        /// Location of the non-finite value (e.g., "psi" or "alpha.occ").
        location: String,
        /// The non-finite value itself.
        value: f64,
    },
}

impl From<JidokaViolation> for SimError {
    fn from(v: JidokaViolation) -> Self {
        match v {
            JidokaViolation::ProbabilityOutOfRange { name, value } => Self::InvalidParameter {
                name,
                message: format!("probability {value} is outside [0, 1]"),
            },
            JidokaViolation::EmptyCount { name } => Self::InvalidParameter {
                name,
                message: "must be at least 1".to_string(),
            },
            JidokaViolation::NonFiniteValue { location, .. } => Self::NonFiniteValue { location },
        }
    }
}

/// Check that `value` is a valid probability.
///
/// # Errors
///
/// Returns `InvalidParameter` if `value` is NaN, infinite or outside [0, 1].
///
/// # Example
///
/// ```rust
/// use occusim::engine::jidoka::check_probability;
///
/// assert!(check_probability("psi", 0.7).is_ok());
/// assert!(check_probability("psi", 1.2).is_err());
/// ```
pub fn check_probability(name: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(JidokaViolation::ProbabilityOutOfRange {
            name: name.to_string(),
            value,
        }
        .into())
    }
}

/// Check every entry of a per-site probability vector.
///
/// # Errors
///
/// Returns `InvalidParameter` naming the first offending site (1-based).
pub fn check_probabilities(name: &str, values: &[f64]) -> SimResult<()> {
    for (i, &v) in values.iter().enumerate() {
        check_probability(&format!("{name}[{}]", i + 1), v)?;
    }
    Ok(())
}

/// Check that a count is at least one.
///
/// # Errors
///
/// Returns `InvalidParameter` if `value == 0`.
pub fn check_count(name: &str, value: usize) -> SimResult<()> {
    if value == 0 {
        Err(JidokaViolation::EmptyCount {
            name: name.to_string(),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Check that a value is finite.
///
/// # Errors
///
/// Returns `NonFiniteValue` for NaN or Inf.
pub fn check_finite(location: &str, value: f64) -> SimResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(JidokaViolation::NonFiniteValue {
            location: location.to_string(),
            value,
        }
        .into())
    }
}

/// In-process guard run after every sampler sweep.
///
/// Aborts the chain as soon as a monitored value turns non-finite instead
/// of letting the remaining iterations run on garbage.
#[derive(Debug, Clone, Default)]
pub struct SweepGuard {
    /// Number of sweeps inspected.
    sweeps: u64,
}

impl SweepGuard {
    /// Create a new guard.
    #[must_use]
    pub const fn new() -> Self {
        Self { sweeps: 0 }
    }

    /// Inspect labelled values from one sweep.
    ///
    /// # Errors
    ///
    /// Returns `NonFiniteValue` naming the first offending label.
    pub fn check<'a, I>(&mut self, values: I) -> SimResult<()>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.sweeps += 1;
        for (label, value) in values {
            check_finite(label, value)?;
        }
        Ok(())
    }

    /// Number of sweeps inspected so far.
    #[must_use]
    pub const fn sweeps(&self) -> u64 {
        self.sweeps
    }
}
