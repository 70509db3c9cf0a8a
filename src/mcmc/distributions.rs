//! Distribution families of the model language.
//!
//! | Name     | Parameters      | Support            |
//! |----------|-----------------|--------------------|
//! | `dbern`  | p               | {0, 1}             |
//! | `dbin`   | p, n            | {0, ..., n}        |
//! | `dunif`  | a, b            | [a, b]             |
//! | `dbeta`  | a, b            | (0, 1)             |
//! | `dnorm`  | mu, tau         | R (tau = 1/sd^2)   |
//! | `dpois`  | lambda          | {0, 1, ...}        |
//! | `dgamma` | shape, rate     | (0, inf)           |

use std::f64::consts::PI;

use rand_distr::{Bernoulli, Beta, Binomial, Gamma, Normal, Poisson, Uniform};

use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

/// Distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Bernoulli.
    Bern,
    /// Binomial.
    Bin,
    /// Continuous uniform.
    Unif,
    /// Beta.
    Beta,
    /// Normal, precision parameterised.
    Norm,
    /// Poisson.
    Pois,
    /// Gamma, rate parameterised.
    Gamma,
}

/// Range of values a node can take given its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Support {
    /// Integers `lo..=hi`.
    Finite {
        /// Smallest value.
        lo: i64,
        /// Largest value.
        hi: i64,
    },
    /// Non-negative integers without an upper bound.
    Counts,
    /// Real interval; bounds may be infinite.
    Interval {
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },
}

impl Family {
    /// Look up a family by its model-language name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "dbern" => Self::Bern,
            "dbin" => Self::Bin,
            "dunif" => Self::Unif,
            "dbeta" => Self::Beta,
            "dnorm" => Self::Norm,
            "dpois" => Self::Pois,
            "dgamma" => Self::Gamma,
            _ => return None,
        })
    }

    /// Model-language name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bern => "dbern",
            Self::Bin => "dbin",
            Self::Unif => "dunif",
            Self::Beta => "dbeta",
            Self::Norm => "dnorm",
            Self::Pois => "dpois",
            Self::Gamma => "dgamma",
        }
    }

    /// Number of parameters.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Bern | Self::Pois => 1,
            _ => 2,
        }
    }

    /// Whether values are integers.
    #[must_use]
    pub const fn is_discrete(self) -> bool {
        matches!(self, Self::Bern | Self::Bin | Self::Pois)
    }

    /// Whether the parameters are admissible.
    #[must_use]
    pub fn valid_params(self, params: &[f64]) -> bool {
        if params.len() != self.arity() || params.iter().any(|v| !v.is_finite()) {
            return false;
        }
        match self {
            Self::Bern => (0.0..=1.0).contains(&params[0]),
            Self::Bin => (0.0..=1.0).contains(&params[0]) && is_count(params[1]),
            Self::Unif => params[0] < params[1],
            Self::Beta | Self::Gamma => params[0] > 0.0 && params[1] > 0.0,
            Self::Norm => params[1] > 0.0,
            Self::Pois => params[0] >= 0.0,
        }
    }

    /// Support for the given parameters.
    #[must_use]
    pub fn support(self, params: &[f64]) -> Support {
        match self {
            Self::Bern => Support::Finite { lo: 0, hi: 1 },
            Self::Bin => Support::Finite {
                lo: 0,
                hi: params.get(1).map_or(0, |&n| n as i64),
            },
            Self::Pois => Support::Counts,
            Self::Unif => Support::Interval {
                lo: params[0],
                hi: params[1],
            },
            Self::Beta => Support::Interval { lo: 0.0, hi: 1.0 },
            Self::Gamma => Support::Interval {
                lo: 0.0,
                hi: f64::INFINITY,
            },
            Self::Norm => Support::Interval {
                lo: f64::NEG_INFINITY,
                hi: f64::INFINITY,
            },
        }
    }

    /// Log density (or log mass) of `x`.
    ///
    /// Returns `-inf` outside the support or for inadmissible parameters.
    #[must_use]
    pub fn log_density(self, params: &[f64], x: f64) -> f64 {
        if !self.valid_params(params) || !x.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self {
            Self::Bern => {
                let p = params[0];
                if x == 1.0 {
                    p.ln()
                } else if x == 0.0 {
                    (1.0 - p).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Self::Bin => {
                let (p, n) = (params[0], params[1]);
                if !is_count(x) || x > n {
                    return f64::NEG_INFINITY;
                }
                ln_choose(n, x) + xlogy(x, p) + xlogy(n - x, 1.0 - p)
            }
            Self::Unif => {
                let (a, b) = (params[0], params[1]);
                if (a..=b).contains(&x) {
                    -(b - a).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Self::Beta => {
                let (a, b) = (params[0], params[1]);
                if x <= 0.0 || x >= 1.0 {
                    return f64::NEG_INFINITY;
                }
                (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(a, b)
            }
            Self::Norm => {
                let (mu, tau) = (params[0], params[1]);
                0.5 * (tau / (2.0 * PI)).ln() - 0.5 * tau * (x - mu).powi(2)
            }
            Self::Pois => {
                let lambda = params[0];
                if !is_count(x) {
                    return f64::NEG_INFINITY;
                }
                xlogy(x, lambda) - lambda - ln_gamma(x + 1.0)
            }
            Self::Gamma => {
                let (shape, rate) = (params[0], params[1]);
                if x <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                shape * rate.ln() + (shape - 1.0) * x.ln() - rate * x - ln_gamma(shape)
            }
        }
    }

    /// Draw one value.
    ///
    /// # Errors
    ///
    /// Returns `Sampler` for inadmissible parameters.
    pub fn sample(self, params: &[f64], rng: &mut SimRng) -> SimResult<f64> {
        if !self.valid_params(params) {
            return Err(SimError::sampler(format!(
                "invalid parameters {params:?} for {}",
                self.name()
            )));
        }
        let bad = |e: &dyn std::fmt::Display| SimError::sampler(format!("{}: {e}", self.name()));
        let value = match self {
            Self::Bern => {
                let d = Bernoulli::new(params[0]).map_err(|e| bad(&e))?;
                let hit: bool = rng.sample(&d);
                f64::from(u8::from(hit))
            }
            Self::Bin => {
                let d = Binomial::new(params[1] as u64, params[0]).map_err(|e| bad(&e))?;
                let k: u64 = rng.sample(&d);
                k as f64
            }
            Self::Unif => rng.sample(&Uniform::new_inclusive(params[0], params[1])),
            Self::Beta => {
                let d = Beta::new(params[0], params[1]).map_err(|e| bad(&e))?;
                rng.sample(&d)
            }
            Self::Norm => {
                let d = Normal::new(params[0], 1.0 / params[1].sqrt()).map_err(|e| bad(&e))?;
                rng.sample(&d)
            }
            Self::Pois => {
                if params[0] == 0.0 {
                    0.0
                } else {
                    let d = Poisson::new(params[0]).map_err(|e| bad(&e))?;
                    let k: f64 = rng.sample(&d);
                    k
                }
            }
            Self::Gamma => {
                // shape/scale parameterisation, scale = 1/rate
                let d = Gamma::new(params[0], 1.0 / params[1]).map_err(|e| bad(&e))?;
                rng.sample(&d)
            }
        };
        Ok(value)
    }
}

fn is_count(x: f64) -> bool {
    x >= 0.0 && x.fract() == 0.0
}

/// `x * ln(y)` with the convention `0 * ln(0) = 0`.
fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

/// Natural log of the gamma function for `x > 0`.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }

    // Shift into the range where the asymptotic series is accurate.
    let mut x = x;
    let mut result = 0.0;
    while x < 10.0 {
        result -= x.ln();
        x += 1.0;
    }

    let inv_x = 1.0 / x;
    let inv_x2 = inv_x * inv_x;
    let correction = inv_x * (1.0 / 12.0 - inv_x2 * (1.0 / 360.0 - inv_x2 / 1260.0));

    result + (x - 0.5) * x.ln() - x + 0.5 * (2.0 * PI).ln() + correction
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

fn ln_choose(n: f64, k: f64) -> f64 {
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_names_round_trip() {
        for family in [
            Family::Bern,
            Family::Bin,
            Family::Unif,
            Family::Beta,
            Family::Norm,
            Family::Pois,
            Family::Gamma,
        ] {
            assert_eq!(Family::from_name(family.name()), Some(family));
        }
        assert_eq!(Family::from_name("dweib"), None);
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert!(ln_gamma(1.0).abs() < TOL);
        assert!(ln_gamma(2.0).abs() < TOL);
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < TOL);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-8);
    }

    #[test]
    fn test_bernoulli_density() {
        assert!((Family::Bern.log_density(&[0.3], 1.0) - 0.3_f64.ln()).abs() < TOL);
        assert!((Family::Bern.log_density(&[0.3], 0.0) - 0.7_f64.ln()).abs() < TOL);
        assert_eq!(Family::Bern.log_density(&[0.3], 0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn test_structural_zero() {
        // detection at an unoccupied site
        assert_eq!(Family::Bern.log_density(&[0.0], 1.0), f64::NEG_INFINITY);
        assert_eq!(Family::Bern.log_density(&[0.0], 0.0), 0.0);
    }

    #[test]
    fn test_binomial_density() {
        // C(3,1) * 0.5^3
        let expected = (3.0 * 0.125_f64).ln();
        assert!((Family::Bin.log_density(&[0.5, 3.0], 1.0) - expected).abs() < 1e-8);
        assert_eq!(Family::Bin.log_density(&[0.5, 3.0], 4.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_uniform_density() {
        assert!((Family::Unif.log_density(&[-10.0, 10.0], 3.0) + 20.0_f64.ln()).abs() < TOL);
        assert_eq!(Family::Unif.log_density(&[0.0, 1.0], 1.5), f64::NEG_INFINITY);
        assert_eq!(Family::Unif.log_density(&[1.0, 0.0], 0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn test_normal_density() {
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((Family::Norm.log_density(&[0.0, 1.0], 0.0) - expected).abs() < TOL);
    }

    #[test]
    fn test_gamma_density_exponential_case() {
        // shape 1, rate 2 is Exponential(2): ln 2 - 2x
        let x = 0.7;
        let expected = 2.0_f64.ln() - 2.0 * x;
        assert!((Family::Gamma.log_density(&[1.0, 2.0], x) - expected).abs() < 1e-8);
    }

    #[test]
    fn test_poisson_density() {
        let expected = 2.0_f64.ln() * 3.0 - 2.0 - 6.0_f64.ln();
        assert!((Family::Pois.log_density(&[2.0], 3.0) - expected).abs() < 1e-8);
    }

    #[test]
    fn test_beta_uniform_case() {
        assert!(Family::Beta.log_density(&[1.0, 1.0], 0.4).abs() < 1e-8);
    }

    #[test]
    fn test_support() {
        assert_eq!(Family::Bern.support(&[0.5]), Support::Finite { lo: 0, hi: 1 });
        assert_eq!(Family::Bin.support(&[0.5, 4.0]), Support::Finite { lo: 0, hi: 4 });
        assert_eq!(
            Family::Unif.support(&[-10.0, 10.0]),
            Support::Interval { lo: -10.0, hi: 10.0 }
        );
    }

    #[test]
    fn test_sample_respects_support() {
        let mut rng = SimRng::new(7);
        for _ in 0..200 {
            let u = Family::Unif.sample(&[-3.0, 3.0], &mut rng).unwrap();
            assert!((-3.0..=3.0).contains(&u));
            let b = Family::Bern.sample(&[0.4], &mut rng).unwrap();
            assert!(b == 0.0 || b == 1.0);
            let g = Family::Gamma.sample(&[2.0, 1.0], &mut rng).unwrap();
            assert!(g > 0.0);
            let n = Family::Bin.sample(&[0.5, 5.0], &mut rng).unwrap();
            assert!((0.0..=5.0).contains(&n) && n.fract() == 0.0);
        }
    }

    #[test]
    fn test_sample_rejects_bad_params() {
        let mut rng = SimRng::new(1);
        assert!(Family::Bern.sample(&[1.5], &mut rng).is_err());
        assert!(Family::Norm.sample(&[0.0, -1.0], &mut rng).is_err());
    }

    #[test]
    fn test_bernoulli_mean() {
        let mut rng = SimRng::new(11);
        let n = 20_000;
        let sum: f64 = (0..n)
            .map(|_| Family::Bern.sample(&[0.3], &mut rng).unwrap())
            .sum();
        assert!((sum / f64::from(n) - 0.3).abs() < 0.02);
    }
}
