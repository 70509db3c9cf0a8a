//! Logit link and site-level linear predictors.
//!
//! ```text
//! logit(π) = ln(π / (1 - π))
//! π        = 1 / (1 + e^{-η}),   η = α + β₁x + β₂x²
//! ```
//!
//! The inverse link is clamped to `[ε, 1 - ε]` with `ε = f64::EPSILON`, so
//! every finite linear predictor maps strictly inside (0, 1). Without the
//! clamp `η > 37` already rounds to exactly 1.0, which would make a
//! non-detection at an occupied site impossible.

use serde::{Deserialize, Serialize};

/// Smallest probability the inverse link returns.
pub const PROB_FLOOR: f64 = f64::EPSILON;

/// Inverse logit (logistic function), clamped strictly inside (0, 1).
///
/// NaN input propagates as NaN.
#[must_use]
pub fn ilogit(eta: f64) -> f64 {
    let p = if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    };
    p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR)
}

/// Log-odds of a probability.
///
/// Returns `-inf` at 0 and `+inf` at 1.
#[must_use]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Coefficients of a logit-linear (optionally quadratic) predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    /// Intercept on the logit scale.
    pub alpha: f64,
    /// Linear slope.
    pub beta1: f64,
    /// Quadratic coefficient; `None` means a purely linear predictor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta2: Option<f64>,
}

impl LinearPredictor {
    /// Linear predictor `α + β₁x`.
    #[must_use]
    pub const fn linear(alpha: f64, beta1: f64) -> Self {
        Self {
            alpha,
            beta1,
            beta2: None,
        }
    }

    /// Quadratic predictor `α + β₁x + β₂x²`.
    #[must_use]
    pub const fn quadratic(alpha: f64, beta1: f64, beta2: f64) -> Self {
        Self {
            alpha,
            beta1,
            beta2: Some(beta2),
        }
    }

    /// Whether the predictor carries a squared term.
    #[must_use]
    pub const fn is_quadratic(&self) -> bool {
        self.beta2.is_some()
    }

    /// Value on the logit scale.
    ///
    /// Each term saturates at `±f64::MAX` before summing, so finite
    /// inputs can overflow to an infinite η but never to NaN.
    #[must_use]
    pub fn eta(&self, x: f64) -> f64 {
        let saturate = |v: f64| v.clamp(f64::MIN, f64::MAX);
        let quad = self.beta2.map_or(0.0, |b2| saturate(b2 * x * x));
        self.alpha + saturate(self.beta1 * x) + quad
    }

    /// Probability at covariate value `x`.
    #[must_use]
    pub fn probability(&self, x: f64) -> f64 {
        ilogit(self.eta(x))
    }

    /// Whether all coefficients are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.alpha.is_finite()
            && self.beta1.is_finite()
            && self.beta2.map_or(true, f64::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ilogit_midpoint() {
        assert!((ilogit(0.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_ilogit_symmetry() {
        for eta in [-5.0, -1.0, 0.3, 2.0, 7.5] {
            assert!((ilogit(eta) + ilogit(-eta) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ilogit_saturates_inside_unit_interval() {
        assert!(ilogit(800.0) < 1.0);
        assert!(ilogit(-800.0) > 0.0);
        assert!(ilogit(f64::MAX) < 1.0);
        assert!(ilogit(f64::MIN) > 0.0);
    }

    #[test]
    fn test_ilogit_nan_propagates() {
        assert!(ilogit(f64::NAN).is_nan());
    }

    #[test]
    fn test_logit_inverts_ilogit() {
        for p in [0.01, 0.25, 0.5, 0.7, 0.99] {
            assert!((ilogit(logit(p)) - p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_predictor_linear() {
        let lp = LinearPredictor::linear(0.5, 2.0);
        assert!(!lp.is_quadratic());
        assert!((lp.eta(1.5) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_predictor_quadratic() {
        let lp = LinearPredictor::quadratic(0.0, 1.0, -2.0);
        assert!(lp.is_quadratic());
        // 0 + 1*2 - 2*4
        assert!((lp.eta(2.0) + 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_predictor_opposing_overflow() {
        let lp = LinearPredictor::quadratic(0.0, 1e308, -1e308);
        assert!(!lp.eta(10.0).is_nan());
        let p = lp.probability(10.0);
        assert!(p > 0.0 && p < 1.0, "p = {p}");

        let lp = LinearPredictor::quadratic(-1e308, -1e308, 1e308);
        assert_eq!(lp.eta(-10.0), f64::INFINITY);
        assert!(lp.probability(-10.0) < 1.0);
    }

    #[test]
    fn test_predictor_finite_check() {
        assert!(LinearPredictor::linear(0.0, 3.0).is_finite());
        assert!(!LinearPredictor::linear(f64::NAN, 3.0).is_finite());
        assert!(!LinearPredictor::quadratic(0.0, 3.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_predictor_yaml_shape() {
        let lp: LinearPredictor = serde_yaml::from_str("alpha: 0.0\nbeta1: -5.0\n").unwrap();
        assert_eq!(lp, LinearPredictor::linear(0.0, -5.0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn finite() -> impl Strategy<Value = f64> {
        proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO
    }

    proptest! {
        /// Falsification test: the logistic link never reaches 0 or 1.
        #[test]
        fn prop_ilogit_strictly_inside(eta in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
            let p = ilogit(eta);
            prop_assert!(p > 0.0 && p < 1.0, "ilogit({}) = {}", eta, p);
        }

        /// Falsification test: any finite covariate and coefficients give a
        /// probability strictly inside (0, 1).
        #[test]
        fn prop_predictor_probability_strictly_inside(
            alpha in finite(),
            beta1 in finite(),
            beta2 in finite(),
            x in finite(),
        ) {
            let p = LinearPredictor::quadratic(alpha, beta1, beta2).probability(x);
            prop_assert!(p > 0.0 && p < 1.0);
        }

        #[test]
        fn prop_ilogit_monotone(a in -50.0f64..50.0, b in -50.0f64..50.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ilogit(lo) <= ilogit(hi));
        }
    }
}
