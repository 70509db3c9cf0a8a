//! Posterior summaries and convergence diagnostics.
//!
//! # Potential scale reduction
//!
//! For `m` chains of length `n` with within-chain variance `W` and
//! between-chain variance `B`:
//!
//! ```text
//! var+ = (n-1)/n * W + B/n
//! Rhat = sqrt(var+ / W)
//! ```
//!
//! # Effective sample size
//!
//! `n.eff = m n / (1 + 2 Σ ρ_t)` with the autocorrelations combined across
//! chains and truncated by Geyer's initial monotone positive sequence.
//! The estimate is capped at `m n`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::samples::Samples;
use super::DEVIANCE;
use crate::error::{SimError, SimResult};

/// Quantile levels reported per parameter.
pub const QUANTILES: [f64; 5] = [0.025, 0.25, 0.5, 0.75, 0.975];

/// Summary of one monitored scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Label, e.g. `psi` or `z[3]`.
    pub name: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub sd: f64,
    /// 2.5%, 25%, 50%, 75% and 97.5% quantiles.
    pub quantiles: [f64; 5],
    /// Whether the 95% credible interval contains zero.
    pub overlap0: bool,
    /// Fraction of draws with the same sign as the mean.
    pub f: f64,
    /// Potential scale reduction (NaN with a single chain).
    pub rhat: f64,
    /// Effective sample size.
    pub n_eff: f64,
}

impl ParameterSummary {
    /// Lower bound of the 95% credible interval.
    #[must_use]
    pub const fn lower95(&self) -> f64 {
        self.quantiles[0]
    }

    /// Upper bound of the 95% credible interval.
    #[must_use]
    pub const fn upper95(&self) -> f64 {
        self.quantiles[4]
    }

    /// Posterior median.
    #[must_use]
    pub const fn median(&self) -> f64 {
        self.quantiles[2]
    }
}

/// Deviance information criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dic {
    /// Mean deviance.
    pub mean_deviance: f64,
    /// Effective number of parameters, `var(deviance) / 2`.
    pub pd: f64,
    /// `mean_deviance + pd`.
    pub dic: f64,
}

/// Summary table for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    /// One row per monitored scalar, in monitor order.
    pub parameters: Vec<ParameterSummary>,
    /// Present when the deviance was monitored.
    pub dic: Option<Dic>,
    /// Number of chains.
    pub chains: usize,
    /// Kept draws per chain.
    pub kept_per_chain: usize,
}

/// Arithmetic mean; NaN for an empty slice.
#[must_use]
pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator); 0 for fewer than two values.
#[must_use]
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Quantile of sorted data by linear interpolation between order
/// statistics (R's default, type 7).
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Within-chain variance `W`, between-chain variance `B` and `var+`.
fn variance_components(chains: &[&[f64]]) -> Option<(f64, f64, f64, usize)> {
    let n = chains.iter().map(|c| c.len()).min()?;
    if n < 2 {
        return None;
    }
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = mean(&chains.iter().map(|c| variance(c)).collect::<Vec<_>>());
    let b = n as f64 * variance(&means);
    let var_plus = (n - 1) as f64 / n as f64 * w + b / n as f64;
    Some((w, b, var_plus, n))
}

/// Gelman-Rubin potential scale reduction factor.
///
/// Returns NaN for fewer than two chains or fewer than two draws per chain,
/// `1` when every chain is constant at the same value and `inf` when the
/// chains are constant at different values.
#[must_use]
pub fn rhat(chains: &[&[f64]]) -> f64 {
    if chains.len() < 2 {
        return f64::NAN;
    }
    let Some((w, b, var_plus, _)) = variance_components(chains) else {
        return f64::NAN;
    };
    if w == 0.0 {
        return if b == 0.0 { 1.0 } else { f64::INFINITY };
    }
    (var_plus / w).sqrt()
}

fn autocovariance(xs: &[f64], lag: usize) -> f64 {
    let n = xs.len();
    let m = mean(xs);
    (0..n - lag)
        .map(|k| (xs[k] - m) * (xs[k + lag] - m))
        .sum::<f64>()
        / n as f64
}

/// Effective sample size across chains.
///
/// A constant parameter has an effective sample size of 1.
#[must_use]
pub fn n_eff(chains: &[&[f64]]) -> f64 {
    let Some((w, _, var_plus, n)) = variance_components(chains) else {
        return chains.iter().map(|c| c.len()).sum::<usize>() as f64;
    };
    let total = (chains.len() * n) as f64;
    if var_plus == 0.0 {
        return 1.0;
    }

    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let rho = |lag: usize| -> f64 {
        let acov = mean(
            &chains
                .iter()
                .map(|c| autocovariance(c, lag))
                .collect::<Vec<_>>(),
        );
        1.0 - (w - acov) / var_plus
    };

    // Geyer: sum successive pairs while positive, forced non-increasing
    let mut sum = 0.0;
    let mut previous = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = if lag == 0 { 1.0 + rho(1) } else { rho(lag) + rho(lag + 1) };
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(previous);
        sum += pair;
        previous = pair;
        lag += 2;
    }
    let tau = (2.0 * sum - 1.0).max(1.0 / total);
    (total / tau).clamp(1.0, total)
}

fn summarize(name: &str, chains: &[&[f64]]) -> ParameterSummary {
    let mut pooled: Vec<f64> = chains.concat();
    let m = mean(&pooled);
    let sd = variance(&pooled).sqrt();
    let same_sign = if m >= 0.0 {
        pooled.iter().filter(|&&x| x > 0.0).count()
    } else {
        pooled.iter().filter(|&&x| x < 0.0).count()
    };
    let f = same_sign as f64 / pooled.len() as f64;
    pooled.sort_by(f64::total_cmp);
    let quantiles = QUANTILES.map(|q| quantile(&pooled, q));

    ParameterSummary {
        name: name.to_string(),
        mean: m,
        sd,
        quantiles,
        overlap0: quantiles[0] <= 0.0 && quantiles[4] >= 0.0,
        f,
        rhat: rhat(chains),
        n_eff: n_eff(chains),
    }
}

impl PosteriorSummary {
    /// Summarise every monitored scalar.
    #[must_use]
    pub fn from_samples(samples: &Samples) -> Self {
        let mut parameters = Vec::with_capacity(samples.names().len());
        for name in samples.names() {
            if let Some(chains) = samples.chains_of(name) {
                parameters.push(summarize(name, &chains));
            }
        }

        let dic = samples.pooled(DEVIANCE).map(|dev| {
            let mean_deviance = mean(&dev);
            let pd = variance(&dev) / 2.0;
            Dic {
                mean_deviance,
                pd,
                dic: mean_deviance + pd,
            }
        });

        Self {
            parameters,
            dic,
            chains: samples.n_chains(),
            kept_per_chain: samples.n_kept(),
        }
    }

    /// Row for a scalar label.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Rows belonging to the named variables (`z` matches `z[1]`, `z[2]`, ...).
    pub fn rows_for<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a ParameterSummary> {
        self.parameters.iter().filter(move |p| {
            names.iter().any(|n| {
                p.name == *n || (p.name.starts_with(n.as_str()) && p.name[n.len()..].starts_with('['))
            })
        })
    }

    /// Largest Rhat among the named variables, ignoring NaN.
    #[must_use]
    pub fn worst_rhat<'a>(&'a self, names: &'a [String]) -> Option<&'a ParameterSummary> {
        self.rows_for(names)
            .filter(|p| !p.rhat.is_nan())
            .max_by(|a, b| a.rhat.total_cmp(&b.rhat))
    }

    /// Require Rhat below `threshold` for the named variables.
    ///
    /// # Errors
    ///
    /// Returns `NotConverged` naming the worst parameter.
    pub fn check_convergence(&self, names: &[String], threshold: f64) -> SimResult<()> {
        match self.worst_rhat(names) {
            Some(worst) if worst.rhat >= threshold => Err(SimError::NotConverged {
                parameter: worst.name.clone(),
                rhat: worst.rhat,
                threshold,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for PosteriorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .parameters
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(8)
            .max(8);
        writeln!(
            f,
            "{:<width$} {:>8} {:>7} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>5} {:>6} {:>6}",
            "", "mean", "sd", "2.5%", "25%", "50%", "75%", "97.5%", "overlap0", "f", "Rhat", "n.eff"
        )?;
        for p in &self.parameters {
            let q = p.quantiles;
            let rhat = if p.rhat.is_nan() {
                "NA".to_string()
            } else {
                format!("{:.3}", p.rhat)
            };
            writeln!(
                f,
                "{:<width$} {:>8.3} {:>7.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8} {:>5.2} {:>6} {:>6.0}",
                p.name,
                p.mean,
                p.sd,
                q[0],
                q[1],
                q[2],
                q[3],
                q[4],
                if p.overlap0 { "TRUE" } else { "FALSE" },
                p.f,
                rhat,
                p.n_eff
            )?;
        }
        if let Some(dic) = &self.dic {
            writeln!(f)?;
            writeln!(f, "DIC info (using the rule pD = var(deviance)/2)")?;
            writeln!(f, "pD = {:.1} and DIC = {:.3}", dic.pd, dic.dic)?;
        }
        Ok(())
    }
}
