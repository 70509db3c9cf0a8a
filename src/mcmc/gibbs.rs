//! In-process single-site Gibbs sampler.
//!
//! Each sweep visits the latent stochastic nodes in topological order and
//! draws each from its full conditional:
//!
//! - **finite discrete** (`dbern`, `dbin`): exact draw by enumerating the
//!   support
//! - **everything else**: stepping-out slice sampler (Neal 2003). Counts
//!   are handled by slicing the piecewise-constant extension
//!   `f(floor(x))`.
//!
//! Slice widths adapt during burn-in only, so the kept draws come from a
//! fixed transition kernel.

use rand_distr::Exp1;
use tracing::{debug, info};

use super::distributions::{Family, Support};
use super::graph::Graph;
use super::samples::{ChainTrace, Samples};
use super::{ChainSettings, Inits, McmcEngine, SamplerJob, DEVIANCE};
use crate::engine::jidoka::SweepGuard;
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

/// Stepping-out and shrinkage limits of the slice sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceSettings {
    /// Starting interval width.
    pub initial_width: f64,
    /// Maximum steps taken outward on each side, in total.
    pub max_steps_out: usize,
    /// Maximum shrinkage proposals before giving up.
    pub max_shrink: usize,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            initial_width: 1.0,
            max_steps_out: 10,
            max_shrink: 200,
        }
    }
}

/// Built-in engine.
///
/// # Example
///
/// ```rust
/// use occusim::mcmc::{ChainSettings, DataSet, GibbsEngine, Inits, McmcEngine, SamplerJob};
/// use occusim::model::Model;
///
/// let model: Model = "model { mu ~ dnorm(0, 1) }".parse()?;
/// let job = SamplerJob {
///     model,
///     data: DataSet::new(),
///     monitor: vec!["mu".to_string()],
///     inits: vec![Inits { values: DataSet::new(), seed: 1 }],
///     settings: ChainSettings { chains: 1, iterations: 200, burn_in: 100, thin: 1 },
/// };
/// let samples = GibbsEngine::new().run(&job)?;
/// assert_eq!(samples.n_kept(), 100);
/// # Ok::<(), occusim::SimError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct GibbsEngine {
    slice: SliceSettings,
}

impl GibbsEngine {
    /// Engine with default slice settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with custom slice settings.
    #[must_use]
    pub const fn with_slice_settings(slice: SliceSettings) -> Self {
        Self { slice }
    }

    fn run_chain(
        &self,
        graph: &Graph,
        monitors: &[(String, Option<usize>)],
        inits: &Inits,
        settings: &ChainSettings,
        chain: usize,
    ) -> SimResult<ChainTrace> {
        let mut rng = SimRng::new(inits.seed);
        let mut state = graph.initialize(&inits.values, &mut rng)?;

        let mut updaters: Vec<Updater> = graph
            .latent_nodes()
            .map(|i| Updater::new(graph, i, &state, self.slice.initial_width))
            .collect();

        let mut guard = SweepGuard::new();
        let mut trace = ChainTrace::new(monitors.len());
        let mut row = vec![0.0; monitors.len()];

        for t in 1..=settings.iterations {
            let adapting = t <= settings.burn_in;
            for updater in &mut updaters {
                updater.update(graph, &mut state, &mut rng, &self.slice, adapting)?;
            }
            if settings.keeps(t) {
                for (value, (_, cell)) in row.iter_mut().zip(monitors) {
                    *value = match cell {
                        Some(c) => state[*c],
                        None => -2.0 * graph.log_likelihood(&state),
                    };
                }
                guard.check(monitors.iter().map(|(l, _)| l.as_str()).zip(row.iter().copied()))?;
                trace.push(&row)?;
            }
        }

        debug!(
            chain = chain + 1,
            sweeps = guard.sweeps(),
            kept = trace.len(),
            "chain finished"
        );
        Ok(trace)
    }
}

impl McmcEngine for GibbsEngine {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn run(&self, job: &SamplerJob) -> SimResult<Samples> {
        job.check()?;
        let graph = Graph::compile(&job.model, &job.data)?;

        let mut monitors: Vec<(String, Option<usize>)> = Vec::new();
        for name in &job.monitor {
            if name == DEVIANCE {
                monitors.push((DEVIANCE.to_string(), None));
            } else {
                monitors.extend(
                    graph
                        .monitor_cells(name)?
                        .into_iter()
                        .map(|(label, cell)| (label, Some(cell))),
                );
            }
        }

        let settings = &job.settings;
        info!(
            engine = self.name(),
            chains = settings.chains,
            iterations = settings.iterations,
            burn_in = settings.burn_in,
            thin = settings.thin,
            latent = graph.latent_nodes().count(),
            monitored = monitors.len(),
            "running chains"
        );

        let chains = job
            .inits
            .iter()
            .enumerate()
            .map(|(c, inits)| self.run_chain(&graph, &monitors, inits, settings, c))
            .collect::<SimResult<Vec<_>>>()?;

        let names = monitors.into_iter().map(|(label, _)| label).collect();
        Samples::new(names, chains)
    }
}

#[derive(Debug, Clone)]
enum Method {
    Enumerate,
    Slice {
        width: f64,
        discrete: bool,
        jumps: f64,
        adapted: usize,
    },
}

#[derive(Debug, Clone)]
struct Updater {
    node: usize,
    method: Method,
}

/// Log full conditional of node `i` at `x`: own density plus children.
fn conditional(graph: &Graph, i: usize, x: f64, state: &mut [f64]) -> f64 {
    state[graph.nodes()[i].cell] = x;
    graph.refresh(i, state);
    let own = graph.log_density(i, state);
    if own == f64::NEG_INFINITY {
        return own;
    }
    own + graph
        .children(i)
        .iter()
        .map(|&c| graph.log_density(c, state))
        .sum::<f64>()
}

impl Updater {
    fn new(graph: &Graph, node: usize, state: &[f64], width: f64) -> Self {
        let family = graph.params(node, state).map(|(f, _)| f);
        let method = match family {
            Some(Family::Bern | Family::Bin) => Method::Enumerate,
            other => Method::Slice {
                width,
                discrete: other.is_some_and(Family::is_discrete),
                jumps: 0.0,
                adapted: 0,
            },
        };
        Self { node, method }
    }

    fn update(
        &mut self,
        graph: &Graph,
        state: &mut [f64],
        rng: &mut SimRng,
        slice: &SliceSettings,
        adapting: bool,
    ) -> SimResult<()> {
        match &mut self.method {
            Method::Enumerate => enumerate(graph, self.node, state, rng),
            Method::Slice {
                width,
                discrete,
                jumps,
                adapted,
            } => {
                let jump = slice_step(graph, self.node, state, rng, *width, *discrete, slice)?;
                if adapting {
                    *jumps += jump;
                    *adapted += 1;
                    if *jumps > 0.0 {
                        *width = 2.0 * *jumps / *adapted as f64;
                    }
                }
                Ok(())
            }
        }
    }
}

fn enumerate(graph: &Graph, i: usize, state: &mut [f64], rng: &mut SimRng) -> SimResult<()> {
    let label = &graph.nodes()[i].label;
    let (lo, hi) = match graph.params(i, state).map(|(f, p)| f.support(&p)) {
        Some(Support::Finite { lo, hi }) => (lo, hi),
        _ => return Err(SimError::sampler(format!("no finite support for '{label}'"))),
    };

    let log_weights: Vec<f64> = (lo..=hi)
        .map(|v| conditional(graph, i, v as f64, state))
        .collect();
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(SimError::InconsistentNode {
            node: label.clone(),
        });
    }

    let weights: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    let chosen = pick_index(&weights, rng.gen_f64() * total)
        .and_then(|k| (lo..=hi).nth(k))
        .ok_or_else(|| SimError::InconsistentNode {
            node: label.clone(),
        })?;

    state[graph.nodes()[i].cell] = chosen as f64;
    graph.refresh(i, state);
    Ok(())
}

/// Bucket of unnormalised `weights` containing `u`.
///
/// Rounding can leave `u` past the last bucket; the last value with
/// non-zero weight is taken then.
fn pick_index(weights: &[f64], mut u: f64) -> Option<usize> {
    for (k, &w) in weights.iter().enumerate() {
        if u < w {
            return Some(k);
        }
        u -= w;
    }
    weights.iter().rposition(|&w| w > 0.0)
}

/// One slice-sampling update; returns the absolute jump.
fn slice_step(
    graph: &Graph,
    i: usize,
    state: &mut [f64],
    rng: &mut SimRng,
    width: f64,
    discrete: bool,
    settings: &SliceSettings,
) -> SimResult<f64> {
    let current = state[graph.nodes()[i].cell];
    let x0 = if discrete { current + rng.gen_f64() } else { current };
    let at = |x: f64| if discrete { x.floor() } else { x };

    let level: f64 = rng.sample(&Exp1);
    let log_y = conditional(graph, i, at(x0), state) - level;

    let mut left = x0 - width * rng.gen_f64();
    let mut right = left + width;
    let mut steps_left = (settings.max_steps_out as f64 * rng.gen_f64()) as usize;
    let mut steps_right = settings.max_steps_out.saturating_sub(1 + steps_left);
    while steps_left > 0 && conditional(graph, i, at(left), state) > log_y {
        left -= width;
        steps_left -= 1;
    }
    while steps_right > 0 && conditional(graph, i, at(right), state) > log_y {
        right += width;
        steps_right -= 1;
    }

    for _ in 0..settings.max_shrink {
        let x1 = left + rng.gen_f64() * (right - left);
        if conditional(graph, i, at(x1), state) > log_y {
            // state already holds at(x1) with dependents refreshed
            return Ok((at(x1) - at(x0)).abs());
        }
        if x1 < x0 {
            left = x1;
        } else {
            right = x1;
        }
    }

    conditional(graph, i, current, state);
    Err(SimError::sampler(format!(
        "slice sampler for '{}' found no point after {} shrinkage steps",
        graph.nodes()[i].label,
        settings.max_shrink
    )))
}
