//! Inference driver: simulated data + model template → engine → summary.
//!
//! The driver owns every engine-facing convention:
//!
//! - `y` is passed column-major with dims `[R, T]`, plus scalars `R`, `T`
//!   and the covariate vector when the template uses one
//! - `z` starts at the naive per-site maximum so no detection sits on an
//!   unoccupied site
//! - other stochastic parameters start at uniform draws from a per-chain
//!   stream of [`SimRng::partition`]

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::domains::occupancy::SimulatedData;
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};
use crate::mcmc::{
    Array, DataSet, Inits, McmcEngine, PosteriorSummary, SamplerJob, Samples, DEVIANCE,
};
use crate::model::{Model, ModelTemplate};

/// Range of the uniform inits drawn for regression coefficients.
pub const COEFFICIENT_INIT_RANGE: (f64, f64) = (-3.0, 3.0);

/// Engine output for one scenario.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Model text as submitted.
    pub model_text: String,
    /// Names monitored, `deviance` last.
    pub monitor: Vec<String>,
    /// Raw draws.
    pub samples: Samples,
    /// Posterior table.
    pub summary: PosteriorSummary,
    /// Whether every stochastic parameter passed the Rhat gate.
    pub converged: bool,
}

/// Hands data and model to an engine.
pub struct InferenceDriver<'a> {
    engine: &'a dyn McmcEngine,
    sampling: SamplingConfig,
    model_dir: Option<PathBuf>,
}

impl<'a> InferenceDriver<'a> {
    /// Driver for `engine` with the given sampling settings.
    #[must_use]
    pub fn new(engine: &'a dyn McmcEngine, sampling: SamplingConfig) -> Self {
        Self {
            engine,
            sampling,
            model_dir: None,
        }
    }

    /// Write the transient model file under `dir` instead of the system
    /// temporary directory.
    #[must_use]
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    /// Fit `template` to `data`.
    ///
    /// `rng` only supplies the per-chain init streams; the data must
    /// already be drawn.
    ///
    /// # Errors
    ///
    /// - `Io` if the model file cannot be written or read back
    /// - engine errors (`InconsistentNode`, `Compile`, `Engine`, ...)
    /// - `NotConverged` when convergence is required and a monitored
    ///   parameter (derived ones included) has Rhat at or above the
    ///   threshold
    pub fn fit(
        &self,
        template: &ModelTemplate,
        data: &SimulatedData,
        rng: &mut SimRng,
    ) -> SimResult<FitResult> {
        let model = self.round_trip_model(&template.build())?;
        let model_text = model.to_string();
        let monitor = monitors(template);

        let job = SamplerJob {
            data: build_data(template, data)?,
            inits: build_inits(template, data, rng, self.sampling.chains),
            monitor: monitor.clone(),
            settings: self.sampling.chain_settings(),
            model,
        };

        info!(
            engine = self.engine.name(),
            model = template.label(),
            sites = data.sites(),
            "submitting model"
        );
        let samples = self.engine.run(&job)?;
        let summary = PosteriorSummary::from_samples(&samples);

        let gated = gated_parameters(&monitor);
        let converged = match summary.check_convergence(&gated, self.sampling.rhat_threshold) {
            Ok(()) => true,
            Err(err) if self.sampling.require_convergence => return Err(err),
            Err(err) => {
                warn!(%err, "continuing without convergence");
                false
            }
        };
        info!(
            kept = samples.n_kept(),
            chains = samples.n_chains(),
            converged,
            "posterior summarised"
        );

        Ok(FitResult {
            model_text,
            monitor,
            samples,
            summary,
            converged,
        })
    }

    /// Write the model to a transient file and parse it back.
    fn round_trip_model(&self, model: &Model) -> SimResult<Model> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("occusim-model-").suffix(".txt");
        let file = match &self.model_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        model.write_to(file.path())?;
        debug!(path = %file.path().display(), "model file written");
        Model::read_from(file.path())
    }
}

/// Monitored names: template parameters then `deviance`.
#[must_use]
pub fn monitors(template: &ModelTemplate) -> Vec<String> {
    let mut names = template.parameters();
    names.push(DEVIANCE.to_string());
    names
}

/// Monitored names subject to the Rhat gate: everything but `deviance`.
fn gated_parameters(monitor: &[String]) -> Vec<String> {
    monitor
        .iter()
        .filter(|m| m.as_str() != DEVIANCE)
        .cloned()
        .collect()
}

/// Engine data set for `template`.
///
/// # Errors
///
/// Returns `DimensionMismatch` when the template needs a covariate the
/// data does not carry.
pub fn build_data(template: &ModelTemplate, data: &SimulatedData) -> SimResult<DataSet> {
    let sites = data.y.sites();
    let surveys = data.y.surveys();
    let mut set = DataSet::new()
        .with(
            "y",
            Array::from_column_major(vec![sites, surveys], data.y.to_column_major())?,
        )
        .with("R", Array::scalar(sites as f64))
        .with("T", Array::scalar(surveys as f64));

    if let ModelTemplate::CovariateRegression { covariate, .. } = template {
        let values = data.covariate.as_ref().ok_or_else(|| {
            SimError::dimension_mismatch(covariate.as_str(), format!("{sites} values"), 0)
        })?;
        set.insert(covariate.as_str(), Array::vector(values.clone()));
    }
    Ok(set)
}

/// One set of inits per chain, each from its own stream.
#[must_use]
pub fn build_inits(
    template: &ModelTemplate,
    data: &SimulatedData,
    rng: &mut SimRng,
    chains: usize,
) -> Vec<Inits> {
    let z: Vec<f64> = data.naive_z().into_iter().map(f64::from).collect();
    rng.partition(chains)
        .into_iter()
        .map(|mut stream| {
            let mut values = DataSet::new().with("z", Array::vector(z.clone()));
            for name in template.parameters() {
                let value = match (template, name.as_str()) {
                    (_, "occ.fs") => continue,
                    (ModelTemplate::ModelOfTheMean, _) => stream.gen_f64(),
                    (ModelTemplate::CovariateRegression { .. }, _) => stream
                        .gen_range_f64(COEFFICIENT_INIT_RANGE.0, COEFFICIENT_INIT_RANGE.1),
                };
                values.insert(name, Array::scalar(value));
            }
            Inits {
                values,
                seed: stream.gen_u64(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::occupancy::{DetectionMatrix, OccupancyProcess, OccupancySimulator};
    use crate::mcmc::samples::ChainTrace;
    use crate::mcmc::GibbsEngine;

    fn tiny_data() -> SimulatedData {
        SimulatedData {
            z: vec![1, 1, 0],
            y: DetectionMatrix::from_rows(&[vec![1, 0], vec![0, 0], vec![0, 0]]).unwrap(),
            psi: vec![0.5; 3],
            p: vec![0.5; 3],
            covariate: Some(vec![-0.5, 0.0, 0.5]),
        }
    }

    fn quick_sampling() -> SamplingConfig {
        SamplingConfig {
            chains: 2,
            iterations: 300,
            burn_in: 100,
            thin: 2,
            rhat_threshold: 1.1,
            require_convergence: false,
        }
    }

    #[test]
    fn test_build_data_layout() {
        let set = build_data(&ModelTemplate::ModelOfTheMean, &tiny_data()).unwrap();
        let y = set.get("y").unwrap();
        assert_eq!(y.dims(), &[3, 2]);
        assert_eq!(y.get(&[1, 1]), Some(1.0));
        assert_eq!(set.get("R").and_then(Array::first), Some(3.0));
        assert_eq!(set.get("T").and_then(Array::first), Some(2.0));
        assert!(!set.contains("veg"));
    }

    #[test]
    fn test_build_data_covariate() {
        let set = build_data(&ModelTemplate::vegetation(false, false), &tiny_data()).unwrap();
        assert_eq!(set.get("veg").map(Array::len), Some(3));

        let mut data = tiny_data();
        data.covariate = None;
        let err = build_data(&ModelTemplate::vegetation(false, false), &data).unwrap_err();
        assert!(matches!(err, SimError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_inits_are_consistent_and_distinct() {
        let data = tiny_data();
        let inits = build_inits(&ModelTemplate::ModelOfTheMean, &data, &mut SimRng::new(1), 3);
        assert_eq!(inits.len(), 3);
        for init in &inits {
            assert_eq!(init.values.get("z").unwrap().values(), &[1.0, 0.0, 0.0]);
            let psi = init.values.get("psi").and_then(Array::first).unwrap();
            assert!((0.0..1.0).contains(&psi));
        }
        assert_ne!(inits[0].seed, inits[1].seed);
        assert_ne!(
            inits[0].values.get("p").and_then(Array::first),
            inits[1].values.get("p").and_then(Array::first)
        );
    }

    #[test]
    fn test_covariate_inits_skip_derived() {
        let inits = build_inits(
            &ModelTemplate::vegetation(true, false),
            &tiny_data(),
            &mut SimRng::new(1),
            1,
        );
        let values = &inits[0].values;
        assert!(values.contains("beta2.occ"));
        assert!(!values.contains("beta2.p"));
        assert!(!values.contains("occ.fs"));
        let a = values.get("alpha.occ").and_then(Array::first).unwrap();
        assert!((-3.0..3.0).contains(&a));
    }

    #[test]
    fn test_monitors_end_with_deviance() {
        let names = monitors(&ModelTemplate::ModelOfTheMean);
        assert_eq!(names, vec!["psi", "p", "deviance"]);
    }

    /// Returns draws where only `occ.fs` (and `deviance`) differ between
    /// chains.
    struct SplitDerivedEngine;

    impl McmcEngine for SplitDerivedEngine {
        fn name(&self) -> &'static str {
            "split-derived"
        }

        fn run(&self, job: &SamplerJob) -> SimResult<Samples> {
            let chains = (0..job.settings.chains)
                .map(|k| -> SimResult<ChainTrace> {
                    let mut trace = ChainTrace::new(job.monitor.len());
                    for t in 0..60 {
                        let row: Vec<f64> = job
                            .monitor
                            .iter()
                            .map(|name| match name.as_str() {
                                "occ.fs" | DEVIANCE => 10.0 * (k + 1) as f64 + (t % 2) as f64,
                                _ => 0.1 * (t % 5) as f64,
                            })
                            .collect();
                        trace.push(&row)?;
                    }
                    Ok(trace)
                })
                .collect::<SimResult<Vec<_>>>()?;
            Samples::new(job.monitor.clone(), chains)
        }
    }

    #[test]
    fn test_gate_covers_derived_nodes() {
        let template = ModelTemplate::vegetation(false, false);
        let gated = gated_parameters(&monitors(&template));
        assert!(gated.contains(&"alpha.occ".to_string()));
        assert!(gated.contains(&"occ.fs".to_string()));
        assert!(!gated.contains(&DEVIANCE.to_string()));
    }

    #[test]
    fn test_unconverged_derived_monitor_fails_fit() {
        let template = ModelTemplate::vegetation(false, false);
        let sampling = SamplingConfig {
            require_convergence: true,
            ..quick_sampling()
        };
        let dir = tempfile::tempdir().unwrap();
        let engine = SplitDerivedEngine;
        let driver = InferenceDriver::new(&engine, sampling).with_model_dir(dir.path());

        let err = driver
            .fit(&template, &tiny_data(), &mut SimRng::new(3))
            .unwrap_err();
        match err {
            SimError::NotConverged { parameter, .. } => assert_eq!(parameter, "occ.fs"),
            other => panic!("expected NotConverged, got {other}"),
        }

        let lenient = InferenceDriver::new(&engine, quick_sampling()).with_model_dir(dir.path());
        let fit = lenient
            .fit(&template, &tiny_data(), &mut SimRng::new(3))
            .unwrap();
        assert!(!fit.converged);
    }

    #[test]
    fn test_fit_mean_model() {
        let sim = OccupancySimulator::new(30, 3, OccupancyProcess::Constant { psi: 0.6, p: 0.5 })
            .unwrap();
        let mut rng = SimRng::new(5);
        let data = sim.simulate(&mut rng).unwrap();
        let engine = GibbsEngine::new();
        let dir = tempfile::tempdir().unwrap();
        let driver = InferenceDriver::new(&engine, quick_sampling()).with_model_dir(dir.path());

        let fit = driver
            .fit(&ModelTemplate::ModelOfTheMean, &data, &mut rng)
            .unwrap();
        assert_eq!(fit.samples.n_chains(), 2);
        assert_eq!(fit.samples.n_kept(), 100);
        assert!(fit.model_text.starts_with("model {"));
        let psi = fit.summary.get("psi").unwrap();
        assert!(psi.mean > 0.0 && psi.mean < 1.0);
        assert!(fit.summary.dic.is_some());
    }
}
