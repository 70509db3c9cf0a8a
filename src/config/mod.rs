//! Scenario configuration with YAML schema and validation.
//!
//! Implements Poka-Yoke (mistake-proofing) through:
//! - Type-safe configuration structs
//! - Schema validation via `validator`
//! - Runtime semantic validation (probability ranges, burn-in vs. iterations)
//!
//! # Example
//!
//! ```yaml
//! scenario:
//!   name: model-of-the-mean
//! reproducibility:
//!   seed: 2
//! design:
//!   sites: 100
//!   surveys: 3
//! process:
//!   kind: constant
//!   psi: 0.7
//!   p: 0.4
//! sampling:
//!   chains: 3
//!   iterations: 1000
//!   burn_in: 100
//!   thin: 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::domains::link::LinearPredictor;
use crate::engine::jidoka::check_probability;
use crate::error::{SimError, SimResult};
use crate::mcmc::ChainSettings;
use crate::model::ModelTemplate;

/// Top-level scenario configuration.
///
/// Loaded from YAML files with full schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Scenario metadata.
    #[serde(default)]
    pub scenario: ScenarioMeta,

    /// Reproducibility settings.
    #[serde(default)]
    pub reproducibility: ReproducibilityConfig,

    /// Study design.
    #[validate(nested)]
    #[serde(default)]
    pub design: DesignConfig,

    /// Generative process of the simulated data.
    pub process: ProcessConfig,

    /// MCMC settings.
    #[validate(nested)]
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Which engine fits the model.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl ScenarioConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Serialize back to YAML.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_yaml(&self) -> SimResult<String> {
        serde_yaml::to_string(self).map_err(|e| SimError::serialization(e.to_string()))
    }

    /// Schema and semantic validation.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for schema violations, `InvalidParameter` for
    /// probabilities outside [0, 1] and `Config` for inconsistent settings.
    pub fn check(&self) -> SimResult<()> {
        // Poka-Yoke: validate all constraints
        self.validate()?;
        self.validate_semantic()
    }

    /// Create a builder starting from the model-of-the-mean preset.
    #[must_use]
    pub fn builder() -> ScenarioConfigBuilder {
        ScenarioConfigBuilder::default()
    }

    /// Constant occupancy 0.7 and detection 0.4 over 100 sites and 3
    /// surveys, seed 2.
    #[must_use]
    pub fn model_of_the_mean() -> Self {
        Self {
            schema_version: default_schema_version(),
            scenario: ScenarioMeta {
                name: "model-of-the-mean".to_string(),
                description: "Constant occupancy and detection probabilities".to_string(),
            },
            reproducibility: ReproducibilityConfig { seed: 2 },
            design: DesignConfig::default(),
            process: ProcessConfig::Constant { psi: 0.7, p: 0.4 },
            sampling: SamplingConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Occupancy increasing and detection decreasing with a vegetation
    /// index drawn on [-1, 1].
    #[must_use]
    pub fn vegetation() -> Self {
        Self {
            scenario: ScenarioMeta {
                name: "vegetation".to_string(),
                description: "Occupancy and detection as logit-linear functions of vegetation"
                    .to_string(),
            },
            reproducibility: ReproducibilityConfig { seed: 24 },
            process: ProcessConfig::Covariate {
                covariate: CovariateSpec::default(),
                occupancy: LinearPredictor::linear(0.0, 3.0),
                detection: LinearPredictor::linear(0.0, -5.0),
            },
            ..Self::model_of_the_mean()
        }
    }

    /// Model matching the generative process.
    #[must_use]
    pub fn template(&self) -> ModelTemplate {
        match &self.process {
            ProcessConfig::Constant { .. } => ModelTemplate::ModelOfTheMean,
            ProcessConfig::Covariate {
                covariate,
                occupancy,
                detection,
            } => ModelTemplate::CovariateRegression {
                covariate: covariate.name.clone(),
                occupancy_quadratic: occupancy.is_quadratic(),
                detection_quadratic: detection.is_quadratic(),
            },
        }
    }

    /// Validate semantic constraints beyond schema.
    fn validate_semantic(&self) -> SimResult<()> {
        match &self.process {
            ProcessConfig::Constant { psi, p } => {
                check_probability("psi", *psi)?;
                check_probability("p", *p)?;
            }
            ProcessConfig::Covariate {
                covariate,
                occupancy,
                detection,
            } => {
                if !(covariate.min.is_finite() && covariate.max.is_finite()) {
                    return Err(SimError::config("covariate range must be finite"));
                }
                if covariate.min >= covariate.max {
                    return Err(SimError::config(format!(
                        "covariate min ({}) must be below max ({})",
                        covariate.min, covariate.max
                    )));
                }
                if !is_identifier(&covariate.name) || RESERVED_NAMES.contains(&covariate.name.as_str()) {
                    return Err(SimError::config(format!(
                        "'{}' cannot name the covariate",
                        covariate.name
                    )));
                }
                if !(occupancy.is_finite() && detection.is_finite()) {
                    return Err(SimError::config("regression coefficients must be finite"));
                }
            }
        }

        self.sampling.chain_settings().check()?;
        if self.sampling.rhat_threshold <= 1.0 {
            return Err(SimError::config(format!(
                "rhat_threshold must exceed 1, got {}",
                self.sampling.rhat_threshold
            )));
        }
        if self.sampling.require_convergence && self.sampling.chains < 2 {
            return Err(SimError::config(
                "require_convergence needs at least 2 chains to compute Rhat",
            ));
        }
        Ok(())
    }
}

/// Names the model already uses.
const RESERVED_NAMES: &[&str] = &[
    "y", "z", "R", "T", "i", "j", "psi", "p", "p.eff", "occ.fs", "deviance",
];

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::model_of_the_mean()
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct ScenarioConfigBuilder {
    base: Option<ScenarioConfig>,
    seed: Option<u64>,
    sites: Option<usize>,
    surveys: Option<usize>,
    process: Option<ProcessConfig>,
    sampling: Option<SamplingConfig>,
    engine: Option<EngineConfig>,
}

impl ScenarioConfigBuilder {
    /// Start from an existing configuration instead of the default preset.
    #[must_use]
    pub fn base(mut self, config: ScenarioConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// Set the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of sites.
    #[must_use]
    pub const fn sites(mut self, sites: usize) -> Self {
        self.sites = Some(sites);
        self
    }

    /// Set the number of surveys per site.
    #[must_use]
    pub const fn surveys(mut self, surveys: usize) -> Self {
        self.surveys = Some(surveys);
        self
    }

    /// Constant occupancy and detection probabilities.
    #[must_use]
    pub fn constant(mut self, psi: f64, p: f64) -> Self {
        self.process = Some(ProcessConfig::Constant { psi, p });
        self
    }

    /// Covariate-linked probabilities.
    #[must_use]
    pub fn covariate(
        mut self,
        covariate: CovariateSpec,
        occupancy: LinearPredictor,
        detection: LinearPredictor,
    ) -> Self {
        self.process = Some(ProcessConfig::Covariate {
            covariate,
            occupancy,
            detection,
        });
        self
    }

    /// Set the sampling configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Set the engine configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`ScenarioConfig::check`].
    pub fn build(self) -> SimResult<ScenarioConfig> {
        let mut config = self.base.unwrap_or_default();

        if let Some(seed) = self.seed {
            config.reproducibility.seed = seed;
        }
        if let Some(sites) = self.sites {
            config.design.sites = sites;
        }
        if let Some(surveys) = self.surveys {
            config.design.surveys = surveys;
        }
        if let Some(process) = self.process {
            config.process = process;
        }
        if let Some(sampling) = self.sampling {
            config.sampling = sampling;
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }

        config.check()?;
        Ok(config)
    }
}

/// Scenario metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMeta {
    /// Scenario name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// Reproducibility settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproducibilityConfig {
    /// Master seed for all RNG.
    pub seed: u64,
}

impl Default for ReproducibilityConfig {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

/// Number of sites and repeated surveys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DesignConfig {
    /// Sites R.
    #[validate(range(min = 1, max = 1_000_000))]
    pub sites: usize,
    /// Surveys per site T.
    #[validate(range(min = 1, max = 1000))]
    pub surveys: usize,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            sites: 100,
            surveys: 3,
        }
    }
}

/// Generative process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProcessConfig {
    /// Shared probabilities.
    Constant {
        /// Occupancy probability.
        psi: f64,
        /// Detection probability.
        p: f64,
    },
    /// Logit-linear in a site covariate.
    Covariate {
        /// How the covariate is drawn.
        #[serde(default)]
        covariate: CovariateSpec,
        /// Occupancy predictor.
        occupancy: LinearPredictor,
        /// Detection predictor.
        detection: LinearPredictor,
    },
}

/// Site covariate drawn uniformly on `[min, max)` and sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateSpec {
    /// Data name in the model.
    #[serde(default = "default_covariate_name")]
    pub name: String,
    /// Lower bound.
    #[serde(default = "default_covariate_min")]
    pub min: f64,
    /// Upper bound.
    #[serde(default = "default_covariate_max")]
    pub max: f64,
}

fn default_covariate_name() -> String {
    "veg".to_string()
}

const fn default_covariate_min() -> f64 {
    -1.0
}

const fn default_covariate_max() -> f64 {
    1.0
}

impl Default for CovariateSpec {
    fn default() -> Self {
        Self {
            name: default_covariate_name(),
            min: default_covariate_min(),
            max: default_covariate_max(),
        }
    }
}

/// Chain settings plus the convergence gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct SamplingConfig {
    /// Number of chains.
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Iterations per chain, burn-in included.
    #[validate(range(min = 1))]
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Discarded iterations.
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// Thinning interval.
    #[validate(range(min = 1))]
    #[serde(default = "default_thin")]
    pub thin: usize,
    /// Rhat at or above this fails the run when `require_convergence` is set.
    #[serde(default = "default_rhat_threshold")]
    pub rhat_threshold: f64,
    /// Fail with `NotConverged` instead of only warning.
    #[serde(default = "default_true")]
    pub require_convergence: bool,
}

const fn default_chains() -> usize {
    3
}

const fn default_iterations() -> usize {
    1000
}

const fn default_burn_in() -> usize {
    100
}

const fn default_thin() -> usize {
    5
}

const fn default_rhat_threshold() -> f64 {
    1.1
}

const fn default_true() -> bool {
    true
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            iterations: default_iterations(),
            burn_in: default_burn_in(),
            thin: default_thin(),
            rhat_threshold: default_rhat_threshold(),
            require_convergence: true,
        }
    }
}

impl SamplingConfig {
    /// Engine-facing chain settings.
    #[must_use]
    pub const fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            chains: self.chains,
            iterations: self.iterations,
            burn_in: self.burn_in,
            thin: self.thin,
        }
    }
}

/// Engine choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// In-process Gibbs sampler.
    #[default]
    Builtin,
    /// External JAGS binary.
    Jags,
}

impl EngineKind {
    /// Parse a command-line name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "builtin" => Some(Self::Builtin),
            "jags" => Some(Self::Jags),
            _ => None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine to run.
    #[serde(default)]
    pub kind: EngineKind,
    /// JAGS executable.
    #[serde(default = "default_jags_binary")]
    pub jags_binary: PathBuf,
    /// Keep JAGS scratch files here instead of a temporary directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

fn default_jags_binary() -> PathBuf {
    PathBuf::from("jags")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            jags_binary: default_jags_binary(),
            work_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ScenarioConfig::default();
        assert_eq!(config.reproducibility.seed, 2);
        assert_eq!(config.design.sites, 100);
        assert_eq!(config.design.surveys, 3);
        assert_eq!(config.sampling.chain_settings(), ChainSettings::default());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_vegetation_preset() {
        let config = ScenarioConfig::vegetation();
        assert!(config.check().is_ok());
        assert_eq!(config.template(), ModelTemplate::vegetation(false, false));
    }

    #[test]
    fn test_config_builder() {
        let config = ScenarioConfig::builder()
            .seed(12345)
            .sites(50)
            .constant(0.5, 0.3)
            .build()
            .unwrap();
        assert_eq!(config.reproducibility.seed, 12345);
        assert_eq!(config.design.sites, 50);
        assert_eq!(config.process, ProcessConfig::Constant { psi: 0.5, p: 0.3 });
    }

    #[test]
    fn test_builder_quadratic_template() {
        let config = ScenarioConfig::builder()
            .covariate(
                CovariateSpec::default(),
                LinearPredictor::quadratic(0.0, 2.0, -1.0),
                LinearPredictor::linear(0.0, -1.0),
            )
            .build()
            .unwrap();
        assert_eq!(config.template(), ModelTemplate::vegetation(true, false));
    }

    #[test]
    fn test_config_yaml_parse() {
        let yaml = r"
reproducibility:
  seed: 7
process:
  kind: constant
  psi: 0.6
  p: 0.5
";
        let config = ScenarioConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.reproducibility.seed, 7);
        assert_eq!(config.sampling.thin, 5);
        assert_eq!(config.engine.kind, EngineKind::Builtin);
    }

    #[test]
    fn test_covariate_yaml_parse() {
        let yaml = r"
process:
  kind: covariate
  covariate:
    name: elev
    min: -2.0
    max: 2.0
  occupancy:
    alpha: 0.5
    beta1: 1.0
    beta2: -0.5
  detection:
    alpha: 0.0
    beta1: -1.0
engine:
  kind: jags
  jags_binary: /usr/local/bin/jags
";
        let config = ScenarioConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.engine.kind, EngineKind::Jags);
        assert_eq!(
            config.template(),
            ModelTemplate::CovariateRegression {
                covariate: "elev".to_string(),
                occupancy_quadratic: true,
                detection_quadratic: false,
            }
        );
    }

    #[test]
    fn test_config_rejects_bad_probability() {
        let yaml = "process:\n  kind: constant\n  psi: 1.5\n  p: 0.4\n";
        let err = ScenarioConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { .. }));
    }

    #[test]
    fn test_config_rejects_zero_sites() {
        let yaml = "design:\n  sites: 0\n  surveys: 3\nprocess:\n  kind: constant\n  psi: 0.5\n  p: 0.5\n";
        let err = ScenarioConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SimError::Validation(_)));
    }

    #[test]
    fn test_config_rejects_burn_in_overflow() {
        let yaml = "process:\n  kind: constant\n  psi: 0.5\n  p: 0.5\nsampling:\n  iterations: 100\n  burn_in: 100\n";
        let err = ScenarioConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SimError::Config { .. }));
    }

    #[test]
    fn test_config_rejects_inverted_covariate_range() {
        let result = ScenarioConfig::builder()
            .covariate(
                CovariateSpec {
                    name: "veg".to_string(),
                    min: 1.0,
                    max: -1.0,
                },
                LinearPredictor::linear(0.0, 1.0),
                LinearPredictor::linear(0.0, 1.0),
            )
            .build();
        assert!(matches!(result, Err(SimError::Config { .. })));
    }

    #[test]
    fn test_config_rejects_reserved_covariate_name() {
        let result = ScenarioConfig::builder()
            .covariate(
                CovariateSpec {
                    name: "z".to_string(),
                    ..CovariateSpec::default()
                },
                LinearPredictor::linear(0.0, 1.0),
                LinearPredictor::linear(0.0, 1.0),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_single_chain_gate_rejected() {
        let result = ScenarioConfig::builder()
            .sampling(SamplingConfig {
                chains: 1,
                ..SamplingConfig::default()
            })
            .build();
        assert!(matches!(result, Err(SimError::Config { .. })));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "process:\n  kind: constant\n  psi: 0.5\n  p: 0.5\nbogus: 1\n";
        assert!(matches!(
            ScenarioConfig::from_yaml(yaml),
            Err(SimError::YamlParse(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ScenarioConfig::vegetation();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ScenarioConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_shipped_configs_match_presets() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
        assert_eq!(
            ScenarioConfig::load(dir.join("model_of_the_mean.yaml")).unwrap(),
            ScenarioConfig::model_of_the_mean()
        );
        assert_eq!(
            ScenarioConfig::load(dir.join("vegetation.yaml")).unwrap(),
            ScenarioConfig::vegetation()
        );
        let jags = ScenarioConfig::load(dir.join("vegetation_quadratic_jags.yaml")).unwrap();
        assert_eq!(jags.engine.kind, EngineKind::Jags);
        assert_eq!(jags.template(), ModelTemplate::vegetation(true, false));
    }

    #[test]
    fn test_engine_names() {
        assert_eq!(EngineKind::from_name("jags"), Some(EngineKind::Jags));
        assert_eq!(EngineKind::from_name("builtin"), Some(EngineKind::Builtin));
        assert_eq!(EngineKind::from_name("stan"), None);
    }
}
