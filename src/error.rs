//! Error types for occusim.
//!
//! Every fallible operation returns `Result<T, SimError>` instead of
//! panicking. A failing stage aborts its scenario; nothing here attempts
//! recovery.

use thiserror::Error;

/// Result type alias for occusim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Unified error type for all occusim operations.
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Parameter Errors =====
    /// A probability or count outside its admissible range.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// Array dimensions that do not agree.
    #[error("Dimension mismatch for '{name}': expected {expected}, found {found}")]
    DimensionMismatch {
        /// Name of the array.
        name: String,
        /// Expected length or shape.
        expected: String,
        /// Actual length or shape.
        found: String,
    },

    /// Numerical instability detected (NaN or Inf).
    #[error("Non-finite value detected at {location}")]
    NonFiniteValue {
        /// Location where the non-finite value was detected.
        location: String,
    },

    // ===== Configuration Errors =====
    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // ===== Model Errors =====
    /// Model text could not be parsed.
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        /// 1-based line.
        line: usize,
        /// 1-based column.
        column: usize,
        /// Description of the problem.
        message: String,
    },

    /// Model could not be compiled into a node graph.
    #[error("Compilation error: {0}")]
    Compile(String),

    // ===== Engine Errors =====
    /// Initial state has zero probability under the model.
    #[error("Node inconsistent with parents: {node} has zero probability")]
    InconsistentNode {
        /// Node label, e.g. `y[3,1]`.
        node: String,
    },

    /// A sampler failed to produce a draw.
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// The external engine failed.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Chains did not mix.
    #[error("Not converged: Rhat for '{parameter}' is {rhat:.3} (threshold {threshold:.3})")]
    NotConverged {
        /// Monitored scalar with the worst diagnostic.
        parameter: String,
        /// Its potential scale reduction factor.
        rhat: f64,
        /// Configured threshold.
        threshold: f64,
    },

    // ===== I/O Errors =====
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Create an invalid-parameter error.
    #[must_use]
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a dimension-mismatch error.
    #[must_use]
    pub fn dimension_mismatch(
        name: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::DimensionMismatch {
            name: name.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a compilation error.
    #[must_use]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create a sampler error.
    #[must_use]
    pub fn sampler(message: impl Into<String>) -> Self {
        Self::Sampler(message.into())
    }

    /// Create an engine error.
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Check if this error reports bad user input rather than a run failure.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::DimensionMismatch { .. }
                | Self::Config { .. }
                | Self::YamlParse(_)
                | Self::Validation(_)
                | Self::Parse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_detection() {
        assert!(SimError::invalid_parameter("psi", "must be in [0, 1]").is_input_error());
        assert!(SimError::dimension_mismatch("veg", 100, 99).is_input_error());
        assert!(SimError::config("bad").is_input_error());

        let inconsistent = SimError::InconsistentNode {
            node: "y[1,1]".to_string(),
        };
        assert!(!inconsistent.is_input_error());
        assert!(!SimError::engine("crashed").is_input_error());
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = SimError::invalid_parameter("p", "1.5 is outside [0, 1]");
        let msg = err.to_string();
        assert!(msg.contains("Invalid parameter 'p'"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = SimError::dimension_mismatch("y", "100x3", "100x2");
        let msg = err.to_string();
        assert!(msg.contains("expected 100x3"));
        assert!(msg.contains("found 100x2"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = SimError::Parse {
            line: 3,
            column: 7,
            message: "expected ')'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parse error at line 3, column 7: expected ')'"
        );
    }

    #[test]
    fn test_inconsistent_node_display() {
        let err = SimError::InconsistentNode {
            node: "y[4,2]".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("y[4,2]"));
        assert!(msg.contains("zero probability"));
    }

    #[test]
    fn test_not_converged_display() {
        let err = SimError::NotConverged {
            parameter: "beta1.p".to_string(),
            rhat: 1.234_56,
            threshold: 1.1,
        };
        let msg = err.to_string();
        assert!(msg.contains("beta1.p"));
        assert!(msg.contains("1.235"));
        assert!(msg.contains("1.100"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "model.txt");
        let err: SimError = io.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_helper_constructors() {
        assert!(SimError::compile("cycle").to_string().contains("Compilation error"));
        assert!(SimError::sampler("stuck").to_string().contains("Sampler error"));
        assert!(SimError::engine("exit 1").to_string().contains("Engine error"));
        assert!(SimError::serialization("json")
            .to_string()
            .contains("Serialization error"));
    }
}
