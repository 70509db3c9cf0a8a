//! Model text for the two occupancy scenarios.
//!
//! Both templates mirror the simulator: one Bernoulli latent state per site
//! and one Bernoulli detection per survey conditional on it.

use serde::{Deserialize, Serialize};

use super::{Expr, Link, Model, NodeRef, Statement};

/// Which occupancy model to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelTemplate {
    /// Constant `psi` and `p`.
    ModelOfTheMean,
    /// Logit-linear occupancy and detection on one site covariate.
    CovariateRegression {
        /// Data name of the covariate, e.g. `veg`.
        covariate: String,
        /// Add `beta2.occ * x^2` to the occupancy predictor.
        occupancy_quadratic: bool,
        /// Add `beta2.p * x^2` to the detection predictor.
        detection_quadratic: bool,
    },
}

/// Uniform prior bound on regression coefficients.
pub const COEFFICIENT_BOUND: f64 = 10.0;

fn site(name: &str) -> Expr {
    Expr::indexed(name, &["i"])
}

fn uniform_prior(name: &str, lo: f64, hi: f64) -> Statement {
    Statement::stochastic(
        NodeRef::scalar(name),
        "dunif",
        vec![Expr::num(lo), Expr::num(hi)],
    )
}

/// `alpha + beta1 * x [+ beta2 * x^2]` with coefficient names `<coef>.<suffix>`.
fn linear_predictor(suffix: &str, covariate: &str, quadratic: bool) -> Expr {
    let mut eta = Expr::add(
        Expr::var(&format!("alpha.{suffix}")),
        Expr::mul(Expr::var(&format!("beta1.{suffix}")), site(covariate)),
    );
    if quadratic {
        eta = Expr::add(
            eta,
            Expr::mul(
                Expr::var(&format!("beta2.{suffix}")),
                Expr::pow(site(covariate), Expr::num(2.0)),
            ),
        );
    }
    eta
}

/// `for (j in 1:T) { y[i,j] ~ dbern(p.eff[i]) }`
fn survey_loop() -> Statement {
    Statement::for_loop(
        "j",
        Expr::num(1.0),
        Expr::var("T"),
        vec![Statement::stochastic(
            NodeRef::indexed("y", &["i", "j"]),
            "dbern",
            vec![site("p.eff")],
        )],
    )
}

impl ModelTemplate {
    /// Covariate template named `veg`.
    #[must_use]
    pub fn vegetation(occupancy_quadratic: bool, detection_quadratic: bool) -> Self {
        Self::CovariateRegression {
            covariate: "veg".to_string(),
            occupancy_quadratic,
            detection_quadratic,
        }
    }

    /// Build the model AST.
    #[must_use]
    pub fn build(&self) -> Model {
        match self {
            Self::ModelOfTheMean => Self::mean_model(),
            Self::CovariateRegression {
                covariate,
                occupancy_quadratic,
                detection_quadratic,
            } => Self::covariate_model(covariate, *occupancy_quadratic, *detection_quadratic),
        }
    }

    fn mean_model() -> Model {
        Model::new(vec![
            uniform_prior("psi", 0.0, 1.0),
            uniform_prior("p", 0.0, 1.0),
            Statement::for_loop(
                "i",
                Expr::num(1.0),
                Expr::var("R"),
                vec![
                    Statement::stochastic(NodeRef::indexed("z", &["i"]), "dbern", vec![Expr::var("psi")]),
                    Statement::deterministic(
                        NodeRef::indexed("p.eff", &["i"]),
                        Expr::mul(site("z"), Expr::var("p")),
                    ),
                    survey_loop(),
                ],
            ),
        ])
    }

    fn covariate_model(covariate: &str, occ_quad: bool, det_quad: bool) -> Model {
        let mut statements: Vec<Statement> = Self::coefficient_names(occ_quad, det_quad)
            .iter()
            .map(|name| uniform_prior(name, -COEFFICIENT_BOUND, COEFFICIENT_BOUND))
            .collect();

        statements.push(Statement::for_loop(
            "i",
            Expr::num(1.0),
            Expr::var("R"),
            vec![
                Statement::linked(
                    Link::Logit,
                    NodeRef::indexed("psi", &["i"]),
                    linear_predictor("occ", covariate, occ_quad),
                ),
                Statement::linked(
                    Link::Logit,
                    NodeRef::indexed("p", &["i"]),
                    linear_predictor("p", covariate, det_quad),
                ),
                Statement::stochastic(NodeRef::indexed("z", &["i"]), "dbern", vec![site("psi")]),
                Statement::deterministic(
                    NodeRef::indexed("p.eff", &["i"]),
                    Expr::mul(site("z"), site("p")),
                ),
                survey_loop(),
            ],
        ));

        statements.push(Statement::deterministic(
            NodeRef::scalar("occ.fs"),
            Expr::call("sum", vec![Expr::all("z")]),
        ));
        Model::new(statements)
    }

    fn coefficient_names(occ_quad: bool, det_quad: bool) -> Vec<String> {
        let mut names = vec!["alpha.occ".to_string(), "beta1.occ".to_string()];
        if occ_quad {
            names.push("beta2.occ".to_string());
        }
        names.push("alpha.p".to_string());
        names.push("beta1.p".to_string());
        if det_quad {
            names.push("beta2.p".to_string());
        }
        names
    }

    /// Scalar parameters monitored by default (excluding `deviance`).
    #[must_use]
    pub fn parameters(&self) -> Vec<String> {
        match self {
            Self::ModelOfTheMean => vec!["psi".to_string(), "p".to_string()],
            Self::CovariateRegression {
                occupancy_quadratic,
                detection_quadratic,
                ..
            } => {
                let mut names = Self::coefficient_names(*occupancy_quadratic, *detection_quadratic);
                names.push("occ.fs".to_string());
                names
            }
        }
    }

    /// Names the data set must provide.
    #[must_use]
    pub fn data_names(&self) -> Vec<String> {
        let mut names = vec!["y".to_string(), "R".to_string(), "T".to_string()];
        if let Self::CovariateRegression { covariate, .. } = self {
            names.push(covariate.clone());
        }
        names
    }

    /// Short human label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ModelOfTheMean => "model of the mean",
            Self::CovariateRegression { .. } => "covariate regression",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_model;

    #[test]
    fn test_mean_model_text() {
        let text = ModelTemplate::ModelOfTheMean.build().to_string();
        let expected = "model {
  psi ~ dunif(0, 1)
  p ~ dunif(0, 1)
  for (i in 1:R) {
    z[i] ~ dbern(psi)
    p.eff[i] <- z[i] * p
    for (j in 1:T) {
      y[i,j] ~ dbern(p.eff[i])
    }
  }
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_covariate_model_text() {
        let text = ModelTemplate::vegetation(true, false).build().to_string();
        assert!(text.contains("alpha.occ ~ dunif(-10, 10)"));
        assert!(text.contains("beta2.occ ~ dunif(-10, 10)"));
        assert!(!text.contains("beta2.p"));
        assert!(text.contains(
            "logit(psi[i]) <- alpha.occ + beta1.occ * veg[i] + beta2.occ * veg[i]^2"
        ));
        assert!(text.contains("logit(p[i]) <- alpha.p + beta1.p * veg[i]\n"));
        assert!(text.contains("p.eff[i] <- z[i] * p[i]"));
        assert!(text.contains("occ.fs <- sum(z[])"));
    }

    #[test]
    fn test_templates_round_trip() {
        for template in [
            ModelTemplate::ModelOfTheMean,
            ModelTemplate::vegetation(false, false),
            ModelTemplate::vegetation(true, true),
        ] {
            let model = template.build();
            assert_eq!(parse_model(&model.to_string()).unwrap(), model);
        }
    }

    #[test]
    fn test_parameters() {
        assert_eq!(ModelTemplate::ModelOfTheMean.parameters(), vec!["psi", "p"]);
        assert_eq!(
            ModelTemplate::vegetation(false, true).parameters(),
            vec!["alpha.occ", "beta1.occ", "alpha.p", "beta1.p", "beta2.p", "occ.fs"]
        );
    }

    #[test]
    fn test_parameters_are_defined_by_model() {
        let template = ModelTemplate::vegetation(true, true);
        let model = template.build();
        let mut defined = model.stochastic_names();
        defined.extend(model.deterministic_names());
        for name in template.parameters() {
            assert!(defined.contains(&name), "{name} not defined");
        }
    }

    #[test]
    fn test_data_names() {
        assert_eq!(ModelTemplate::ModelOfTheMean.data_names(), vec!["y", "R", "T"]);
        assert_eq!(
            ModelTemplate::vegetation(false, false).data_names(),
            vec!["y", "R", "T", "veg"]
        );
    }

    #[test]
    fn test_yaml_tagging() {
        let t: ModelTemplate = serde_yaml::from_str("kind: model_of_the_mean").unwrap();
        assert_eq!(t, ModelTemplate::ModelOfTheMean);
    }
}
