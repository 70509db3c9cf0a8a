//! Declarative model specification (BUGS dialect).
//!
//! A model is a list of three statement kinds:
//!
//! ```text
//! x ~ dist(args)              stochastic node
//! x <- expr                   deterministic node
//! logit(x) <- expr            deterministic node through a link
//! for (i in a:b) { ... }      bounded iteration
//! ```
//!
//! The AST is rendered by [`std::fmt::Display`] (see `writer`) and read back
//! by [`parser::parse_model`]. For every model built through the
//! constructors here, `parse(render(m)) == m`.

pub mod parser;
pub mod templates;
mod writer;

use std::path::Path;
use std::str::FromStr;

use crate::error::{SimError, SimResult};

pub use parser::parse_model;
pub use templates::ModelTemplate;

/// A complete model: the statements inside `model { ... }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    /// Top-level statements in source order.
    pub statements: Vec<Statement>,
}

/// One model statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `target ~ distribution`
    Stochastic {
        /// Node being defined.
        target: NodeRef,
        /// Its distribution.
        distribution: DistributionCall,
    },
    /// `target <- expr` or `link(target) <- expr`
    Deterministic {
        /// Node being defined.
        target: NodeRef,
        /// Optional link applied on the left-hand side.
        link: Option<Link>,
        /// Right-hand side.
        expr: Expr,
    },
    /// `for (var in from:to) { body }`
    For {
        /// Loop counter name.
        var: String,
        /// First value (inclusive).
        from: Expr,
        /// Last value (inclusive).
        to: Expr,
        /// Loop body.
        body: Vec<Statement>,
    },
}

/// Distribution name and parameter expressions, e.g. `dbern(psi)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionCall {
    /// Distribution name, e.g. `dbern`.
    pub name: String,
    /// Parameters in declaration order.
    pub args: Vec<Expr>,
}

/// Link function allowed on the left of `<-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// `logit(x) <- eta` means `x = ilogit(eta)`.
    Logit,
    /// `log(x) <- eta` means `x = exp(eta)`.
    Log,
}

impl Link {
    /// Keyword as written in model text.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Logit => "logit",
            Self::Log => "log",
        }
    }

    /// Look up a link by keyword.
    #[must_use]
    pub fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "logit" => Some(Self::Logit),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

/// Reference to a (possibly indexed) variable: `psi`, `z[i]`, `y[i,j]`, `z[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    /// Variable name.
    pub name: String,
    /// Subscripts; empty for a scalar.
    pub indices: Vec<Index>,
}

impl NodeRef {
    /// Unsubscripted reference.
    #[must_use]
    pub fn scalar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            indices: Vec::new(),
        }
    }

    /// Reference subscripted by loop counters, e.g. `indexed("y", &["i", "j"])`.
    #[must_use]
    pub fn indexed(name: &str, vars: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            indices: vars
                .iter()
                .map(|v| Index::Expr(Expr::var(v)))
                .collect(),
        }
    }

    /// Whether every subscript is a single position.
    #[must_use]
    pub fn is_scalar_ref(&self) -> bool {
        self.indices.iter().all(|i| matches!(i, Index::Expr(_)))
    }
}

/// One subscript.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    /// Single position.
    Expr(Expr),
    /// Inclusive range `a:b`.
    Range(Expr, Expr),
    /// Whole extent, written as an empty subscript.
    All,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
}

impl BinOp {
    /// Operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }

    /// Apply to two values.
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Variable or loop counter.
    Node(NodeRef),
    /// Unary minus.
    Neg(Box<Expr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Function call, e.g. `sum(z[])`.
    Call {
        /// Function name.
        func: String,
        /// Arguments.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Numeric literal.
    #[must_use]
    pub const fn num(value: f64) -> Self {
        Self::Number(value)
    }

    /// Unsubscripted variable or loop counter.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Node(NodeRef::scalar(name))
    }

    /// Variable subscripted by loop counters.
    #[must_use]
    pub fn indexed(name: &str, vars: &[&str]) -> Self {
        Self::Node(NodeRef::indexed(name, vars))
    }

    /// Whole-extent reference such as `z[]`.
    #[must_use]
    pub fn all(name: &str) -> Self {
        Self::Node(NodeRef {
            name: name.to_string(),
            indices: vec![Index::All],
        })
    }

    /// Unary minus; a non-negative literal folds into a negative literal,
    /// which is how the parser reads `-2`.
    #[must_use]
    pub fn neg(inner: Self) -> Self {
        match inner {
            Self::Number(n) if n.is_sign_positive() => Self::Number(-n),
            other => Self::Neg(Box::new(other)),
        }
    }

    /// Binary operation.
    #[must_use]
    pub fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs + rhs`
    #[must_use]
    pub fn add(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinOp::Add, lhs, rhs)
    }

    /// `lhs * rhs`
    #[must_use]
    pub fn mul(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinOp::Mul, lhs, rhs)
    }

    /// `lhs ^ rhs`
    #[must_use]
    pub fn pow(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinOp::Pow, lhs, rhs)
    }

    /// Function call.
    #[must_use]
    pub fn call(func: &str, args: Vec<Self>) -> Self {
        Self::Call {
            func: func.to_string(),
            args,
        }
    }
}

impl Statement {
    /// `target ~ name(args)`
    #[must_use]
    pub fn stochastic(target: NodeRef, name: &str, args: Vec<Expr>) -> Self {
        Self::Stochastic {
            target,
            distribution: DistributionCall {
                name: name.to_string(),
                args,
            },
        }
    }

    /// `target <- expr`
    #[must_use]
    pub const fn deterministic(target: NodeRef, expr: Expr) -> Self {
        Self::Deterministic {
            target,
            link: None,
            expr,
        }
    }

    /// `link(target) <- expr`
    #[must_use]
    pub const fn linked(link: Link, target: NodeRef, expr: Expr) -> Self {
        Self::Deterministic {
            target,
            link: Some(link),
            expr,
        }
    }

    /// `for (var in from:to) { body }`
    #[must_use]
    pub fn for_loop(var: &str, from: Expr, to: Expr, body: Vec<Self>) -> Self {
        Self::For {
            var: var.to_string(),
            from,
            to,
            body,
        }
    }
}

/// Count of statements by kind, loops flattened (not unrolled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementCounts {
    /// `~` statements.
    pub stochastic: usize,
    /// `<-` statements.
    pub deterministic: usize,
    /// `for` blocks.
    pub loops: usize,
}

impl Model {
    /// Create a model from top-level statements.
    #[must_use]
    pub const fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Parse model text.
    ///
    /// # Errors
    ///
    /// Returns `Parse` with the position of the first syntax error.
    pub fn parse(text: &str) -> SimResult<Self> {
        parse_model(text)
    }

    /// Write the rendered model to a file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Read and parse a model file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Parse` on bad syntax.
    pub fn read_from<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Statement counts by kind.
    #[must_use]
    pub fn counts(&self) -> StatementCounts {
        fn walk(statements: &[Statement], counts: &mut StatementCounts) {
            for s in statements {
                match s {
                    Statement::Stochastic { .. } => counts.stochastic += 1,
                    Statement::Deterministic { .. } => counts.deterministic += 1,
                    Statement::For { body, .. } => {
                        counts.loops += 1;
                        walk(body, counts);
                    }
                }
            }
        }
        let mut counts = StatementCounts::default();
        walk(&self.statements, &mut counts);
        counts
    }

    /// Names of variables defined by `~`, in source order, deduplicated.
    #[must_use]
    pub fn stochastic_names(&self) -> Vec<String> {
        self.target_names(true)
    }

    /// Names of variables defined by `<-`, in source order, deduplicated.
    #[must_use]
    pub fn deterministic_names(&self) -> Vec<String> {
        self.target_names(false)
    }

    fn target_names(&self, stochastic: bool) -> Vec<String> {
        fn walk(statements: &[Statement], stochastic: bool, out: &mut Vec<String>) {
            for s in statements {
                let name = match s {
                    Statement::Stochastic { target, .. } if stochastic => Some(&target.name),
                    Statement::Deterministic { target, .. } if !stochastic => Some(&target.name),
                    Statement::For { body, .. } => {
                        walk(body, stochastic, out);
                        None
                    }
                    _ => None,
                };
                if let Some(name) = name {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.statements, stochastic, &mut out);
        out
    }
}

impl FromStr for Model {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Model {
        Model::new(vec![
            Statement::stochastic(
                NodeRef::scalar("psi"),
                "dunif",
                vec![Expr::num(0.0), Expr::num(1.0)],
            ),
            Statement::for_loop(
                "i",
                Expr::num(1.0),
                Expr::var("R"),
                vec![
                    Statement::stochastic(NodeRef::indexed("z", &["i"]), "dbern", vec![Expr::var("psi")]),
                    Statement::deterministic(
                        NodeRef::indexed("w", &["i"]),
                        Expr::mul(Expr::indexed("z", &["i"]), Expr::num(2.0)),
                    ),
                ],
            ),
        ])
    }

    #[test]
    fn test_counts() {
        let counts = tiny().counts();
        assert_eq!(counts.stochastic, 2);
        assert_eq!(counts.deterministic, 1);
        assert_eq!(counts.loops, 1);
    }

    #[test]
    fn test_target_names() {
        let m = tiny();
        assert_eq!(m.stochastic_names(), vec!["psi", "z"]);
        assert_eq!(m.deterministic_names(), vec!["w"]);
    }

    #[test]
    fn test_neg_folds_literals() {
        assert_eq!(Expr::neg(Expr::num(3.0)), Expr::Number(-3.0));
        assert_eq!(
            Expr::neg(Expr::num(-3.0)),
            Expr::Neg(Box::new(Expr::Number(-3.0)))
        );
        assert!(matches!(Expr::neg(Expr::var("x")), Expr::Neg(_)));
    }

    #[test]
    fn test_link_keywords() {
        assert_eq!(Link::from_keyword("logit"), Some(Link::Logit));
        assert_eq!(Link::from_keyword("log"), Some(Link::Log));
        assert_eq!(Link::from_keyword("probit"), None);
        assert_eq!(Link::Logit.keyword(), "logit");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        let model = tiny();
        model.write_to(&path).unwrap();
        assert_eq!(Model::read_from(&path).unwrap(), model);
    }

    #[test]
    fn test_read_missing_file() {
        let err = Model::read_from("/definitely/not/here/model.txt").unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }

    #[test]
    fn test_from_str() {
        let m: Model = "model { x ~ dnorm(0, 1) }".parse().unwrap();
        assert_eq!(m.counts().stochastic, 1);
    }

    #[test]
    fn test_binop_apply() {
        assert_eq!(BinOp::Add.apply(2.0, 3.0), 5.0);
        assert_eq!(BinOp::Sub.apply(2.0, 3.0), -1.0);
        assert_eq!(BinOp::Mul.apply(2.0, 3.0), 6.0);
        assert_eq!(BinOp::Div.apply(3.0, 2.0), 1.5);
        assert_eq!(BinOp::Pow.apply(2.0, 3.0), 8.0);
    }
}
