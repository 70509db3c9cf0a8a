//! Canonical text rendering of the model AST.
//!
//! Parentheses are emitted only where precedence requires them:
//!
//! ```text
//! + -      1  (left associative)
//! * /      2  (left associative)
//! unary -  3
//! ^        4  (right associative, binds tighter than unary minus)
//! atoms    5
//! ```

use std::fmt::{self, Display, Formatter, Write};

use super::{BinOp, DistributionCall, Expr, Index, Model, NodeRef, Statement};

const INDENT: &str = "  ";

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => match op {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div => 2,
            BinOp::Pow => 4,
        },
        Expr::Neg(_) => 3,
        Expr::Number(n) if n.is_sign_negative() => 3,
        Expr::Number(_) | Expr::Node(_) | Expr::Call { .. } => 5,
    }
}

/// Minimum child precedences (left, right) that print without parentheses.
const fn operand_precedence(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Add | BinOp::Sub => (1, 2),
        BinOp::Mul | BinOp::Div => (2, 3),
        BinOp::Pow => (5, 3),
    }
}

fn write_operand(f: &mut Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if precedence(expr) < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Node(node) => write!(f, "{node}"),
            Self::Neg(inner) => {
                f.write_char('-')?;
                write_operand(f, inner, 3)
            }
            Self::Binary { op, lhs, rhs } => {
                let (left_min, right_min) = operand_precedence(*op);
                write_operand(f, lhs, left_min)?;
                match op {
                    BinOp::Pow => f.write_str("^")?,
                    other => write!(f, " {} ", other.symbol())?,
                }
                write_operand(f, rhs, right_min)
            }
            Self::Call { func, args } => {
                write!(f, "{func}(")?;
                write_list(f, args)?;
                f.write_char(')')
            }
        }
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => write!(f, "{e}"),
            Self::Range(a, b) => write!(f, "{a}:{b}"),
            Self::All => Ok(()),
        }
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.indices.is_empty() {
            return Ok(());
        }
        f.write_char('[')?;
        for (i, index) in self.indices.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, "{index}")?;
        }
        f.write_char(']')
    }
}

impl Display for DistributionCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.args)?;
        f.write_char(')')
    }
}

fn write_statement(f: &mut Formatter<'_>, statement: &Statement, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    match statement {
        Statement::Stochastic {
            target,
            distribution,
        } => writeln!(f, "{pad}{target} ~ {distribution}"),
        Statement::Deterministic { target, link, expr } => match link {
            Some(link) => writeln!(f, "{pad}{}({target}) <- {expr}", link.keyword()),
            None => writeln!(f, "{pad}{target} <- {expr}"),
        },
        Statement::For {
            var,
            from,
            to,
            body,
        } => {
            writeln!(f, "{pad}for ({var} in {from}:{to}) {{")?;
            for s in body {
                write_statement(f, s, depth + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_statement(f, self, 0)
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "model {{")?;
        for s in &self.statements {
            write_statement(f, s, 1)?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, Statement};

    #[test]
    fn test_precedence_parentheses() {
        let sum = Expr::add(Expr::var("a"), Expr::var("b"));
        assert_eq!(Expr::mul(sum.clone(), Expr::var("c")).to_string(), "(a + b) * c");
        assert_eq!(Expr::mul(Expr::var("c"), sum).to_string(), "c * (a + b)");
    }

    #[test]
    fn test_left_associative_subtraction() {
        let inner = Expr::binary(BinOp::Sub, Expr::var("b"), Expr::var("c"));
        let e = Expr::binary(BinOp::Sub, Expr::var("a"), inner);
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_power_rendering() {
        let sq = Expr::pow(Expr::indexed("veg", &["i"]), Expr::num(2.0));
        assert_eq!(sq.to_string(), "veg[i]^2");
        let neg_base = Expr::pow(Expr::num(-2.0), Expr::num(2.0));
        assert_eq!(neg_base.to_string(), "(-2)^2");
        assert_eq!(Expr::neg(sq).to_string(), "-veg[i]^2");
    }

    #[test]
    fn test_node_ref_rendering() {
        assert_eq!(NodeRef::indexed("y", &["i", "j"]).to_string(), "y[i,j]");
        assert_eq!(Expr::all("z").to_string(), "z[]");
        let range = NodeRef {
            name: "x".to_string(),
            indices: vec![Index::Range(Expr::num(1.0), Expr::var("R"))],
        };
        assert_eq!(range.to_string(), "x[1:R]");
    }

    #[test]
    fn test_statement_rendering() {
        let s = Statement::linked(
            Link::Logit,
            NodeRef::indexed("psi", &["i"]),
            Expr::add(Expr::var("alpha.occ"), Expr::num(1.5)),
        );
        assert_eq!(s.to_string(), "logit(psi[i]) <- alpha.occ + 1.5\n");

        let s = Statement::stochastic(
            NodeRef::scalar("p"),
            "dunif",
            vec![Expr::num(0.0), Expr::num(1.0)],
        );
        assert_eq!(s.to_string(), "p ~ dunif(0, 1)\n");
    }

    #[test]
    fn test_model_layout() {
        let model = Model::new(vec![Statement::for_loop(
            "i",
            Expr::num(1.0),
            Expr::var("R"),
            vec![Statement::stochastic(
                NodeRef::indexed("z", &["i"]),
                "dbern",
                vec![Expr::var("psi")],
            )],
        )]);
        assert_eq!(
            model.to_string(),
            "model {\n  for (i in 1:R) {\n    z[i] ~ dbern(psi)\n  }\n}\n"
        );
    }
}
