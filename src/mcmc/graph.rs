//! Compilation of a model AST into a node graph.
//!
//! Every variable gets a contiguous block of cells in one flat state
//! vector (column-major within the block). Loops are unrolled, so each
//! defined cell becomes exactly one node:
//!
//! ```text
//! data cell          constant, loaded from the data set
//! stochastic node    observed when the data set provides its value
//! deterministic node recomputed from its parents
//! ```
//!
//! Nodes are stored in topological order. For every node the graph keeps
//! the deterministic nodes downstream of it and the stochastic nodes whose
//! density it enters, which is all a single-site sampler needs.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use super::data::{cell_label, column_major_offset, Array, DataSet};
use super::distributions::Family;
use crate::domains::link::{ilogit, logit};
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};
use crate::model::{BinOp, Expr, Index, Link, Model, NodeRef, Statement};

/// Built-in function of the model language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// `exp(x)`
    Exp,
    /// `log(x)`
    Log,
    /// `sqrt(x)`
    Sqrt,
    /// `abs(x)`
    Abs,
    /// `logit(p)`
    Logit,
    /// `ilogit(x)`
    Ilogit,
    /// `pow(x, y)`
    Pow,
    /// `step(x)`: 1 if `x >= 0`
    Step,
    /// `sum(...)`
    Sum,
    /// `mean(...)`
    Mean,
    /// `max(...)`
    Max,
    /// `min(...)`
    Min,
}

impl Func {
    /// Look up a function by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "logit" => Self::Logit,
            "ilogit" => Self::Ilogit,
            "pow" => Self::Pow,
            "step" => Self::Step,
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "max" => Self::Max,
            "min" => Self::Min,
            _ => return None,
        })
    }

    /// Whether the function folds any number of values.
    #[must_use]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Sum | Self::Mean | Self::Max | Self::Min)
    }

    const fn arity(self) -> usize {
        match self {
            Self::Pow => 2,
            _ => 1,
        }
    }

    fn apply_scalar(self, args: &[f64]) -> f64 {
        let x = args[0];
        match self {
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Logit => logit(x),
            Self::Ilogit => ilogit(x),
            Self::Pow => x.powf(args[1]),
            Self::Step => {
                if x >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sum | Self::Mean | Self::Max | Self::Min => self.apply_aggregate(args),
        }
    }

    fn apply_aggregate(self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            other => other.apply_scalar(values),
        }
    }
}

/// Expression with every reference resolved to state cells.
#[derive(Debug, Clone, PartialEq)]
pub enum CExpr {
    /// Literal, loop counter or folded constant.
    Const(f64),
    /// One state cell.
    Cell(usize),
    /// Several cells; only valid as an aggregate argument.
    Block(Vec<usize>),
    /// Unary minus.
    Neg(Box<CExpr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<CExpr>,
        /// Right operand.
        rhs: Box<CExpr>,
    },
    /// Function call.
    Call {
        /// Function.
        func: Func,
        /// Arguments.
        args: Vec<CExpr>,
    },
}

impl CExpr {
    /// Evaluate against a state vector.
    #[must_use]
    pub fn eval(&self, state: &[f64]) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::Cell(c) => state[*c],
            Self::Block(cells) => match cells.as_slice() {
                [c] => state[*c],
                _ => f64::NAN,
            },
            Self::Neg(inner) => -inner.eval(state),
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval(state), rhs.eval(state)),
            Self::Call { func, args } => {
                if func.is_aggregate() {
                    let mut values = Vec::new();
                    for arg in args {
                        arg.collect(state, &mut values);
                    }
                    func.apply_aggregate(&values)
                } else {
                    let values: Vec<f64> = args.iter().map(|a| a.eval(state)).collect();
                    func.apply_scalar(&values)
                }
            }
        }
    }

    fn collect(&self, state: &[f64], out: &mut Vec<f64>) {
        match self {
            Self::Block(cells) => out.extend(cells.iter().map(|&c| state[c])),
            other => out.push(other.eval(state)),
        }
    }

    fn cells(&self, out: &mut Vec<usize>) {
        match self {
            Self::Const(_) => {}
            Self::Cell(c) => out.push(*c),
            Self::Block(cells) => out.extend_from_slice(cells),
            Self::Neg(inner) => inner.cells(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.cells(out);
                rhs.cells(out);
            }
            Self::Call { args, .. } => args.iter().for_each(|a| a.cells(out)),
        }
    }
}

/// Storage of one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Extent per dimension; empty for a scalar.
    pub dims: Vec<usize>,
    /// First cell in the state vector.
    pub start: usize,
}

impl Variable {
    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Whether the variable has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn offset(&self, position: &[usize]) -> Option<usize> {
        if position.is_empty() && self.dims == [1] {
            return Some(0);
        }
        column_major_offset(&self.dims, position)
    }
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `x ~ family(params)`
    Stochastic {
        /// Distribution family.
        family: Family,
        /// Parameter expressions.
        params: Vec<CExpr>,
        /// Value fixed by data.
        observed: bool,
    },
    /// `x <- expr` or `link(x) <- expr`
    Deterministic {
        /// Right-hand side.
        expr: CExpr,
        /// Link on the target.
        link: Option<Link>,
    },
}

/// One unrolled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// State cell holding the node value.
    pub cell: usize,
    /// Label such as `y[3,1]`.
    pub label: String,
    /// Definition.
    pub kind: NodeKind,
}

impl Node {
    /// Whether the node is stochastic and not fixed by data.
    #[must_use]
    pub const fn is_latent(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { observed: false, .. })
    }

    /// Whether the node is stochastic and fixed by data.
    #[must_use]
    pub const fn is_observed(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { observed: true, .. })
    }

    fn parents(&self) -> Vec<usize> {
        let mut out = Vec::new();
        match &self.kind {
            NodeKind::Stochastic { params, .. } => params.iter().for_each(|p| p.cells(&mut out)),
            NodeKind::Deterministic { expr, .. } => expr.cells(&mut out),
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Compiled model.
#[derive(Debug, Clone)]
pub struct Graph {
    variables: BTreeMap<String, Variable>,
    nodes: Vec<Node>,
    node_of_cell: Vec<Option<usize>>,
    initial: Vec<f64>,
    children: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

/// Loop counters in scope, innermost last.
type Env = Vec<(String, f64)>;

fn lookup(env: &Env, name: &str) -> Option<f64> {
    env.iter().rev().find(|(n, _)| n == name).map(|(_, v)| *v)
}

fn position_label(name: &str, position: &[usize]) -> String {
    if position.is_empty() {
        return name.to_string();
    }
    let parts: Vec<String> = position.iter().map(ToString::to_string).collect();
    format!("{name}[{}]", parts.join(","))
}

struct Compiler<'a> {
    data: &'a DataSet,
    /// Index count and maximum extent per defined variable.
    shapes: BTreeMap<String, Vec<usize>>,
    variables: BTreeMap<String, Variable>,
    initial: Vec<f64>,
    nodes: Vec<Node>,
    node_of_cell: Vec<Option<usize>>,
}

impl<'a> Compiler<'a> {
    fn new(data: &'a DataSet) -> Self {
        Self {
            data,
            shapes: BTreeMap::new(),
            variables: BTreeMap::new(),
            initial: Vec::new(),
            nodes: Vec::new(),
            node_of_cell: Vec::new(),
        }
    }

    /// Evaluate an expression that may only involve literals, loop
    /// counters and data.
    fn eval_const(&self, expr: &Expr, env: &Env) -> SimResult<f64> {
        match expr {
            Expr::Number(v) => Ok(*v),
            Expr::Neg(inner) => Ok(-self.eval_const(inner, env)?),
            Expr::Binary { op, lhs, rhs } => {
                Ok(op.apply(self.eval_const(lhs, env)?, self.eval_const(rhs, env)?))
            }
            Expr::Call { func, args } => {
                let f = Func::from_name(func)
                    .ok_or_else(|| SimError::compile(format!("unknown function '{func}'")))?;
                let values = args
                    .iter()
                    .map(|a| self.eval_const(a, env))
                    .collect::<SimResult<Vec<_>>>()?;
                Ok(f.apply_scalar(&values))
            }
            Expr::Node(node) => {
                if node.indices.is_empty() {
                    if let Some(v) = lookup(env, &node.name) {
                        return Ok(v);
                    }
                }
                let array = self.data.get(&node.name).ok_or_else(|| {
                    SimError::compile(format!(
                        "'{node}' is not a loop counter or data, so it cannot be used as an index or bound"
                    ))
                })?;
                let position = node
                    .indices
                    .iter()
                    .map(|i| match i {
                        Index::Expr(e) => self.eval_index(e, env),
                        _ => Err(SimError::compile(format!("range subscript in index '{node}'"))),
                    })
                    .collect::<SimResult<Vec<_>>>()?;
                let offset = if position.is_empty() && array.len() == 1 {
                    Some(0)
                } else {
                    array.offset(&position)
                };
                offset
                    .map(|k| array.values()[k])
                    .filter(|v| !v.is_nan())
                    .ok_or_else(|| SimError::compile(format!("index '{node}' is out of range or missing")))
            }
        }
    }

    fn eval_index(&self, expr: &Expr, env: &Env) -> SimResult<usize> {
        let v = self.eval_const(expr, env)?;
        if v.is_finite() && v >= 1.0 && v.fract() == 0.0 {
            Ok(v as usize)
        } else {
            Err(SimError::compile(format!("index '{expr}' evaluates to {v}, expected a positive integer")))
        }
    }

    fn loop_bounds(&self, from: &Expr, to: &Expr, env: &Env) -> SimResult<(i64, i64)> {
        let bound = |e: &Expr| -> SimResult<i64> {
            let v = self.eval_const(e, env)?;
            if v.is_finite() && v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(SimError::compile(format!("loop bound '{e}' evaluates to {v}")))
            }
        };
        Ok((bound(from)?, bound(to)?))
    }

    fn target_position(&self, target: &NodeRef, env: &Env) -> SimResult<Vec<usize>> {
        target
            .indices
            .iter()
            .map(|i| match i {
                Index::Expr(e) => self.eval_index(e, env),
                _ => Err(SimError::compile(format!(
                    "target '{target}' must be a single node"
                ))),
            })
            .collect()
    }

    /// Visit every unrolled definition in source order.
    fn unroll<F>(&mut self, statements: &[Statement], env: &mut Env, visit: &mut F) -> SimResult<()>
    where
        F: FnMut(&mut Self, &Statement, &Env) -> SimResult<()>,
    {
        for statement in statements {
            match statement {
                Statement::For {
                    var,
                    from,
                    to,
                    body,
                } => {
                    let (lo, hi) = self.loop_bounds(from, to, env)?;
                    for v in lo..=hi {
                        env.push((var.clone(), v as f64));
                        let result = self.unroll(body, env, visit);
                        env.pop();
                        result?;
                    }
                }
                other => visit(self, other, env)?,
            }
        }
        Ok(())
    }

    fn record_shape(&mut self, target: &NodeRef, env: &Env) -> SimResult<()> {
        let position = self.target_position(target, env)?;
        match self.shapes.get_mut(&target.name) {
            Some(extent) => {
                if extent.len() != position.len() {
                    return Err(SimError::compile(format!(
                        "'{}' is used with {} and {} subscripts",
                        target.name,
                        extent.len(),
                        position.len()
                    )));
                }
                for (e, &p) in extent.iter_mut().zip(&position) {
                    *e = (*e).max(p);
                }
            }
            None => {
                self.shapes.insert(target.name.clone(), position);
            }
        }
        Ok(())
    }

    fn allocate(&mut self) -> SimResult<()> {
        let mut names: Vec<String> = self.data.names().map(str::to_string).collect();
        for name in self.shapes.keys() {
            if !self.data.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();

        let mut next = 0;
        for name in names {
            let dims = match (self.data.get(&name), self.shapes.get(&name)) {
                (Some(array), Some(extent)) => {
                    let scalar_like = extent.is_empty() && array.len() == 1;
                    let fits = array.dims().len() == extent.len()
                        && extent.iter().zip(array.dims()).all(|(e, d)| e <= d);
                    if !(scalar_like || fits) {
                        return Err(SimError::dimension_mismatch(
                            name,
                            format!("{extent:?} as defined in the model"),
                            format!("{:?} in the data", array.dims()),
                        ));
                    }
                    array.dims().to_vec()
                }
                (Some(array), None) => array.dims().to_vec(),
                (None, Some(extent)) => extent.clone(),
                (None, None) => continue,
            };
            let variable = Variable { dims, start: next };
            next += variable.len();
            self.variables.insert(name, variable);
        }

        self.initial = vec![f64::NAN; next];
        self.node_of_cell = vec![None; next];
        for (name, array) in self.data.iter() {
            if let Some(variable) = self.variables.get(name) {
                let start = variable.start;
                self.initial[start..start + array.len()].copy_from_slice(array.values());
            }
        }
        Ok(())
    }

    fn resolve_cells(&self, node: &NodeRef, env: &Env) -> SimResult<(Vec<usize>, bool)> {
        let variable = self.variables.get(&node.name).ok_or_else(|| {
            SimError::compile(format!("undefined variable '{}'", node.name))
        })?;

        if node.indices.is_empty() {
            let cells = (variable.start..variable.start + variable.len()).collect();
            return Ok((cells, variable.dims.is_empty() || variable.dims == [1]));
        }
        if node.indices.len() != variable.dims.len() {
            return Err(SimError::dimension_mismatch(
                node.to_string(),
                format!("{} subscripts", variable.dims.len()),
                node.indices.len(),
            ));
        }

        let mut ranges = Vec::with_capacity(node.indices.len());
        for (index, &extent) in node.indices.iter().zip(&variable.dims) {
            let range = match index {
                Index::Expr(e) => {
                    let k = self.eval_index(e, env)?;
                    (k, k)
                }
                Index::Range(a, b) => (self.eval_index(a, env)?, self.eval_index(b, env)?),
                Index::All => (1, extent),
            };
            if range.1 > extent {
                return Err(SimError::compile(format!(
                    "subscript {} out of range in '{node}' (extent {extent})",
                    range.1
                )));
            }
            ranges.push(range);
        }

        let single = node.is_scalar_ref();
        let mut cells = Vec::new();
        let mut position: Vec<usize> = ranges.iter().map(|r| r.0).collect();
        if ranges.iter().all(|r| r.0 <= r.1) {
            loop {
                if let Some(k) = variable.offset(&position) {
                    cells.push(variable.start + k);
                }
                // odometer, first index fastest
                let mut d = 0;
                loop {
                    if d == ranges.len() {
                        return Ok((cells, single));
                    }
                    if position[d] < ranges[d].1 {
                        position[d] += 1;
                        break;
                    }
                    position[d] = ranges[d].0;
                    d += 1;
                }
            }
        }
        Ok((cells, single))
    }

    fn compile_expr(&self, expr: &Expr, env: &Env, scalar: bool) -> SimResult<CExpr> {
        match expr {
            Expr::Number(v) => Ok(CExpr::Const(*v)),
            Expr::Neg(inner) => Ok(CExpr::Neg(Box::new(self.compile_expr(inner, env, true)?))),
            Expr::Binary { op, lhs, rhs } => Ok(CExpr::Binary {
                op: *op,
                lhs: Box::new(self.compile_expr(lhs, env, true)?),
                rhs: Box::new(self.compile_expr(rhs, env, true)?),
            }),
            Expr::Call { func, args } => {
                let f = Func::from_name(func)
                    .ok_or_else(|| SimError::compile(format!("unknown function '{func}'")))?;
                if f.is_aggregate() {
                    if args.is_empty() {
                        return Err(SimError::compile(format!("{func}() needs an argument")));
                    }
                } else if args.len() != f.arity() {
                    return Err(SimError::compile(format!(
                        "{func}() takes {} argument(s), got {}",
                        f.arity(),
                        args.len()
                    )));
                }
                let args = args
                    .iter()
                    .map(|a| self.compile_expr(a, env, !f.is_aggregate()))
                    .collect::<SimResult<Vec<_>>>()?;
                Ok(CExpr::Call { func: f, args })
            }
            Expr::Node(node) => {
                if node.indices.is_empty() {
                    if let Some(v) = lookup(env, &node.name) {
                        return Ok(CExpr::Const(v));
                    }
                }
                let (cells, single) = self.resolve_cells(node, env)?;
                match cells.as_slice() {
                    [c] if single => Ok(CExpr::Cell(*c)),
                    _ if scalar => Err(SimError::compile(format!(
                        "'{node}' is not a single node but is used as a scalar"
                    ))),
                    _ => Ok(CExpr::Block(cells)),
                }
            }
        }
    }

    fn define(&mut self, statement: &Statement, env: &Env) -> SimResult<()> {
        let target = match statement {
            Statement::Stochastic { target, .. } | Statement::Deterministic { target, .. } => target,
            Statement::For { .. } => return Ok(()),
        };
        let position = self.target_position(target, env)?;
        let label = position_label(&target.name, &position);
        let variable = self
            .variables
            .get(&target.name)
            .ok_or_else(|| SimError::compile(format!("undefined variable '{}'", target.name)))?;
        let cell = variable.start
            + variable
                .offset(&position)
                .ok_or_else(|| SimError::compile(format!("'{label}' is out of range")))?;

        if self.node_of_cell[cell].is_some() {
            return Err(SimError::compile(format!("'{label}' is defined more than once")));
        }

        let kind = match statement {
            Statement::Stochastic {
                distribution, ..
            } => {
                let family = Family::from_name(&distribution.name).ok_or_else(|| {
                    SimError::compile(format!("unknown distribution '{}'", distribution.name))
                })?;
                if distribution.args.len() != family.arity() {
                    return Err(SimError::compile(format!(
                        "{} takes {} parameter(s), got {} in '{label}'",
                        family.name(),
                        family.arity(),
                        distribution.args.len()
                    )));
                }
                let params = distribution
                    .args
                    .iter()
                    .map(|a| self.compile_expr(a, env, true))
                    .collect::<SimResult<Vec<_>>>()?;
                NodeKind::Stochastic {
                    family,
                    params,
                    observed: !self.initial[cell].is_nan(),
                }
            }
            Statement::Deterministic { expr, link, .. } => {
                if !self.initial[cell].is_nan() {
                    return Err(SimError::compile(format!(
                        "'{label}' is supplied as data but defined as a deterministic node"
                    )));
                }
                NodeKind::Deterministic {
                    expr: self.compile_expr(expr, env, true)?,
                    link: *link,
                }
            }
            Statement::For { .. } => return Ok(()),
        };

        self.node_of_cell[cell] = Some(self.nodes.len());
        self.nodes.push(Node { cell, label, kind });
        Ok(())
    }

    fn finish(self) -> SimResult<Graph> {
        let Self {
            variables,
            nodes,
            node_of_cell,
            initial,
            ..
        } = self;

        let labels = |cell: usize| -> String {
            variables
                .iter()
                .find(|(_, v)| (v.start..v.start + v.len()).contains(&cell))
                .map_or_else(|| format!("cell {cell}"), |(n, v)| cell_label(n, &v.dims, cell - v.start))
        };

        // every referenced cell must be data or a node
        let parents: Vec<Vec<usize>> = nodes.iter().map(Node::parents).collect();
        for (node, cells) in nodes.iter().zip(&parents) {
            for &c in cells {
                if node_of_cell[c].is_none() && initial[c].is_nan() {
                    return Err(SimError::compile(format!(
                        "undefined node '{}' used by '{}'",
                        labels(c),
                        node.label
                    )));
                }
            }
        }

        // Kahn's algorithm, ties broken by definition order
        let n = nodes.len();
        let mut indegree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, cells) in parents.iter().enumerate() {
            for &c in cells {
                if let Some(p) = node_of_cell[c] {
                    if p == i {
                        return Err(SimError::compile(format!(
                            "'{}' depends on itself",
                            nodes[i].label
                        )));
                    }
                    consumers[p].push(i);
                    indegree[i] += 1;
                }
            }
        }
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &j in &consumers[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push_back(j);
                }
            }
        }
        if order.len() < n {
            let stuck = (0..n).find(|&i| indegree[i] > 0).map_or("?", |i| nodes[i].label.as_str());
            return Err(SimError::compile(format!("directed cycle involving '{stuck}'")));
        }

        let mut rank = vec![0usize; n];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let sorted: Vec<Node> = order.iter().filter_map(|&i| slots[i].take()).collect();
        let mut sorted_consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, list) in consumers.iter().enumerate() {
            sorted_consumers[rank[i]] = list.iter().map(|&j| rank[j]).collect();
        }
        let node_of_cell: Vec<Option<usize>> =
            node_of_cell.into_iter().map(|slot| slot.map(|i| rank[i])).collect();

        let mut children = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        for start in 0..n {
            let mut seen = vec![false; n];
            let mut stack = sorted_consumers[start].clone();
            while let Some(j) = stack.pop() {
                if std::mem::replace(&mut seen[j], true) {
                    continue;
                }
                match sorted[j].kind {
                    NodeKind::Deterministic { .. } => {
                        dependents[start].push(j);
                        stack.extend_from_slice(&sorted_consumers[j]);
                    }
                    NodeKind::Stochastic { .. } => children[start].push(j),
                }
            }
            dependents[start].sort_unstable();
            children[start].sort_unstable();
        }

        debug!(
            nodes = n,
            cells = initial.len(),
            variables = variables.len(),
            "compiled model graph"
        );

        Ok(Graph {
            variables,
            nodes: sorted,
            node_of_cell,
            initial,
            children,
            dependents,
        })
    }
}

impl Graph {
    /// Compile a model against a data set.
    ///
    /// # Errors
    ///
    /// Returns `Compile` for unknown distributions or functions, undefined
    /// nodes, nodes defined twice, deterministic nodes supplied as data and
    /// directed cycles. Returns `DimensionMismatch` when data and model
    /// disagree on a variable's shape.
    pub fn compile(model: &Model, data: &DataSet) -> SimResult<Self> {
        let mut compiler = Compiler::new(data);
        let mut env = Env::new();
        compiler.unroll(&model.statements, &mut env, &mut |c, s, env| match s {
            Statement::Stochastic { target, .. } | Statement::Deterministic { target, .. } => {
                c.record_shape(target, env)
            }
            Statement::For { .. } => Ok(()),
        })?;
        compiler.allocate()?;
        compiler.unroll(&model.statements, &mut env, &mut |c, s, env| c.define(s, env))?;
        compiler.finish()
    }

    /// Nodes in topological order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Variable storage by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Data values with unset cells as NaN.
    #[must_use]
    pub fn initial_state(&self) -> Vec<f64> {
        self.initial.clone()
    }

    /// Indices of latent stochastic nodes, in topological order.
    pub fn latent_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].is_latent())
    }

    /// Stochastic nodes whose density depends on node `i`.
    #[must_use]
    pub fn children(&self, i: usize) -> &[usize] {
        &self.children[i]
    }

    /// Deterministic nodes downstream of node `i`, in evaluation order.
    #[must_use]
    pub fn dependents(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }

    /// Parameter values of a stochastic node.
    #[must_use]
    pub fn params(&self, i: usize, state: &[f64]) -> Option<(Family, Vec<f64>)> {
        match &self.nodes[i].kind {
            NodeKind::Stochastic { family, params, .. } => {
                Some((*family, params.iter().map(|p| p.eval(state)).collect()))
            }
            NodeKind::Deterministic { .. } => None,
        }
    }

    /// Log density of stochastic node `i` at its current value.
    #[must_use]
    pub fn log_density(&self, i: usize, state: &[f64]) -> f64 {
        self.params(i, state).map_or(0.0, |(family, params)| {
            family.log_density(&params, state[self.nodes[i].cell])
        })
    }

    /// Recompute deterministic node `i`.
    pub fn evaluate(&self, i: usize, state: &mut [f64]) {
        if let NodeKind::Deterministic { expr, link } = &self.nodes[i].kind {
            let eta = expr.eval(state);
            state[self.nodes[i].cell] = match link {
                Some(Link::Logit) => ilogit(eta),
                Some(Link::Log) => eta.exp(),
                None => eta,
            };
        }
    }

    /// Recompute every deterministic node downstream of node `i`.
    pub fn refresh(&self, i: usize, state: &mut [f64]) {
        for &j in &self.dependents[i] {
            self.evaluate(j, state);
        }
    }

    /// Log-likelihood of the observed nodes.
    #[must_use]
    pub fn log_likelihood(&self, state: &[f64]) -> f64 {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_observed())
            .map(|i| self.log_density(i, state))
            .sum()
    }

    /// Build a chain's starting state.
    ///
    /// Values in `inits` are applied to latent stochastic nodes; NaN cells
    /// are skipped. Remaining latent nodes are drawn forward from their
    /// priors in topological order.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when `inits` names something other than a latent
    /// stochastic node, `Sampler` when a prior cannot be sampled and
    /// `InconsistentNode` when the starting state has zero density.
    pub fn initialize(&self, inits: &DataSet, rng: &mut SimRng) -> SimResult<Vec<f64>> {
        let mut state = self.initial.clone();

        for (name, array) in inits.iter() {
            let variable = self.variables.get(name).ok_or_else(|| {
                SimError::engine(format!("initial value for unknown variable '{name}'"))
            })?;
            if array.len() != variable.len() {
                return Err(SimError::dimension_mismatch(
                    format!("inits for {name}"),
                    variable.len(),
                    array.len(),
                ));
            }
            for (k, &value) in array.values().iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                let cell = variable.start + k;
                match self.node_of_cell[cell] {
                    Some(i) if self.nodes[i].is_latent() => state[cell] = value,
                    _ => {
                        return Err(SimError::engine(format!(
                            "cannot set initial value of '{}': not a latent stochastic node",
                            cell_label(name, &variable.dims, k)
                        )))
                    }
                }
            }
        }

        for i in 0..self.nodes.len() {
            let cell = self.nodes[i].cell;
            match &self.nodes[i].kind {
                NodeKind::Deterministic { .. } => self.evaluate(i, &mut state),
                NodeKind::Stochastic { observed: false, .. } if state[cell].is_nan() => {
                    if let Some((family, params)) = self.params(i, &state) {
                        state[cell] = family.sample(&params, rng).map_err(|e| {
                            SimError::sampler(format!(
                                "cannot draw initial value for '{}': {e}",
                                self.nodes[i].label
                            ))
                        })?;
                    }
                }
                NodeKind::Stochastic { .. } => {}
            }
        }

        for i in 0..self.nodes.len() {
            if matches!(self.nodes[i].kind, NodeKind::Stochastic { .. })
                && self.log_density(i, &state) == f64::NEG_INFINITY
            {
                return Err(SimError::InconsistentNode {
                    node: self.nodes[i].label.clone(),
                });
            }
        }
        Ok(state)
    }

    /// Draw every latent node forward from its prior given the data.
    ///
    /// # Errors
    ///
    /// See [`Graph::initialize`].
    pub fn forward_sample(&self, rng: &mut SimRng) -> SimResult<DataSet> {
        let state = self.initialize(&DataSet::new(), rng)?;
        let mut out = DataSet::new();
        for name in self.variables.keys() {
            if let Some(array) = self.array(name, &state) {
                out.insert(name.clone(), array);
            }
        }
        Ok(out)
    }

    /// Current values of a variable.
    #[must_use]
    pub fn array(&self, name: &str, state: &[f64]) -> Option<Array> {
        let variable = self.variables.get(name)?;
        let values = state[variable.start..variable.start + variable.len()].to_vec();
        Array::from_column_major(variable.dims.clone(), values).ok()
    }

    /// Labelled cells for a monitored name, e.g. `z` expands to `z[1]`..`z[R]`.
    ///
    /// # Errors
    ///
    /// Returns `Compile` for names the model does not define.
    pub fn monitor_cells(&self, name: &str) -> SimResult<Vec<(String, usize)>> {
        let variable = self
            .variables
            .get(name)
            .ok_or_else(|| SimError::compile(format!("cannot monitor undefined variable '{name}'")))?;
        Ok((0..variable.len())
            .map(|k| (cell_label(name, &variable.dims, k), variable.start + k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_model, ModelTemplate};

    fn mean_data(y: &[[f64; 2]]) -> DataSet {
        let r = y.len();
        let mut values = Vec::with_capacity(r * 2);
        for j in 0..2 {
            for row in y {
                values.push(row[j]);
            }
        }
        DataSet::new()
            .with("R", Array::scalar(r as f64))
            .with("T", Array::scalar(2.0))
            .with("y", Array::from_column_major(vec![r, 2], values).unwrap())
    }

    #[test]
    fn test_compile_mean_model() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0], [0.0, 1.0]])).unwrap();
        // psi, p, 3 z, 3 p.eff, 6 y
        assert_eq!(graph.nodes().len(), 14);
        assert_eq!(graph.latent_nodes().count(), 5);
        assert_eq!(graph.variable("z").unwrap().dims, vec![3]);
        assert_eq!(graph.variable("y").unwrap().dims, vec![3, 2]);
    }

    #[test]
    fn test_topological_order() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0]])).unwrap();
        let pos = |label: &str| graph.nodes().iter().position(|n| n.label == label).unwrap();
        assert!(pos("psi") < pos("z[1]"));
        assert!(pos("z[1]") < pos("p.eff[1]"));
        assert!(pos("p.eff[1]") < pos("y[1,2]"));
    }

    #[test]
    fn test_children_through_deterministic_nodes() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0]])).unwrap();
        let p = graph.nodes().iter().position(|n| n.label == "p").unwrap();
        let children: Vec<&str> = graph
            .children(p)
            .iter()
            .map(|&i| graph.nodes()[i].label.as_str())
            .collect();
        assert_eq!(children.len(), 4);
        assert!(children.iter().all(|l| l.starts_with("y[")));
        assert_eq!(graph.dependents(p).len(), 2);
    }

    #[test]
    fn test_observed_flags() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0]])).unwrap();
        let observed: Vec<&str> = graph
            .nodes()
            .iter()
            .filter(|n| n.is_observed())
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(observed, vec!["y[1,1]", "y[1,2]"]);
    }

    #[test]
    fn test_sum_over_block() {
        let model = parse_model("for (i in 1:3) { z[i] ~ dbern(0.5) }\ns <- sum(z[])").unwrap();
        let graph = Graph::compile(&model, &DataSet::new()).unwrap();
        let s = graph.nodes().iter().position(|n| n.label == "s").unwrap();
        let mut state = graph.initial_state();
        let z = graph.variable("z").unwrap().start;
        state[z] = 1.0;
        state[z + 1] = 0.0;
        state[z + 2] = 1.0;
        graph.evaluate(s, &mut state);
        assert_eq!(state[graph.nodes()[s].cell], 2.0);
    }

    #[test]
    fn test_logit_link_evaluation() {
        let model = parse_model("logit(q) <- a\na ~ dnorm(0, 1)").unwrap();
        let graph = Graph::compile(&model, &DataSet::new()).unwrap();
        let q = graph.nodes().iter().position(|n| n.label == "q").unwrap();
        let a = graph.nodes().iter().position(|n| n.label == "a").unwrap();
        assert!(a < q, "a must be ordered before q");
        let mut state = graph.initial_state();
        state[graph.nodes()[a].cell] = 0.0;
        graph.evaluate(q, &mut state);
        assert!((state[graph.nodes()[q].cell] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_node() {
        let model = parse_model("x ~ dnorm(mu, 1)").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("undefined variable 'mu'"));
    }

    #[test]
    fn test_undefined_cell() {
        let model = parse_model("for (i in 1:2) { z[i] ~ dbern(0.5) }\nw <- z[1] + z[3]").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_cycle_detected() {
        let model = parse_model("a <- b + 1\nb <- a * 2").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_self_reference() {
        let model = parse_model("a ~ dnorm(a, 1)").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_defined_twice() {
        let model = parse_model("a ~ dnorm(0, 1)\na ~ dnorm(1, 1)").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_data_overwrite() {
        let model = parse_model("a <- 2").unwrap();
        let data = DataSet::new().with("a", Array::scalar(1.0));
        let err = Graph::compile(&model, &data).unwrap_err();
        assert!(err.to_string().contains("supplied as data"));
    }

    #[test]
    fn test_unknown_distribution() {
        let model = parse_model("a ~ dweib(1, 1)").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("unknown distribution 'dweib'"));
    }

    #[test]
    fn test_wrong_arity() {
        let model = parse_model("a ~ dnorm(0)").unwrap();
        assert!(Graph::compile(&model, &DataSet::new()).is_err());
    }

    #[test]
    fn test_loop_bound_must_be_data() {
        let model = parse_model("n ~ dpois(3)\nfor (i in 1:n) { x[i] ~ dnorm(0, 1) }").unwrap();
        let err = Graph::compile(&model, &DataSet::new()).unwrap_err();
        assert!(err.to_string().contains("cannot be used as an index"));
    }

    #[test]
    fn test_data_shape_mismatch() {
        let model = parse_model("for (i in 1:R) { for (j in 1:3) { y[i,j] ~ dbern(0.5) } }").unwrap();
        let data = DataSet::new()
            .with("R", Array::scalar(2.0))
            .with("y", Array::vector(vec![0.0, 1.0]));
        let err = Graph::compile(&model, &data).unwrap_err();
        assert!(matches!(err, SimError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_initialize_detects_structural_zero() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0]])).unwrap();
        let inits = DataSet::new()
            .with("z", Array::vector(vec![0.0, 0.0]))
            .with("psi", Array::scalar(0.5))
            .with("p", Array::scalar(0.5));
        let err = graph.initialize(&inits, &mut SimRng::new(1)).unwrap_err();
        match err {
            SimError::InconsistentNode { node } => assert_eq!(node, "y[1,1]"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_initialize_with_consistent_inits() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0]])).unwrap();
        let inits = DataSet::new().with("z", Array::vector(vec![1.0, 0.0]));
        let state = graph.initialize(&inits, &mut SimRng::new(1)).unwrap();
        let psi = graph.variable("psi").unwrap().start;
        assert!((0.0..=1.0).contains(&state[psi]));
        assert!(graph.log_likelihood(&state).is_finite());
    }

    #[test]
    fn test_inits_on_observed_node_rejected() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0]])).unwrap();
        let inits = DataSet::new().with("y", Array::from_column_major(vec![1, 2], vec![1.0, 0.0]).unwrap());
        assert!(matches!(
            graph.initialize(&inits, &mut SimRng::new(1)),
            Err(SimError::Engine(_))
        ));
    }

    #[test]
    fn test_monitor_cells() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let graph = Graph::compile(&model, &mean_data(&[[1.0, 0.0], [0.0, 0.0]])).unwrap();
        let cells = graph.monitor_cells("z").unwrap();
        assert_eq!(cells.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>(), vec!["z[1]", "z[2]"]);
        assert_eq!(graph.monitor_cells("psi").unwrap().len(), 1);
        assert!(graph.monitor_cells("nope").is_err());
    }

    #[test]
    fn test_forward_sample_respects_structure() {
        let model = ModelTemplate::ModelOfTheMean.build();
        let data = DataSet::new()
            .with("R", Array::scalar(50.0))
            .with("T", Array::scalar(3.0))
            .with("psi", Array::scalar(0.6))
            .with("p", Array::scalar(0.5));
        let graph = Graph::compile(&model, &data).unwrap();
        let draw = graph.forward_sample(&mut SimRng::new(3)).unwrap();
        let z = draw.get("z").unwrap();
        let y = draw.get("y").unwrap();
        for i in 1..=50 {
            if z.get(&[i]) == Some(0.0) {
                for j in 1..=3 {
                    assert_eq!(y.get(&[i, j]), Some(0.0));
                }
            }
        }
    }
}
