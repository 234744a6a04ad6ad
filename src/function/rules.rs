//! Composition rules.
//!
//! Every rule is a composite node: it maps its children into its own
//! parameter space and combines their values and gradients.
//!
//! - unary and binary scalar rules apply `f(g)` with the chain rule;
//! - the sum rule adds its terms;
//! - the product rule multiplies its factors in order, with gradient
//!   `sum_k (C_1..C_k-1) dC_k (C_k+1..C_n)`;
//! - the vector rule delegates to one of several models;
//! - the chain rule computes some parameters of a model from scalar
//!   functions and chains their gradients through;
//! - congruence, Mueller and outer-product rules propagate polarization
//!   states and transformations.
//!
//! Evaluating a rule whose required child is unset raises `InvalidState`.

use log::trace;
use std::f64::consts::{FRAC_2_SQRT_PI, FRAC_PI_2};

use super::evaluate::request;
use super::{Composite, Constraint, EvaluationPolicy, Graph, NodeId, NodeKind, ParameterPolicy, Slot};
use crate::error::{MealError, Result};
use crate::value::{pauli, Jones, Mueller, Value, ValueKind};

/// Below this magnitude `atanc` uses its Maclaurin series.
const ATANC_SERIES_LIMIT: f64 = 1e-3;

/// Scalar functions of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Square,
    Inverse,
    /// `1 / (1 + exp(-x))`
    Logistic,
    Erf,
    /// `atan(pi x / 2) / (pi x / 2)`
    Atanc,
}

impl UnaryOp {
    /// `(f(x), f'(x))`
    pub fn apply(&self, x: f64) -> (f64, f64) {
        match self {
            UnaryOp::Negate => (-x, -1.0),
            UnaryOp::Sin => (x.sin(), x.cos()),
            UnaryOp::Cos => (x.cos(), -x.sin()),
            UnaryOp::Tan => {
                let c = x.cos();
                (x.tan(), 1.0 / (c * c))
            }
            UnaryOp::Exp => {
                let e = x.exp();
                (e, e)
            }
            UnaryOp::Log => (x.ln(), 1.0 / x),
            UnaryOp::Sqrt => {
                let s = x.sqrt();
                (s, 0.5 / s)
            }
            UnaryOp::Abs => {
                let sign = if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                (x.abs(), sign)
            }
            UnaryOp::Square => (x * x, 2.0 * x),
            UnaryOp::Inverse => (1.0 / x, -1.0 / (x * x)),
            UnaryOp::Logistic => {
                let f = 1.0 / (1.0 + (-x).exp());
                (f, f * (1.0 - f))
            }
            UnaryOp::Erf => (libm::erf(x), FRAC_2_SQRT_PI * (-x * x).exp()),
            UnaryOp::Atanc => atanc(x),
        }
    }
}

/// `atan(z)/z` with `z = pi x / 2`, and its derivative with respect to `x`.
///
/// Near zero the direct formula is 0/0 and its derivative cancels
/// catastrophically, so the Maclaurin series
/// `1 - z^2/3 + z^4/5 - z^6/7 + z^8/9` is used instead.
pub fn atanc(x: f64) -> (f64, f64) {
    let z = FRAC_PI_2 * x;
    if x.abs() < ATANC_SERIES_LIMIT {
        let z2 = z * z;
        let f = 1.0 + z2 * (-1.0 / 3.0 + z2 * (1.0 / 5.0 + z2 * (-1.0 / 7.0 + z2 / 9.0)));
        let dfdz = z * (-2.0 / 3.0 + z2 * (4.0 / 5.0 + z2 * (-6.0 / 7.0 + z2 * 8.0 / 9.0)));
        (f, FRAC_PI_2 * dfdz)
    } else {
        let f = z.atan() / z;
        let dfdz = (1.0 / (1.0 + z * z) - f) / z;
        (f, FRAC_PI_2 * dfdz)
    }
}

/// Scalar functions of two arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `x1 - x2`
    Difference,
    /// `x1 / x2`
    Quotient,
    /// `x1 ^ x2`
    Power,
    /// `atan2(x1, x2)`, the angle of the point `(x2, x1)`
    Atan2,
}

impl BinaryOp {
    /// `(f, df/dx1, df/dx2)`
    pub fn apply(&self, x1: f64, x2: f64) -> (f64, f64, f64) {
        match self {
            BinaryOp::Difference => (x1 - x2, 1.0, -1.0),
            BinaryOp::Quotient => (x1 / x2, 1.0 / x2, -x1 / (x2 * x2)),
            BinaryOp::Power => {
                let f = x1.powf(x2);
                let d2 = if x1 > 0.0 { f * x1.ln() } else { 0.0 };
                (f, x2 * x1.powf(x2 - 1.0), d2)
            }
            BinaryOp::Atan2 => {
                let r2 = x1 * x1 + x2 * x2;
                (x1.atan2(x2), x2 / r2, -x1 / r2)
            }
        }
    }
}

fn missing(location: &str, what: &str) -> MealError {
    MealError::invalid_state(location, format!("no {}", what))
}

fn zeros(graph: &Graph, id: NodeId, kind: ValueKind) -> Result<Vec<Value>> {
    Ok(vec![Value::zero(kind); graph.nparam(id)?])
}

/// `a * b`, where `None` stands for the identity.
fn times(a: Option<&Value>, b: &Value) -> Result<Value> {
    match a {
        Some(a) => a.try_mul(b),
        None => Ok(b.clone()),
    }
}

/// Mueller matrix of a Jones matrix, `M_ij = Re tr(sigma_i J sigma_j J^dagger) / 2`.
pub fn mueller_of(jones: &Jones) -> Mueller {
    mueller_bilinear(jones, jones)
}

/// `Re tr(sigma_i A sigma_j B^dagger) / 2`
fn mueller_bilinear(a: &Jones, b: &Jones) -> Mueller {
    let b_dagger = b.adjoint();
    Mueller::from_fn(|i, j| 0.5 * (pauli(i) * a * pauli(j) * b_dagger).trace().re)
}

impl Graph {
    fn add_rule(&mut self, kind: NodeKind, result: ValueKind) -> Result<NodeId> {
        let name = kind.class_name();
        self.add_node(
            name,
            kind,
            ParameterPolicy::Composite(Composite::default()),
            result,
            EvaluationPolicy::Cached,
        )
    }

    fn kind_mut(&mut self, id: NodeId) -> Result<&mut NodeKind> {
        Ok(&mut self.node_mut(id)?.kind)
    }

    fn require_scalar(&self, child: NodeId, location: &str) -> Result<()> {
        let kind = self.result_kind(child)?;
        if kind != ValueKind::Scalar {
            return Err(MealError::invalid_param(
                location,
                format!("{} is {}, not Scalar", child, kind),
            ));
        }
        Ok(())
    }

    /// Unmap the previous occupant of a slot (if any) and map `child`.
    fn replace_slot(&mut self, parent: NodeId, previous: Option<Slot>, child: NodeId) -> Result<Slot> {
        if let Some(previous) = previous {
            self.unmap(parent, previous.key)?;
        }
        let key = self.map(parent, child)?;
        Ok(Slot {
            function: child,
            key,
        })
    }

    // ---------------------------------------------------------------- unary

    /// `f(arg)` for a scalar argument.
    pub fn unary(&mut self, op: UnaryOp, arg: NodeId) -> Result<NodeId> {
        let id = self.add_rule(NodeKind::Unary { op, arg: None }, ValueKind::Scalar)?;
        self.set_unary_argument(id, arg)?;
        Ok(id)
    }

    pub fn set_unary_argument(&mut self, id: NodeId, arg: NodeId) -> Result<()> {
        self.require_scalar(arg, "Graph::set_unary_argument")?;
        let previous = match self.node(id)?.kind {
            NodeKind::Unary { arg, .. } => arg,
            _ => return Err(not_a(id, "UnaryRule")),
        };
        let slot = self.replace_slot(id, previous, arg)?;
        if let NodeKind::Unary { arg, .. } = self.kind_mut(id)? {
            *arg = Some(slot);
        }
        Ok(())
    }

    pub(crate) fn calculate_unary(
        &mut self,
        id: NodeId,
        op: UnaryOp,
        arg: Option<Slot>,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let arg = arg.ok_or_else(|| missing("UnaryRule::calculate", "argument"))?;
        let mut arg_grad = Vec::new();
        let x = self
            .evaluate(arg.function, request(gradient.is_some(), &mut arg_grad))?
            .as_scalar()?;
        let (f, dfdx) = op.apply(x);

        if let Some(gradient) = gradient {
            let chained: Vec<Value> = arg_grad.iter().map(|g| g.scale(dfdx)).collect();
            *gradient = zeros(self, id, ValueKind::Scalar)?;
            self.project_gradient(id, arg.key, &chained, gradient)?;
        }
        Ok(Value::Scalar(f))
    }

    // --------------------------------------------------------------- binary

    /// `f(arg1, arg2)` for scalar arguments.
    pub fn binary(&mut self, op: BinaryOp, arg1: NodeId, arg2: NodeId) -> Result<NodeId> {
        let id = self.add_rule(
            NodeKind::Binary {
                op,
                arg1: None,
                arg2: None,
            },
            ValueKind::Scalar,
        )?;
        self.set_binary_argument(id, 1, arg1)?;
        self.set_binary_argument(id, 2, arg2)?;
        Ok(id)
    }

    /// Set the first (`which == 1`) or second (`which == 2`) argument.
    pub fn set_binary_argument(&mut self, id: NodeId, which: usize, child: NodeId) -> Result<()> {
        self.require_scalar(child, "Graph::set_binary_argument")?;
        let previous = match self.node(id)?.kind {
            NodeKind::Binary { arg1, arg2, .. } => match which {
                1 => arg1,
                2 => arg2,
                _ => {
                    return Err(MealError::invalid_range(
                        "Graph::set_binary_argument",
                        format!("argument {} not in 1..=2", which),
                    ))
                }
            },
            _ => return Err(not_a(id, "BinaryRule")),
        };
        let slot = self.replace_slot(id, previous, child)?;
        if let NodeKind::Binary { arg1, arg2, .. } = self.kind_mut(id)? {
            if which == 1 {
                *arg1 = Some(slot);
            } else {
                *arg2 = Some(slot);
            }
        }
        Ok(())
    }

    pub(crate) fn calculate_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        arg1: Option<Slot>,
        arg2: Option<Slot>,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let arg1 = arg1.ok_or_else(|| missing("BinaryRule::calculate", "first argument"))?;
        let arg2 = arg2.ok_or_else(|| missing("BinaryRule::calculate", "second argument"))?;
        let want = gradient.is_some();

        let mut grad1 = Vec::new();
        let x1 = self.evaluate(arg1.function, request(want, &mut grad1))?.as_scalar()?;
        let mut grad2 = Vec::new();
        let x2 = self.evaluate(arg2.function, request(want, &mut grad2))?.as_scalar()?;

        let (f, d1, d2) = op.apply(x1, x2);

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, ValueKind::Scalar)?;
            let chained1: Vec<Value> = grad1.iter().map(|g| g.scale(d1)).collect();
            self.project_gradient(id, arg1.key, &chained1, gradient)?;
            let chained2: Vec<Value> = grad2.iter().map(|g| g.scale(d2)).collect();
            self.project_gradient(id, arg2.key, &chained2, gradient)?;
        }
        Ok(Value::Scalar(f))
    }

    // ------------------------------------------------------------------ sum

    /// Sum of terms of kind `result`.
    pub fn sum(&mut self, result: ValueKind, terms: &[NodeId]) -> Result<NodeId> {
        let id = self.add_rule(NodeKind::Sum { terms: Vec::new() }, result)?;
        for term in terms {
            self.add_term(id, *term)?;
        }
        Ok(id)
    }

    pub fn add_term(&mut self, id: NodeId, term: NodeId) -> Result<()> {
        if !matches!(self.node(id)?.kind, NodeKind::Sum { .. }) {
            return Err(not_a(id, "SumRule"));
        }
        let key = self.map(id, term)?;
        if let NodeKind::Sum { terms } = self.kind_mut(id)? {
            terms.push(Slot {
                function: term,
                key,
            });
        }
        Ok(())
    }

    pub(crate) fn calculate_sum(
        &mut self,
        id: NodeId,
        result: ValueKind,
        terms: &[Slot],
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let want = gradient.is_some();
        let mut total = Value::zero(result);
        let mut all_gradients = Vec::new();

        for term in terms {
            let mut term_grad = Vec::new();
            let value = self.evaluate(term.function, request(want, &mut term_grad))?;
            total = total.try_add(&value)?;
            all_gradients.extend(term_grad);
        }

        if let Some(gradient) = gradient {
            let keys: Vec<_> = terms.iter().map(|t| t.key).collect();
            self.project_gradients(id, &keys, &all_gradients, result, gradient)?;
        }
        Ok(total)
    }

    // -------------------------------------------------------------- product

    /// Ordered product of factors with result kind `result`.
    pub fn product(&mut self, result: ValueKind, factors: &[NodeId]) -> Result<NodeId> {
        let id = self.add_rule(
            NodeKind::Product {
                factors: Vec::new(),
            },
            result,
        )?;
        for factor in factors {
            self.add_factor(id, *factor)?;
        }
        Ok(id)
    }

    /// Append a factor on the right.
    pub fn add_factor(&mut self, id: NodeId, factor: NodeId) -> Result<()> {
        if !matches!(self.node(id)?.kind, NodeKind::Product { .. }) {
            return Err(not_a(id, "ProductRule"));
        }
        let key = self.map(id, factor)?;
        if let NodeKind::Product { factors } = self.kind_mut(id)? {
            factors.push(Slot {
                function: factor,
                key,
            });
        }
        Ok(())
    }

    pub(crate) fn calculate_product(
        &mut self,
        id: NodeId,
        result: ValueKind,
        factors: &[Slot],
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        if factors.is_empty() {
            if let Some(gradient) = gradient {
                *gradient = zeros(self, id, result)?;
            }
            return Value::identity(result);
        }

        let want = gradient.is_some();
        let mut values = Vec::with_capacity(factors.len());
        let mut grads = Vec::with_capacity(factors.len());
        for factor in factors {
            let mut factor_grad = Vec::new();
            values.push(self.evaluate(factor.function, request(want, &mut factor_grad))?);
            grads.push(factor_grad);
        }

        // prefix[k] = C_0..C_k-1 and suffix[k] = C_k+1..C_n-1; None is the identity
        let n = values.len();
        let mut prefix: Vec<Option<Value>> = vec![None; n];
        for k in 1..n {
            prefix[k] = Some(times(prefix[k - 1].as_ref(), &values[k - 1])?);
        }
        let mut suffix: Vec<Option<Value>> = vec![None; n];
        for k in (0..n - 1).rev() {
            suffix[k] = Some(match &suffix[k + 1] {
                Some(s) => values[k + 1].try_mul(s)?,
                None => values[k + 1].clone(),
            });
        }

        let total = times(prefix[n - 1].as_ref(), &values[n - 1])?;

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, result)?;
            for (k, factor) in factors.iter().enumerate() {
                let mut terms = Vec::with_capacity(grads[k].len());
                for g in &grads[k] {
                    let left = times(prefix[k].as_ref(), g)?;
                    let term = match &suffix[k] {
                        Some(s) => left.try_mul(s)?,
                        None => left,
                    };
                    terms.push(term);
                }
                self.project_gradient(id, factor.key, &terms, gradient)?;
            }
        }
        Ok(total)
    }

    // --------------------------------------------------------------- vector

    /// Selection of one of several models of kind `result`.
    pub fn vector(&mut self, result: ValueKind, models: &[NodeId]) -> Result<NodeId> {
        let id = self.add_rule(
            NodeKind::Vector {
                models: Vec::new(),
                index: 0,
            },
            result,
        )?;
        for model in models {
            self.push_model(id, *model)?;
        }
        Ok(id)
    }

    /// Append a model; returns its index.
    pub fn push_model(&mut self, id: NodeId, model: NodeId) -> Result<usize> {
        if !matches!(self.node(id)?.kind, NodeKind::Vector { .. }) {
            return Err(not_a(id, "VectorRule"));
        }
        let key = self.map(id, model)?;
        match self.kind_mut(id)? {
            NodeKind::Vector { models, .. } => {
                models.push(Slot {
                    function: model,
                    key,
                });
                Ok(models.len() - 1)
            }
            _ => Err(not_a(id, "VectorRule")),
        }
    }

    pub fn get_nmodel(&self, id: NodeId) -> Result<usize> {
        match &self.node(id)?.kind {
            NodeKind::Vector { models, .. } => Ok(models.len()),
            _ => Err(not_a(id, "VectorRule")),
        }
    }

    pub fn get_index(&self, id: NodeId) -> Result<usize> {
        match &self.node(id)?.kind {
            NodeKind::Vector { index, .. } => Ok(*index),
            _ => Err(not_a(id, "VectorRule")),
        }
    }

    /// Select the model used by subsequent evaluations.
    pub fn set_index(&mut self, id: NodeId, new_index: usize) -> Result<()> {
        let changed = match self.kind_mut(id)? {
            NodeKind::Vector { models, index } => {
                if new_index >= models.len() {
                    return Err(MealError::invalid_range(
                        "Graph::set_index",
                        format!("index={} >= nmodel={}", new_index, models.len()),
                    ));
                }
                std::mem::replace(index, new_index) != new_index
            }
            _ => return Err(not_a(id, "VectorRule")),
        };
        if changed {
            self.set_evaluation_changed(id)?;
        }
        Ok(())
    }

    pub(crate) fn calculate_vector(
        &mut self,
        id: NodeId,
        result: ValueKind,
        models: &[Slot],
        index: usize,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let model = models
            .get(index)
            .copied()
            .ok_or_else(|| missing("VectorRule::calculate", "model at the current index"))?;

        let mut model_grad = Vec::new();
        let value = self.evaluate(model.function, request(gradient.is_some(), &mut model_grad))?;

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, result)?;
            self.project_gradient(id, model.key, &model_grad, gradient)?;
        }
        Ok(value)
    }

    // ---------------------------------------------------------------- chain

    /// A model whose parameters may be constrained by scalar functions.
    pub fn chain(&mut self, model: NodeId) -> Result<NodeId> {
        let result = self.result_kind(model)?;
        let id = self.add_rule(
            NodeKind::Chain {
                model: None,
                constraints: Vec::new(),
            },
            result,
        )?;
        self.set_chain_model(id, model)?;
        Ok(id)
    }

    pub fn set_chain_model(&mut self, id: NodeId, model: NodeId) -> Result<()> {
        let (previous, constraints) = match &self.node(id)?.kind {
            NodeKind::Chain { model, constraints } => (*model, constraints.clone()),
            _ => return Err(not_a(id, "ChainRule")),
        };
        let slot = self.replace_slot(id, previous, model)?;
        if let NodeKind::Chain { model, .. } = self.kind_mut(id)? {
            *model = Some(slot);
        }
        for constraint in constraints {
            self.set_infit(model, constraint.parameter, false)?;
        }
        Ok(())
    }

    /// Compute model parameter `parameter` with a scalar function.
    ///
    /// Only one function may constrain a parameter; a second call for the
    /// same parameter replaces the first. The constrained parameter is
    /// removed from the fit.
    pub fn set_constraint(&mut self, id: NodeId, parameter: usize, scalar: NodeId) -> Result<()> {
        self.require_scalar(scalar, "Graph::set_constraint")?;
        let (model, constraints) = match &self.node(id)?.kind {
            NodeKind::Chain { model, constraints } => (*model, constraints.clone()),
            _ => return Err(not_a(id, "ChainRule")),
        };
        let model = model.ok_or_else(|| missing("Graph::set_constraint", "model"))?;
        let nparam = self.nparam(model.function)?;
        if parameter >= nparam {
            return Err(MealError::invalid_range(
                "Graph::set_constraint",
                format!("parameter={} >= nparam={}", parameter, nparam),
            ));
        }

        let existing = constraints.iter().position(|c| c.parameter == parameter);
        let previous = existing.map(|i| constraints[i].scalar);
        trace!(
            "Graph::set_constraint {} param={} replace={}",
            id,
            parameter,
            previous.is_some()
        );
        let slot = self.replace_slot(id, previous, scalar)?;

        if let NodeKind::Chain { constraints, .. } = self.kind_mut(id)? {
            let constraint = Constraint {
                parameter,
                scalar: slot,
            };
            match existing {
                Some(i) => constraints[i] = constraint,
                None => constraints.push(constraint),
            }
        }
        self.set_infit(model.function, parameter, false)
    }

    /// Release a constrained parameter; it becomes free again.
    pub fn remove_constraint(&mut self, id: NodeId, parameter: usize) -> Result<()> {
        let (model, constraints) = match &self.node(id)?.kind {
            NodeKind::Chain { model, constraints } => (*model, constraints.clone()),
            _ => return Err(not_a(id, "ChainRule")),
        };
        let Some(i) = constraints.iter().position(|c| c.parameter == parameter) else {
            return Ok(());
        };
        self.unmap(id, constraints[i].scalar.key)?;
        if let NodeKind::Chain { constraints, .. } = self.kind_mut(id)? {
            constraints.remove(i);
        }
        if let Some(model) = model {
            self.set_infit(model.function, parameter, true)?;
        }
        Ok(())
    }

    /// The scalar function constraining a model parameter, if any.
    pub fn get_constraint(&self, id: NodeId, parameter: usize) -> Result<Option<NodeId>> {
        match &self.node(id)?.kind {
            NodeKind::Chain { constraints, .. } => Ok(constraints
                .iter()
                .find(|c| c.parameter == parameter)
                .map(|c| c.scalar.function)),
            _ => Err(not_a(id, "ChainRule")),
        }
    }

    pub(crate) fn calculate_chain(
        &mut self,
        id: NodeId,
        result: ValueKind,
        model: Option<Slot>,
        constraints: &[Constraint],
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let model = model.ok_or_else(|| missing("ChainRule::calculate", "model"))?;
        let want = gradient.is_some();

        let mut constraint_grads = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            let mut scalar_grad = Vec::new();
            let value = self
                .evaluate(constraint.scalar.function, request(want, &mut scalar_grad))?
                .as_scalar()?;
            self.set_param(model.function, constraint.parameter, value)?;
            constraint_grads.push(scalar_grad);
        }

        let mut model_grad = Vec::new();
        let value = self.evaluate(model.function, request(want, &mut model_grad))?;

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, result)?;
            self.project_gradient(id, model.key, &model_grad, gradient)?;

            // dM/dx_i = dM/df * df/dx_i for each parameter x_i of the constraint f
            for (constraint, scalar_grad) in constraints.iter().zip(&constraint_grads) {
                let dmdf = model_grad.get(constraint.parameter).ok_or_else(|| {
                    MealError::invalid_state("ChainRule::calculate", "model gradient too short")
                })?;
                let chained: Vec<Value> = scalar_grad
                    .iter()
                    .map(|g| g.as_scalar().map(|dfdx| dmdf.scale(dfdx)))
                    .collect::<Result<_>>()?;
                self.project_gradient(id, constraint.scalar.key, &chained, gradient)?;
            }
        }
        Ok(value)
    }

    // ----------------------------------------------------------- congruence

    /// An empty congruence transformation `J rho J^dagger`.
    pub fn congruence(&mut self) -> Result<NodeId> {
        self.add_rule(
            NodeKind::Congruence {
                transformation: None,
                input: None,
            },
            ValueKind::Jones,
        )
    }

    /// Set the Jones transformation `J`.
    pub fn set_transformation(&mut self, id: NodeId, transformation: NodeId) -> Result<()> {
        let previous = match self.node(id)?.kind {
            NodeKind::Congruence { transformation, .. } => transformation,
            _ => return Err(not_a(id, "Congruence")),
        };
        let slot = self.replace_slot(id, previous, transformation)?;
        if let NodeKind::Congruence { transformation, .. } = self.kind_mut(id)? {
            *transformation = Some(slot);
        }
        Ok(())
    }

    /// Set the input coherency matrix `rho`.
    pub fn set_input(&mut self, id: NodeId, input: NodeId) -> Result<()> {
        let previous = match self.node(id)?.kind {
            NodeKind::Congruence { input, .. } => input,
            _ => return Err(not_a(id, "Congruence")),
        };
        let slot = self.replace_slot(id, previous, input)?;
        if let NodeKind::Congruence { input, .. } = self.kind_mut(id)? {
            *input = Some(slot);
        }
        Ok(())
    }

    pub(crate) fn calculate_congruence(
        &mut self,
        id: NodeId,
        transformation: Option<Slot>,
        input: Option<Slot>,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let transformation =
            transformation.ok_or_else(|| missing("Congruence::calculate", "transformation"))?;
        let input = input.ok_or_else(|| missing("Congruence::calculate", "input"))?;
        let want = gradient.is_some();

        let mut j_grad = Vec::new();
        let j = self
            .evaluate(transformation.function, request(want, &mut j_grad))?
            .as_jones()?;
        let mut rho_grad = Vec::new();
        let rho = self.evaluate(input.function, request(want, &mut rho_grad))?.as_jones()?;

        let j_dagger = j.adjoint();
        let result = j * rho * j_dagger;

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, ValueKind::Jones)?;

            // d(J rho J^dagger) = dJ rho J^dagger + J rho dJ^dagger
            let terms = j_grad
                .iter()
                .map(|g| {
                    let dj = g.as_jones()?;
                    Ok(Value::Jones(dj * rho * j_dagger + j * rho * dj.adjoint()))
                })
                .collect::<Result<Vec<_>>>()?;
            self.project_gradient(id, transformation.key, &terms, gradient)?;

            let terms = rho_grad
                .iter()
                .map(|g| Ok(Value::Jones(j * g.as_jones()? * j_dagger)))
                .collect::<Result<Vec<_>>>()?;
            self.project_gradient(id, input.key, &terms, gradient)?;
        }
        Ok(Value::Jones(result))
    }

    // -------------------------------------------------------------- mueller

    /// The Mueller matrix of a Jones transformation.
    pub fn mueller(&mut self, jones: NodeId) -> Result<NodeId> {
        let id = self.add_rule(NodeKind::MuellerOf { jones: None }, ValueKind::Mueller)?;
        let slot = self.replace_slot(id, None, jones)?;
        if let NodeKind::MuellerOf { jones } = self.kind_mut(id)? {
            *jones = Some(slot);
        }
        Ok(id)
    }

    pub(crate) fn calculate_mueller(
        &mut self,
        id: NodeId,
        jones: Option<Slot>,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let jones = jones.ok_or_else(|| missing("MuellerOf::calculate", "transformation"))?;
        let mut j_grad = Vec::new();
        let j = self
            .evaluate(jones.function, request(gradient.is_some(), &mut j_grad))?
            .as_jones()?;

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, ValueKind::Mueller)?;
            let terms = j_grad
                .iter()
                .map(|g| {
                    let dj = g.as_jones()?;
                    Ok(Value::Mueller(mueller_bilinear(&dj, &j) + mueller_bilinear(&j, &dj)))
                })
                .collect::<Result<Vec<_>>>()?;
            self.project_gradient(id, jones.key, &terms, gradient)?;
        }
        Ok(Value::Mueller(mueller_of(&j)))
    }

    // ---------------------------------------------------------------- outer

    /// The coherency matrix `s s^dagger` of a spinor.
    pub fn outer(&mut self, spinor: NodeId) -> Result<NodeId> {
        let id = self.add_rule(NodeKind::Outer { spinor: None }, ValueKind::Jones)?;
        let slot = self.replace_slot(id, None, spinor)?;
        if let NodeKind::Outer { spinor } = self.kind_mut(id)? {
            *spinor = Some(slot);
        }
        Ok(id)
    }

    pub(crate) fn calculate_outer(
        &mut self,
        id: NodeId,
        spinor: Option<Slot>,
        gradient: Option<&mut Vec<Value>>,
    ) -> Result<Value> {
        let spinor = spinor.ok_or_else(|| missing("Outer::calculate", "spinor"))?;
        let mut s_grad = Vec::new();
        let s = self
            .evaluate(spinor.function, request(gradient.is_some(), &mut s_grad))?
            .as_spinor()?;
        let s_dagger = s.adjoint();

        if let Some(gradient) = gradient {
            *gradient = zeros(self, id, ValueKind::Jones)?;
            let terms = s_grad
                .iter()
                .map(|g| {
                    let ds = g.as_spinor()?;
                    Ok(Value::Jones(ds * s_dagger + s * ds.adjoint()))
                })
                .collect::<Result<Vec<_>>>()?;
            self.project_gradient(id, spinor.key, &terms, gradient)?;
        }
        Ok(Value::Jones(s * s_dagger))
    }
}

fn not_a(id: NodeId, class: &str) -> MealError {
    MealError::invalid_param("Graph", format!("{} is not a {}", id, class))
}
