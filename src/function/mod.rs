//! Differentiable function graphs.
//!
//! Functions live in an arena ([`Graph`]) and are addressed by [`NodeId`].
//! A node either owns its parameters (a leaf, backed by a
//! [`ParameterStore`]), owns none (a constant), or addresses the parameters
//! of the children it composes through a [`Composite`] index map. A child
//! may be composed by several parents at once; every parent registers
//! itself as an observer of the child and is invalidated whenever the
//! child changes.
//!
//! ## Core Components
//!
//! - [`Graph`]: node storage, parameter access and change notification
//! - [`NodeKind`]: what a node computes (leaf primitives and composition rules)
//! - [`composite`]: mapping of child parameters into a flat parent index space
//! - [`gradient`]: scattering of child gradients into parent gradients
//! - [`scalar_math`]: builders for scalar expression graphs

pub mod composite;
mod evaluate;
pub mod gradient;
pub mod leaves;
pub mod rules;
pub mod scalar_math;

use log::trace;
use std::fmt;

use crate::error::{MealError, Result};
use crate::parameters::{CyclicBounds, Estimate, Parameter, ParameterStore};
use crate::value::{Axis, Value, ValueKind};

pub use composite::{Composite, Projection, ProjectionKey};
pub use rules::{BinaryOp, UnaryOp};

/// Handle of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// When a node recomputes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPolicy {
    /// Recompute only when the node has changed, or when a gradient is
    /// requested that was not computed with the stored result.
    Cached,

    /// Recompute on every call.
    NotCached,
}

/// The property of a node whose change is being announced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// The number of parameters may have changed.
    ParameterCount,

    /// The result of evaluation may have changed.
    Evaluation,
}

/// A composed child: the child node and the key of its projection in
/// the parent's composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub function: NodeId,
    pub key: ProjectionKey,
}

/// A parameter of a chain-rule model computed by a scalar function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Index of the constrained parameter of the model
    pub parameter: usize,

    /// The constraining scalar function
    pub scalar: Slot,
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// One free scalar parameter, `f = x`.
    ScalarValue,

    /// A fixed value without parameters.
    Constant(Value),

    /// An independent variable (time, frequency, pulse phase); no parameters.
    Argument { value: f64 },

    /// `f = sum_k c_k (x - x0)^k` in the coefficients `c_k`.
    Polynomial { abscissa: f64, offset: f64 },

    /// `f = g * identity`, scalar, complex or Jones.
    Gain,

    /// `J = cosh(beta) I + sinh(beta) sigma_axis`.
    Boost { axis: Axis },

    /// `J = cos(phi) I + i sin(phi) sigma_axis`.
    Rotation { axis: Axis },

    /// `z = x + i y`.
    ComplexCartesian,

    /// Coherency matrix of four free Stokes parameters.
    Coherency,

    /// Spinor of four free real components.
    Spinor,

    /// Faraday rotation by rotation measure times the change in wavelength squared.
    Faraday {
        frequency: f64,
        reference_frequency: Option<f64>,
    },

    Unary { op: UnaryOp, arg: Option<Slot> },

    Binary {
        op: BinaryOp,
        arg1: Option<Slot>,
        arg2: Option<Slot>,
    },

    Sum { terms: Vec<Slot> },

    Product { factors: Vec<Slot> },

    /// Delegates to the model at `index`.
    Vector { models: Vec<Slot>, index: usize },

    /// A model some of whose parameters are computed by scalar functions.
    Chain {
        model: Option<Slot>,
        constraints: Vec<Constraint>,
    },

    /// `rho' = J rho J^dagger`.
    Congruence {
        transformation: Option<Slot>,
        input: Option<Slot>,
    },

    /// Mueller matrix of a Jones matrix.
    MuellerOf { jones: Option<Slot> },

    /// Coherency matrix `s s^dagger` of a spinor.
    Outer { spinor: Option<Slot> },
}

impl NodeKind {
    /// Short class name used in messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            NodeKind::ScalarValue => "ScalarValue",
            NodeKind::Constant(_) => "Constant",
            NodeKind::Argument { .. } => "Argument",
            NodeKind::Polynomial { .. } => "Polynomial",
            NodeKind::Gain => "Gain",
            NodeKind::Boost { .. } => "Boost",
            NodeKind::Rotation { .. } => "Rotation",
            NodeKind::ComplexCartesian => "ComplexCartesian",
            NodeKind::Coherency => "Coherency",
            NodeKind::Spinor => "Spinor",
            NodeKind::Faraday { .. } => "Faraday",
            NodeKind::Unary { .. } => "UnaryRule",
            NodeKind::Binary { .. } => "BinaryRule",
            NodeKind::Sum { .. } => "SumRule",
            NodeKind::Product { .. } => "ProductRule",
            NodeKind::Vector { .. } => "VectorRule",
            NodeKind::Chain { .. } => "ChainRule",
            NodeKind::Congruence { .. } => "Congruence",
            NodeKind::MuellerOf { .. } => "MuellerOf",
            NodeKind::Outer { .. } => "Outer",
        }
    }
}

/// Where a node's parameters come from.
#[derive(Debug, Clone)]
pub(crate) enum ParameterPolicy {
    /// Owned parameters.
    Store(ParameterStore),

    /// No parameters; never mapped into a composite.
    Constant,

    /// The parameters of mapped children.
    Composite(Composite),
}

#[derive(Debug, Clone)]
struct Cache {
    value: Value,
    gradient: Option<Vec<Value>>,
}

/// One function in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parameters: ParameterPolicy,
    result: ValueKind,
    policy: EvaluationPolicy,
    changed: bool,
    cache: Option<Cache>,
    observers: Vec<NodeId>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn result_kind(&self) -> ValueKind {
        self.result
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.parameters, ParameterPolicy::Constant)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.parameters, ParameterPolicy::Composite(_))
    }
}

/// Arena of function nodes.
///
/// Nodes are never removed; a node that is no longer composed by anything
/// simply stops being evaluated.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes allocated.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or_else(|| {
            MealError::invalid_range(
                "Graph::node",
                format!("node {} >= nnode={}", id, self.nodes.len()),
            )
        })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        let nnode = self.nodes.len();
        self.nodes.get_mut(id.0).ok_or_else(|| {
            MealError::invalid_range("Graph::node_mut", format!("node {} >= nnode={}", id, nnode))
        })
    }

    pub(crate) fn add_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        parameters: ParameterPolicy,
        result: ValueKind,
        policy: EvaluationPolicy,
    ) -> Result<NodeId> {
        self.nodes.try_reserve(1).map_err(|e| {
            MealError::BadAllocation(format!("Graph::add_node {}: {}", kind.class_name(), e))
        })?;
        let id = NodeId(self.nodes.len());
        trace!("Graph::add_node {} {} name={}", id, kind.class_name(), name);
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
            parameters,
            result,
            policy,
            changed: true,
            cache: None,
            observers: Vec::new(),
        });
        Ok(id)
    }

    pub fn get_name(&self, id: NodeId) -> Result<&str> {
        Ok(self.node(id)?.name())
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.node_mut(id)?.name = name.to_string();
        Ok(())
    }

    pub fn result_kind(&self, id: NodeId) -> Result<ValueKind> {
        Ok(self.node(id)?.result)
    }

    pub fn get_policy(&self, id: NodeId) -> Result<EvaluationPolicy> {
        Ok(self.node(id)?.policy)
    }

    /// Choose the evaluation policy of one node.
    pub fn set_policy(&mut self, id: NodeId, policy: EvaluationPolicy) -> Result<()> {
        let node = self.node_mut(id)?;
        node.policy = policy;
        node.cache = None;
        Ok(())
    }

    /// Nodes notified when this node changes, one entry per projection.
    pub fn observers(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.observers)
    }

    /// Number of scalar parameters owned by, or reachable through, a node.
    pub fn nparam(&self, id: NodeId) -> Result<usize> {
        match &self.node(id)?.parameters {
            ParameterPolicy::Store(store) => Ok(store.len()),
            ParameterPolicy::Constant => Ok(0),
            ParameterPolicy::Composite(composite) => Ok(composite.nparameters()),
        }
    }

    /// Resolve a parameter index to the leaf that owns it.
    pub(crate) fn locate(&self, id: NodeId, index: usize) -> Result<(NodeId, usize)> {
        let mut id = id;
        let mut index = index;
        loop {
            match &self.node(id)?.parameters {
                ParameterPolicy::Store(store) => {
                    if index >= store.len() {
                        return Err(MealError::invalid_range(
                            "Graph::locate",
                            format!("index={} >= nparam={} of {}", index, store.len(), id),
                        ));
                    }
                    return Ok((id, index));
                }
                ParameterPolicy::Constant => {
                    return Err(MealError::invalid_range(
                        "Graph::locate",
                        format!("{} has no parameters", id),
                    ));
                }
                ParameterPolicy::Composite(_) => {
                    let (child, local) = self.get_function(id, index)?;
                    id = child;
                    index = local;
                }
            }
        }
    }

    fn store(&self, id: NodeId) -> Result<&ParameterStore> {
        match &self.node(id)?.parameters {
            ParameterPolicy::Store(store) => Ok(store),
            _ => Err(MealError::invalid_state(
                "Graph::store",
                format!("{} does not own parameters", id),
            )),
        }
    }

    pub(crate) fn store_mut(&mut self, id: NodeId) -> Result<&mut ParameterStore> {
        match &mut self.node_mut(id)?.parameters {
            ParameterPolicy::Store(store) => Ok(store),
            _ => Err(MealError::invalid_state(
                "Graph::store_mut",
                format!("{} does not own parameters", id),
            )),
        }
    }

    pub fn get_param(&self, id: NodeId, index: usize) -> Result<f64> {
        let (leaf, local) = self.locate(id, index)?;
        self.store(leaf)?.get_param(local)
    }

    /// Write a parameter; a changed value invalidates every dependant.
    pub fn set_param(&mut self, id: NodeId, index: usize, value: f64) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        if self.store_mut(leaf)?.set_param(local, value)? {
            self.set_evaluation_changed(leaf)?;
        }
        Ok(())
    }

    pub fn get_variance(&self, id: NodeId, index: usize) -> Result<f64> {
        let (leaf, local) = self.locate(id, index)?;
        self.store(leaf)?.get_variance(local)
    }

    pub fn set_variance(&mut self, id: NodeId, index: usize, variance: f64) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        self.store_mut(leaf)?.set_variance(local, variance)
    }

    pub fn get_infit(&self, id: NodeId, index: usize) -> Result<bool> {
        let (leaf, local) = self.locate(id, index)?;
        self.store(leaf)?.get_infit(local)
    }

    pub fn set_infit(&mut self, id: NodeId, index: usize, infit: bool) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        self.store_mut(leaf)?.set_infit(local, infit)
    }

    pub fn get_param_name(&self, id: NodeId, index: usize) -> Result<String> {
        let (leaf, local) = self.locate(id, index)?;
        Ok(self.store(leaf)?.get_param_name(local)?.to_string())
    }

    pub fn set_param_name(&mut self, id: NodeId, index: usize, name: &str) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        self.store_mut(leaf)?.set_param_name(local, name)
    }

    pub fn get_estimate(&self, id: NodeId, index: usize) -> Result<Estimate> {
        let (leaf, local) = self.locate(id, index)?;
        self.store(leaf)?.get_estimate(local)
    }

    pub fn set_estimate(&mut self, id: NodeId, index: usize, estimate: Estimate) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        if self.store_mut(leaf)?.set_estimate(local, estimate)? {
            self.set_evaluation_changed(leaf)?;
        }
        Ok(())
    }

    /// Install (or remove) cyclic bounds on a parameter.
    pub fn set_cyclic(&mut self, id: NodeId, index: usize, cyclic: Option<CyclicBounds>) -> Result<()> {
        let (leaf, local) = self.locate(id, index)?;
        let before = self.store(leaf)?.get_param(local)?;
        self.store_mut(leaf)?.set_cyclic(local, cyclic)?;
        if self.store(leaf)?.get_param(local)?.to_bits() != before.to_bits() {
            self.set_evaluation_changed(leaf)?;
        }
        Ok(())
    }

    pub fn evaluation_changed(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.changed)
    }

    /// Mark a node changed and notify every transitive observer.
    ///
    /// Invalidation is idempotent: each node is visited once per call, so
    /// diamond-shaped sharing costs nothing extra.
    pub fn set_evaluation_changed(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        let mut visited = vec![false; self.nodes.len()];
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if visited[current.0] {
                continue;
            }
            visited[current.0] = true;
            let node = &mut self.nodes[current.0];
            node.changed = true;
            pending.extend(node.observers.iter().copied());
        }
        Ok(())
    }

    pub(crate) fn clear_evaluation_changed(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.changed = false;
        Ok(())
    }

    /// Tell the observers of a node about a change to one of its attributes.
    pub fn notify(&mut self, id: NodeId, attribute: Attribute) -> Result<()> {
        match attribute {
            Attribute::Evaluation => self.set_evaluation_changed(id),
            Attribute::ParameterCount => {
                let mut observers = self.node(id)?.observers.clone();
                observers.sort();
                observers.dedup();
                for observer in observers {
                    trace!("Graph::notify ParameterCount {} -> {}", id, observer);
                    self.remap(observer)?;
                }
                self.set_evaluation_changed(id)
            }
        }
    }

    pub(crate) fn add_observer(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        self.node_mut(child)?.observers.push(parent);
        Ok(())
    }

    pub(crate) fn remove_observer(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        let observers = &mut self.node_mut(child)?.observers;
        if let Some(pos) = observers.iter().position(|o| *o == parent) {
            observers.remove(pos);
        }
        Ok(())
    }

    /// Copy value, variance and fit flag of every parameter from `src` to `dst`.
    ///
    /// The graph structure of `dst` is left unchanged; the two nodes must
    /// have the same number of parameters.
    pub fn copy_parameters(&mut self, dst: NodeId, src: NodeId) -> Result<()> {
        let nsrc = self.nparam(src)?;
        let ndst = self.nparam(dst)?;
        if nsrc != ndst {
            return Err(MealError::invalid_param(
                "Graph::copy_parameters",
                format!("nparam mismatch: source={} destination={}", nsrc, ndst),
            ));
        }
        let state = self.snapshot(src)?;
        self.restore(dst, &state)
    }

    /// Value, variance, fit flag and name of every parameter, in order.
    pub fn snapshot(&self, id: NodeId) -> Result<Vec<Parameter>> {
        (0..self.nparam(id)?)
            .map(|i| {
                let (leaf, local) = self.locate(id, i)?;
                Ok(self.store(leaf)?.get(local)?.clone())
            })
            .collect()
    }

    /// Restore a snapshot taken with [`Graph::snapshot`].
    pub fn restore(&mut self, id: NodeId, state: &[Parameter]) -> Result<()> {
        let nparam = self.nparam(id)?;
        if state.len() != nparam {
            return Err(MealError::invalid_param(
                "Graph::restore",
                format!("snapshot size={} != nparam={}", state.len(), nparam),
            ));
        }
        for (i, param) in state.iter().enumerate() {
            let (leaf, local) = self.locate(id, i)?;
            let changed = self.store_mut(leaf)?.get_mut(local)?.copy_state(param);
            if changed {
                self.set_evaluation_changed(leaf)?;
            }
        }
        Ok(())
    }

    /// One line per parameter: index, name, estimate and fit flag.
    pub fn print_parameters(&self, id: NodeId) -> Result<String> {
        let mut out = String::new();
        for i in 0..self.nparam(id)? {
            let name = self.get_param_name(id, i)?;
            let estimate = self.get_estimate(id, i)?;
            let flag = if self.get_infit(id, i)? { "" } else { " (fixed)" };
            out.push_str(&format!("{:>3} {} = {}{}\n", i, name, estimate, flag));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_leaf_parameter_access() {
        let mut graph = Graph::new();
        let x = graph.scalar_value("x", 1.5).unwrap();

        assert_eq!(graph.nparam(x).unwrap(), 1);
        assert_eq!(graph.get_param(x, 0).unwrap(), 1.5);
        assert_eq!(graph.get_param_name(x, 0).unwrap(), "x");

        graph.set_variance(x, 0, 0.04).unwrap();
        assert_eq!(graph.get_estimate(x, 0).unwrap(), Estimate::new(1.5, 0.04));
        assert_eq!(graph.get_param(x, 1).unwrap_err().kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn test_unchanged_write_keeps_cache() {
        let mut graph = Graph::new();
        let x = graph.scalar_value("x", 2.0).unwrap();
        let y = graph.square(x).unwrap();

        graph.evaluate(y, None).unwrap();
        assert!(!graph.evaluation_changed(y).unwrap());

        graph.set_param(x, 0, 2.0).unwrap();
        assert!(!graph.evaluation_changed(y).unwrap());

        graph.set_param(x, 0, 3.0).unwrap();
        assert!(graph.evaluation_changed(y).unwrap());
    }

    #[test]
    fn test_copy_parameters() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let b = graph.scalar_value("b", 5.0).unwrap();
        let pair = graph.sum(ValueKind::Scalar, &[a, b]).unwrap();
        let c = graph.scalar_value("c", 0.0).unwrap();

        graph.set_variance(b, 0, 0.5).unwrap();
        graph.set_infit(b, 0, false).unwrap();

        assert_eq!(
            graph.copy_parameters(c, pair).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );

        graph.copy_parameters(c, b).unwrap();
        assert_eq!(graph.get_param(c, 0).unwrap(), 5.0);
        assert_eq!(graph.get_variance(c, 0).unwrap(), 0.5);
        assert!(!graph.get_infit(c, 0).unwrap());
        assert_eq!(graph.get_param_name(c, 0).unwrap(), "c");
    }

    #[test]
    fn test_print_parameters() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("alpha", 1.0).unwrap();
        graph.set_infit(a, 0, false).unwrap();
        let text = graph.print_parameters(a).unwrap();
        assert!(text.contains("alpha = 1 (fixed)"));
    }
}
