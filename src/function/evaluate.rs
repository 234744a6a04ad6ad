//! Evaluation with caching and first-order error propagation.

use log::trace;

use super::leaves::calculate_leaf;
use super::{Cache, EvaluationPolicy, Graph, NodeId, NodeKind};
use crate::error::{MealError, Result};
use crate::parameters::Estimate;
use crate::value::{Value, ValueEstimate};

/// Borrow `storage` as a gradient output only when one is wanted.
pub(crate) fn request(wanted: bool, storage: &mut Vec<Value>) -> Option<&mut Vec<Value>> {
    if wanted {
        Some(storage)
    } else {
        None
    }
}

impl Graph {
    /// The cached result, if it is valid and carries what is asked for.
    fn cached(&self, id: NodeId, want_gradient: bool) -> Result<Option<(Value, Option<Vec<Value>>)>> {
        let node = self.node(id)?;
        if node.policy != EvaluationPolicy::Cached || node.changed {
            return Ok(None);
        }
        match &node.cache {
            Some(cache) if !want_gradient => Ok(Some((cache.value.clone(), None))),
            Some(Cache {
                value,
                gradient: Some(gradient),
            }) => Ok(Some((value.clone(), Some(gradient.clone())))),
            _ => Ok(None),
        }
    }

    /// Evaluate a node, optionally with its gradient.
    ///
    /// When `gradient` is given it receives one partial derivative per
    /// parameter of the node, ordered by the node's flat parameter index.
    pub fn evaluate(&mut self, id: NodeId, gradient: Option<&mut Vec<Value>>) -> Result<Value> {
        let want_gradient = gradient.is_some();

        if let Some((value, cached_gradient)) = self.cached(id, want_gradient)? {
            if let (Some(out), Some(cached_gradient)) = (gradient, cached_gradient) {
                *out = cached_gradient;
            }
            return Ok(value);
        }

        let mut local = Vec::new();
        let value = match self.calculate(id, request(want_gradient, &mut local)) {
            Ok(value) => value,
            Err(err) => {
                let name = self.get_name(id).unwrap_or("unknown");
                return Err(err.context(format!("Graph::evaluate {} {}", id, name)));
            }
        };

        if want_gradient {
            let nparam = self.nparam(id)?;
            if local.len() != nparam {
                return Err(MealError::invalid_state(
                    "Graph::evaluate",
                    format!(
                        "{} {} gradient size={} != nparam={}",
                        id,
                        self.get_name(id)?,
                        local.len(),
                        nparam
                    ),
                ));
            }
        }

        let node = self.node_mut(id)?;
        if node.policy == EvaluationPolicy::Cached {
            node.cache = Some(Cache {
                value: value.clone(),
                gradient: if want_gradient { Some(local.clone()) } else { None },
            });
        }
        self.clear_evaluation_changed(id)?;

        if let Some(out) = gradient {
            *out = local;
        }
        Ok(value)
    }

    /// Evaluate a scalar node.
    pub fn evaluate_scalar(&mut self, id: NodeId) -> Result<f64> {
        self.evaluate(id, None)?.as_scalar()
    }

    /// Value and first-order variance of a node.
    ///
    /// The variance of each output component is
    /// `sum_i variance_i * (d component / d param_i)^2`, which neglects
    /// covariances between parameters.
    pub fn estimate(&mut self, id: NodeId) -> Result<ValueEstimate> {
        let mut gradient = Vec::new();
        let value = self.evaluate(id, Some(&mut gradient))?;
        let mut variance = Value::zero(value.kind());
        for (i, g) in gradient.iter().enumerate() {
            let var = self.get_variance(id, i)?;
            if var != 0.0 {
                variance = variance.try_add(&g.component_square().scale(var))?;
            }
        }
        Ok(ValueEstimate { value, variance })
    }

    /// Value and first-order variance of a scalar node.
    pub fn estimate_scalar(&mut self, id: NodeId) -> Result<Estimate> {
        let estimate = self.estimate(id)?;
        Ok(Estimate::new(
            estimate.value.as_scalar()?,
            estimate.variance.as_scalar()?,
        ))
    }

    fn calculate(&mut self, id: NodeId, gradient: Option<&mut Vec<Value>>) -> Result<Value> {
        let node = self.node(id)?;
        let kind = node.kind.clone();
        let result = node.result;
        trace!("Graph::calculate {} {}", id, kind.class_name());

        match kind {
            NodeKind::Unary { op, arg } => self.calculate_unary(id, op, arg, gradient),
            NodeKind::Binary { op, arg1, arg2 } => self.calculate_binary(id, op, arg1, arg2, gradient),
            NodeKind::Sum { terms } => self.calculate_sum(id, result, &terms, gradient),
            NodeKind::Product { factors } => self.calculate_product(id, result, &factors, gradient),
            NodeKind::Vector { models, index } => {
                self.calculate_vector(id, result, &models, index, gradient)
            }
            NodeKind::Chain { model, constraints } => {
                self.calculate_chain(id, result, model, &constraints, gradient)
            }
            NodeKind::Congruence {
                transformation,
                input,
            } => self.calculate_congruence(id, transformation, input, gradient),
            NodeKind::MuellerOf { jones } => self.calculate_mueller(id, jones, gradient),
            NodeKind::Outer { spinor } => self.calculate_outer(id, spinor, gradient),
            leaf => {
                let params = self.leaf_params(id)?;
                calculate_leaf(&leaf, result, &params, gradient)
            }
        }
    }
}
