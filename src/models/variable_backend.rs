//! A single-axis backend whose parameters may vary with an external axis.
//!
//! Each of the three backend parameters can be replaced by a scalar
//! function (of time, frequency, ...). While a function is installed the
//! parameter is computed, not fitted, and cannot be written directly.

use log::debug;

use super::single_axis::{double, SingleAxis, DIFF_GAIN, DIFF_PHASE, GAIN};
use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::parameters::Estimate;

#[derive(Debug, Clone, Copy)]
pub struct VariableBackend {
    node: NodeId,
    backend: SingleAxis,
}

impl VariableBackend {
    pub fn new(graph: &mut Graph) -> Result<Self> {
        let backend = SingleAxis::new(graph)?;
        let node = graph.chain(backend.node())?;
        graph.set_name(node, "VariableBackend")?;
        Ok(Self { node, backend })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn get_backend(&self) -> SingleAxis {
        self.backend
    }

    /// Wrap the differential phase into one turn.
    pub fn set_cyclic(&self, graph: &mut Graph, cyclic: bool) -> Result<()> {
        self.backend.set_cyclic(graph, cyclic)
    }

    /// The gain, or the estimate of its variation function.
    pub fn get_gain(&self, graph: &mut Graph) -> Result<Estimate> {
        match self.get_gain_variation(graph)? {
            Some(function) => graph.estimate_scalar(function),
            None => self.backend.get_gain(graph),
        }
    }

    /// Differential gain in hyperbolic radians.
    ///
    /// An installed variation computes the stored half angle, so its
    /// estimate is doubled; the result is then in the same units as the
    /// unconstrained getter and as [`set_diff_gain`](Self::set_diff_gain).
    pub fn get_diff_gain(&self, graph: &mut Graph) -> Result<Estimate> {
        match self.get_diff_gain_variation(graph)? {
            Some(function) => Ok(double(graph.estimate_scalar(function)?)),
            None => self.backend.get_diff_gain(graph),
        }
    }

    /// Differential phase in radians.
    ///
    /// As for [`get_diff_gain`](Self::get_diff_gain), a variation's
    /// estimate is doubled from the stored half angle.
    pub fn get_diff_phase(&self, graph: &mut Graph) -> Result<Estimate> {
        match self.get_diff_phase_variation(graph)? {
            Some(function) => Ok(double(graph.estimate_scalar(function)?)),
            None => self.backend.get_diff_phase(graph),
        }
    }

    pub fn set_gain(&self, graph: &mut Graph, gain: Estimate) -> Result<()> {
        self.check_free(graph, GAIN, "set_gain", "gain")?;
        self.backend.set_gain(graph, gain)
    }

    pub fn set_diff_gain(&self, graph: &mut Graph, gamma: Estimate) -> Result<()> {
        self.check_free(graph, DIFF_GAIN, "set_diff_gain", "diff_gain")?;
        self.backend.set_diff_gain(graph, gamma)
    }

    pub fn set_diff_phase(&self, graph: &mut Graph, phi: Estimate) -> Result<()> {
        self.check_free(graph, DIFF_PHASE, "set_diff_phase", "diff_phase")?;
        self.backend.set_diff_phase(graph, phi)
    }

    /// Compute the gain with a scalar function.
    ///
    /// The last free value of the gain is kept in the backend but no longer
    /// used or fitted.
    pub fn set_gain_variation(&self, graph: &mut Graph, function: NodeId) -> Result<()> {
        self.set_variation(graph, GAIN, function)
    }

    /// Compute the stored half differential gain with a scalar function.
    pub fn set_diff_gain_variation(&self, graph: &mut Graph, function: NodeId) -> Result<()> {
        self.set_variation(graph, DIFF_GAIN, function)
    }

    /// Compute the stored half differential phase with a scalar function.
    pub fn set_diff_phase_variation(&self, graph: &mut Graph, function: NodeId) -> Result<()> {
        self.set_variation(graph, DIFF_PHASE, function)
    }

    pub fn get_gain_variation(&self, graph: &Graph) -> Result<Option<NodeId>> {
        graph.get_constraint(self.node, GAIN)
    }

    pub fn get_diff_gain_variation(&self, graph: &Graph) -> Result<Option<NodeId>> {
        graph.get_constraint(self.node, DIFF_GAIN)
    }

    pub fn get_diff_phase_variation(&self, graph: &Graph) -> Result<Option<NodeId>> {
        graph.get_constraint(self.node, DIFF_PHASE)
    }

    /// Remove a variation; the parameter becomes free again.
    pub fn remove_variation(&self, graph: &mut Graph, parameter: usize) -> Result<()> {
        graph.remove_constraint(self.node, parameter)
    }

    fn set_variation(&self, graph: &mut Graph, parameter: usize, function: NodeId) -> Result<()> {
        debug!(
            "VariableBackend::set_variation param={} function={} {}",
            parameter,
            function,
            graph.get_name(function)?
        );
        graph.set_constraint(self.node, parameter, function)
    }

    fn check_free(&self, graph: &Graph, parameter: usize, method: &str, what: &str) -> Result<()> {
        if graph.get_constraint(self.node, parameter)?.is_some() {
            return Err(MealError::invalid_state(
                &format!("VariableBackend::{}", method),
                format!("cannot set {} when it is constrained by a function", what),
            ));
        }
        Ok(())
    }
}
