//! Single-axis backend: gain, differential gain and differential phase.

use crate::error::Result;
use crate::function::{Graph, NodeId};
use crate::parameters::{CyclicBounds, Estimate};
use crate::value::{Axis, ValueKind};

/// Parameter index of the absolute gain.
pub const GAIN: usize = 0;
/// Parameter index of the differential gain.
pub const DIFF_GAIN: usize = 1;
/// Parameter index of the differential phase.
pub const DIFF_PHASE: usize = 2;

/// `J = G B_Q(gamma/2) R_Q(phi/2)`
///
/// The boost and rotation primitives are parameterised by half angles, so
/// the differential gain `gamma` and differential phase `phi` are stored
/// halved.
#[derive(Debug, Clone, Copy)]
pub struct SingleAxis {
    node: NodeId,
}

impl SingleAxis {
    /// Unit gain, no differential gain or phase.
    pub fn new(graph: &mut Graph) -> Result<Self> {
        let gain = graph.gain("gain", ValueKind::Jones, 1.0)?;
        let boost = graph.boost("diff_gain", Axis::Q, 0.0)?;
        let rotation = graph.rotation("diff_phase", Axis::Q, 0.0)?;
        let node = graph.product(ValueKind::Jones, &[gain, boost, rotation])?;
        graph.set_name(node, "SingleAxis")?;
        Ok(Self { node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn get_gain(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.node, GAIN)
    }

    pub fn set_gain(&self, graph: &mut Graph, gain: Estimate) -> Result<()> {
        graph.set_estimate(self.node, GAIN, gain)
    }

    /// Differential gain in hyperbolic radians.
    pub fn get_diff_gain(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, DIFF_GAIN)?))
    }

    pub fn set_diff_gain(&self, graph: &mut Graph, gamma: Estimate) -> Result<()> {
        graph.set_estimate(self.node, DIFF_GAIN, halve(gamma))
    }

    /// Differential phase in radians.
    pub fn get_diff_phase(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, DIFF_PHASE)?))
    }

    pub fn set_diff_phase(&self, graph: &mut Graph, phi: Estimate) -> Result<()> {
        graph.set_estimate(self.node, DIFF_PHASE, halve(phi))
    }

    /// Wrap the differential phase into one turn.
    pub fn set_cyclic(&self, graph: &mut Graph, cyclic: bool) -> Result<()> {
        // the stored half angle spans half a turn
        let bounds = cyclic.then(CyclicBounds::half_turn);
        graph.set_cyclic(self.node, DIFF_PHASE, bounds)
    }
}

/// Convert a full angle to the stored half angle.
pub(crate) fn halve(estimate: Estimate) -> Estimate {
    Estimate::new(0.5 * estimate.value, 0.25 * estimate.variance)
}

/// Convert a stored half angle to the full angle.
pub(crate) fn double(estimate: Estimate) -> Estimate {
    Estimate::new(2.0 * estimate.value, 4.0 * estimate.variance)
}
