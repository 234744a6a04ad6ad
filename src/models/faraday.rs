//! Faraday rotation by the interstellar medium.

use crate::error::Result;
use crate::function::{Graph, NodeId};
use crate::parameters::Estimate;

/// Rotation of the plane of linear polarization by `RM (lambda^2 - lambda_ref^2)`.
#[derive(Debug, Clone, Copy)]
pub struct Faraday {
    node: NodeId,
}

impl Faraday {
    /// Zero rotation measure at `frequency` MHz with no reference frequency.
    pub fn new(graph: &mut Graph, frequency: f64) -> Result<Self> {
        let node = graph.faraday("Faraday", 0.0, frequency)?;
        Ok(Self { node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Rotation measure in rad/m^2.
    pub fn get_rotation_measure(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.node, 0)
    }

    pub fn set_rotation_measure(&self, graph: &mut Graph, rm: Estimate) -> Result<()> {
        graph.set_estimate(self.node, 0, rm)
    }

    /// Observing frequency in MHz.
    pub fn set_frequency(&self, graph: &mut Graph, frequency: f64) -> Result<()> {
        graph.set_frequency(self.node, frequency)
    }

    /// Frequency in MHz at which the rotation is zero; `None` for infinite frequency.
    pub fn set_reference_frequency(&self, graph: &mut Graph, frequency: Option<f64>) -> Result<()> {
        graph.set_reference_frequency(self.node, frequency)
    }

    /// Rotation of the position angle in radians.
    pub fn get_rotation(&self, graph: &Graph) -> Result<f64> {
        let (frequency, reference) = graph.get_frequencies(self.node)?;
        let rm = graph.get_param(self.node, 0)?;
        Ok(rm * crate::function::leaves::faraday_scale(frequency, reference))
    }
}
