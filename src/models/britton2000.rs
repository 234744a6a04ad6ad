//! Backend and feed model of Britton (2000).
//!
//! The feed is the product of four primitives parameterising the mean and
//! difference of the receptor orientations and ellipticities (eq. 19):
//! `B_U(delta_theta) R_V(sigma_theta) B_V(delta_chi) R_U(sigma_chi)`.
//! Like the backend, every angle is stored as half the value in the paper.

use super::single_axis::{double, halve, SingleAxis};
use crate::error::Result;
use crate::function::{Graph, NodeId};
use crate::parameters::Estimate;
use crate::value::{Axis, ValueKind};

const DELTA_THETA: usize = 3;
const SIGMA_THETA: usize = 4;
const DELTA_CHI: usize = 5;
const SIGMA_CHI: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct Britton2000 {
    node: NodeId,
    backend: SingleAxis,
    feed: NodeId,
}

impl Britton2000 {
    pub fn new(graph: &mut Graph) -> Result<Self> {
        let backend = SingleAxis::new(graph)?;

        let delta_theta = graph.boost("delta_theta", Axis::U, 0.0)?;
        let sigma_theta = graph.rotation("sigma_theta", Axis::V, 0.0)?;
        let delta_chi = graph.boost("delta_chi", Axis::V, 0.0)?;
        let sigma_chi = graph.rotation("sigma_chi", Axis::U, 0.0)?;
        let feed = graph.product(
            ValueKind::Jones,
            &[delta_theta, sigma_theta, delta_chi, sigma_chi],
        )?;
        graph.set_name(feed, "Feed")?;

        let node = graph.product(ValueKind::Jones, &[backend.node(), feed])?;
        graph.set_name(node, "Britton2000")?;
        Ok(Self {
            node,
            backend,
            feed,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn get_backend(&self) -> SingleAxis {
        self.backend
    }

    pub fn get_feed(&self) -> NodeId {
        self.feed
    }

    /// Difference between receptor orientations.
    pub fn get_delta_theta(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, DELTA_THETA)?))
    }

    pub fn set_delta_theta(&self, graph: &mut Graph, value: Estimate) -> Result<()> {
        graph.set_estimate(self.node, DELTA_THETA, halve(value))
    }

    /// Mean receptor orientation.
    pub fn get_sigma_theta(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, SIGMA_THETA)?))
    }

    pub fn set_sigma_theta(&self, graph: &mut Graph, value: Estimate) -> Result<()> {
        graph.set_estimate(self.node, SIGMA_THETA, halve(value))
    }

    /// Difference between receptor ellipticities.
    pub fn get_delta_chi(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, DELTA_CHI)?))
    }

    pub fn set_delta_chi(&self, graph: &mut Graph, value: Estimate) -> Result<()> {
        graph.set_estimate(self.node, DELTA_CHI, halve(value))
    }

    /// Mean receptor ellipticity.
    pub fn get_sigma_chi(&self, graph: &Graph) -> Result<Estimate> {
        Ok(double(graph.get_estimate(self.node, SIGMA_CHI)?))
    }

    pub fn set_sigma_chi(&self, graph: &mut Graph, value: Estimate) -> Result<()> {
        graph.set_estimate(self.node, SIGMA_CHI, halve(value))
    }

    /// Assume both receptors have the same ellipticity.
    pub fn equal_ellipticities(&self, graph: &mut Graph) -> Result<()> {
        self.fix_zero(graph, DELTA_CHI)
    }

    /// Assume the receptors are exactly orthogonal in orientation.
    pub fn equal_orientations(&self, graph: &mut Graph) -> Result<()> {
        self.fix_zero(graph, DELTA_THETA)
    }

    fn fix_zero(&self, graph: &mut Graph, index: usize) -> Result<()> {
        graph.set_estimate(self.node, index, Estimate::exact(0.0))?;
        graph.set_infit(self.node, index, false)
    }
}
