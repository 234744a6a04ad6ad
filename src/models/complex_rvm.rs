//! Rotating vector model of the complex linear polarization `Q + iU`.
//!
//! Each pulse-phase bin (a "state") has its own real linear-polarization
//! gain `L_i`; the model of bin `i` is `L_i (Q_rvm + i U_rvm)`, where the
//! normalised RVM Stokes parameters constrain both parts of a complex
//! number through a chain rule.

use log::trace;
use num_complex::Complex64;

use super::rvm::RotatingVectorModel;
use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::parameters::Estimate;
use crate::value::ValueKind;

#[derive(Debug, Clone)]
struct State {
    /// Pulse phase in radians.
    phase: f64,
    gain: NodeId,
}

#[derive(Debug, Clone)]
pub struct ComplexRvm {
    node: NodeId,
    rvm: RotatingVectorModel,
    gains: NodeId,
    states: Vec<State>,
}

impl ComplexRvm {
    pub fn new(graph: &mut Graph) -> Result<Self> {
        let rvm = RotatingVectorModel::new(graph)?;

        let unit = graph.complex_cartesian("rvm_phase", Complex64::new(1.0, 0.0))?;
        let phase = graph.chain(unit)?;
        graph.set_constraint(phase, 0, rvm.q())?;
        graph.set_constraint(phase, 1, rvm.u())?;

        let gains = graph.vector(ValueKind::Complex, &[])?;
        let node = graph.product(ValueKind::Complex, &[gains, phase])?;
        graph.set_name(node, "ComplexRVM")?;

        Ok(Self {
            node,
            rvm,
            gains,
            states: Vec::new(),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn get_rvm(&self) -> &RotatingVectorModel {
        &self.rvm
    }

    pub fn nstate(&self) -> usize {
        self.states.len()
    }

    /// Add a bin at `phase` radians with a first guess of its linear
    /// polarization; the gain starts at `|linear|`.
    pub fn add_state(&mut self, graph: &mut Graph, phase: f64, linear: Complex64) -> Result<usize> {
        let index = self.states.len();
        let gain = graph.gain(&format!("L_{}", index), ValueKind::Complex, linear.norm())?;
        graph.push_model(self.gains, gain)?;
        self.states.push(State { phase, gain });
        trace!("ComplexRvm::add_state {} phase={}", index, phase);
        Ok(index)
    }

    /// Evaluate subsequent calls for bin `index`.
    pub fn set_state(&self, graph: &mut Graph, index: usize) -> Result<()> {
        let state = self.state(index, "set_state")?;
        graph.set_index(self.gains, index)?;
        self.rvm.set_abscissa(graph, state.phase)
    }

    pub fn get_phase(&self, index: usize) -> Result<f64> {
        Ok(self.state(index, "get_phase")?.phase)
    }

    pub fn set_phase(&mut self, index: usize, phase: f64) -> Result<()> {
        self.state_mut(index, "set_phase")?.phase = phase;
        Ok(())
    }

    pub fn get_linear(&self, graph: &Graph, index: usize) -> Result<Estimate> {
        let gain = self.state(index, "get_linear")?.gain;
        graph.get_estimate(gain, 0)
    }

    pub fn set_linear(&self, graph: &mut Graph, index: usize, linear: Estimate) -> Result<()> {
        let gain = self.state(index, "set_linear")?.gain;
        graph.set_estimate(gain, 0, linear)
    }

    /// Fit (or fix) every per-bin gain.
    pub fn set_gains_infit(&self, graph: &mut Graph, infit: bool) -> Result<()> {
        for state in &self.states {
            graph.set_infit(state.gain, 0, infit)?;
        }
        Ok(())
    }

    /// The gain leaves, in state order.
    pub fn gain_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.states.iter().map(|s| s.gain)
    }

    fn state(&self, index: usize, method: &str) -> Result<&State> {
        let nstate = self.states.len();
        self.states.get(index).ok_or_else(|| out_of_range(method, index, nstate))
    }

    fn state_mut(&mut self, index: usize, method: &str) -> Result<&mut State> {
        let nstate = self.states.len();
        self.states
            .get_mut(index)
            .ok_or_else(|| out_of_range(method, index, nstate))
    }
}

fn out_of_range(method: &str, index: usize, nstate: usize) -> MealError {
    MealError::invalid_range(
        &format!("ComplexRvm::{}", method),
        format!("state={} >= nstate={}", index, nstate),
    )
}
