//! Rotating vector model of the pulsar position angle.
//!
//! With magnetic inclination `alpha`, line-of-sight inclination `zeta`,
//! fiducial pulse phase `phi0` and reference position angle `psi0`, the
//! unnormalised north and east components of the projected field are
//!
//! ```text
//! N = sin(zeta) cos(alpha) - cos(zeta) sin(alpha) cos(phi - phi0)
//! E = sin(alpha) sin(phi - phi0)
//! ```
//!
//! rotated by `psi0`. The position angle is `psi = psi0 + atan(E/N)` and the
//! normalised Stokes parameters are `Q = cos(2 psi)`, `U = sin(2 psi)`,
//! computed without trigonometric inverses as
//! `Q = (N'^2 - E'^2)/(N'^2 + E'^2)` and `U = 2 N'E'/(N'^2 + E'^2)`.

use crate::error::Result;
use crate::function::{Graph, NodeId};
use crate::parameters::{CyclicBounds, Estimate};

/// Handles of the RVM expression graph.
///
/// The four angle leaves are shared by the `q` and `u` expressions.
#[derive(Debug, Clone, Copy)]
pub struct RotatingVectorModel {
    psi0: NodeId,
    zeta: NodeId,
    alpha: NodeId,
    phi0: NodeId,
    phase: NodeId,
    north: NodeId,
    east: NodeId,
    q: NodeId,
    u: NodeId,
}

impl RotatingVectorModel {
    pub fn new(graph: &mut Graph) -> Result<Self> {
        let psi0 = graph.scalar_value("psi0", 0.0)?;
        let zeta = graph.scalar_value("zeta", 0.0)?;
        let alpha = graph.scalar_value("alpha", 0.0)?;
        let phi0 = graph.scalar_value("phi0", 0.0)?;
        let phase = graph.argument("phase", 0.0)?;

        let delta = graph.subtract(phase, phi0)?;
        let sin_zeta = graph.sin(zeta)?;
        let cos_zeta = graph.cos(zeta)?;
        let sin_alpha = graph.sin(alpha)?;
        let cos_alpha = graph.cos(alpha)?;
        let sin_delta = graph.sin(delta)?;
        let cos_delta = graph.cos(delta)?;

        let first = graph.multiply(sin_zeta, cos_alpha)?;
        let inclined = graph.multiply(cos_zeta, sin_alpha)?;
        let second = graph.multiply(inclined, cos_delta)?;
        let n = graph.subtract(first, second)?;
        let e = graph.multiply(sin_alpha, sin_delta)?;

        let cos_psi = graph.cos(psi0)?;
        let sin_psi = graph.sin(psi0)?;
        let n_cos = graph.multiply(n, cos_psi)?;
        let e_sin = graph.multiply(e, sin_psi)?;
        let north = graph.subtract(n_cos, e_sin)?;
        let n_sin = graph.multiply(n, sin_psi)?;
        let e_cos = graph.multiply(e, cos_psi)?;
        let east = graph.add(n_sin, e_cos)?;

        let nn = graph.square(north)?;
        let ee = graph.square(east)?;
        let norm = graph.add(nn, ee)?;
        let difference = graph.subtract(nn, ee)?;
        let q = graph.divide(difference, norm)?;
        let ne = graph.multiply(north, east)?;
        let twice = graph.scale(2.0, ne)?;
        let u = graph.divide(twice, norm)?;

        graph.set_name(north, "RVM::north")?;
        graph.set_name(east, "RVM::east")?;
        graph.set_name(q, "RVM::Q")?;
        graph.set_name(u, "RVM::U")?;

        Ok(Self {
            psi0,
            zeta,
            alpha,
            phi0,
            phase,
            north,
            east,
            q,
            u,
        })
    }

    /// Normalised Stokes Q as a function of the angles.
    pub fn q(&self) -> NodeId {
        self.q
    }

    /// Normalised Stokes U as a function of the angles.
    pub fn u(&self) -> NodeId {
        self.u
    }

    pub fn north(&self) -> NodeId {
        self.north
    }

    pub fn east(&self) -> NodeId {
        self.east
    }

    pub fn psi0(&self) -> NodeId {
        self.psi0
    }

    pub fn zeta(&self) -> NodeId {
        self.zeta
    }

    pub fn alpha(&self) -> NodeId {
        self.alpha
    }

    pub fn phi0(&self) -> NodeId {
        self.phi0
    }

    /// Pulse phase in radians at which the model is evaluated.
    pub fn set_abscissa(&self, graph: &mut Graph, phase: f64) -> Result<()> {
        graph.set_abscissa(self.phase, phase)
    }

    pub fn get_abscissa(&self, graph: &Graph) -> Result<f64> {
        graph.get_abscissa(self.phase)
    }

    pub fn get_reference_position_angle(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.psi0, 0)
    }

    pub fn set_reference_position_angle(&self, graph: &mut Graph, psi0: Estimate) -> Result<()> {
        graph.set_estimate(self.psi0, 0, psi0)
    }

    pub fn get_line_of_sight(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.zeta, 0)
    }

    pub fn set_line_of_sight(&self, graph: &mut Graph, zeta: Estimate) -> Result<()> {
        graph.set_estimate(self.zeta, 0, zeta)
    }

    pub fn get_magnetic_axis(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.alpha, 0)
    }

    pub fn set_magnetic_axis(&self, graph: &mut Graph, alpha: Estimate) -> Result<()> {
        graph.set_estimate(self.alpha, 0, alpha)
    }

    pub fn get_magnetic_meridian(&self, graph: &Graph) -> Result<Estimate> {
        graph.get_estimate(self.phi0, 0)
    }

    pub fn set_magnetic_meridian(&self, graph: &mut Graph, phi0: Estimate) -> Result<()> {
        graph.set_estimate(self.phi0, 0, phi0)
    }

    /// Keep `psi0` within half a turn.
    pub fn set_cyclic(&self, graph: &mut Graph, cyclic: bool) -> Result<()> {
        graph.set_cyclic(self.psi0, 0, cyclic.then(CyclicBounds::half_turn))
    }

    /// Position angle in radians at the current abscissa.
    pub fn position_angle(&self, graph: &mut Graph) -> Result<f64> {
        let q = graph.evaluate_scalar(self.q)?;
        let u = graph.evaluate_scalar(self.u)?;
        Ok(0.5 * u.atan2(q))
    }
}
