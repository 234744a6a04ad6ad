//! Builders for scalar expression graphs.
//!
//! Each builder allocates one rule node over existing scalar nodes and
//! returns its handle, so expressions compose the way they read:
//!
//! ```
//! # use psrmeal::function::Graph;
//! let mut graph = Graph::new();
//! let x = graph.scalar_value("x", 0.5).unwrap();
//! let s = graph.sin(x).unwrap();
//! let y = graph.square(s).unwrap();
//! assert!((graph.evaluate_scalar(y).unwrap() - 0.5f64.sin().powi(2)).abs() < 1e-15);
//! ```

use super::{BinaryOp, Graph, NodeId, UnaryOp};
use crate::error::Result;
use crate::value::ValueKind;

impl Graph {
    pub fn negate(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Negate, x)
    }

    pub fn sin(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Sin, x)
    }

    pub fn cos(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Cos, x)
    }

    pub fn tan(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Tan, x)
    }

    pub fn exp(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Exp, x)
    }

    /// Natural logarithm.
    pub fn log(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Log, x)
    }

    pub fn sqrt(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Sqrt, x)
    }

    /// `|x|`; the derivative at zero is taken to be zero.
    pub fn abs(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Abs, x)
    }

    pub fn square(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Square, x)
    }

    /// `1/x`
    pub fn inverse(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Inverse, x)
    }

    pub fn logistic(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Logistic, x)
    }

    pub fn erf(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Erf, x)
    }

    /// `atan(pi x / 2) / (pi x / 2)`, equal to one at `x = 0`.
    pub fn atanc(&mut self, x: NodeId) -> Result<NodeId> {
        self.unary(UnaryOp::Atanc, x)
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.sum(ValueKind::Scalar, &[a, b])
    }

    pub fn subtract(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Difference, a, b)
    }

    pub fn multiply(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.product(ValueKind::Scalar, &[a, b])
    }

    pub fn divide(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Quotient, a, b)
    }

    /// `base ^ exponent`
    pub fn pow(&mut self, base: NodeId, exponent: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Power, base, exponent)
    }

    /// `atan2(y, x)`
    pub fn atan2(&mut self, y: NodeId, x: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Atan2, y, x)
    }

    /// `factor * x` with a constant factor.
    pub fn scale(&mut self, factor: f64, x: NodeId) -> Result<NodeId> {
        let c = self.scalar_constant(factor)?;
        self.multiply(c, x)
    }
}
