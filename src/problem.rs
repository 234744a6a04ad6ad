//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a weighted
//! nonlinear least-squares problem to be solved with the
//! Levenberg-Marquardt algorithm. The problem owns its parameters: the
//! solver reads and writes them in place, so models whose parameters live
//! in a [`Graph`](crate::function::Graph) need no copying.

use ndarray::{Array1, Array2};

use crate::error::Result;

/// A weighted nonlinear least-squares problem.
///
/// Residuals are whitened, `r_i = (d_i - m_i) / sigma_i`, so that
/// chi-squared is `sum_i r_i^2`. The Jacobian holds the whitened partial
/// derivatives of the model, `J_ij = (d m_i / d p_j) / sigma_i`.
pub trait Problem {
    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    fn get_param(&self, index: usize) -> Result<f64>;

    fn set_param(&mut self, index: usize, value: f64) -> Result<()>;

    /// Whether a parameter is free to vary.
    fn get_infit(&self, index: usize) -> Result<bool>;

    /// Store the variance of a parameter after the fit.
    fn set_variance(&mut self, index: usize, variance: f64) -> Result<()>;

    /// Whitened residuals at the current parameters.
    fn eval(&mut self) -> Result<Array1<f64>>;

    /// Whitened residuals and model Jacobian at the current parameters.
    fn eval_with_jacobian(&mut self) -> Result<(Array1<f64>, Array2<f64>)>;

    /// Chi-squared at the current parameters.
    fn eval_cost(&mut self) -> Result<f64> {
        let residuals = self.eval()?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }

    /// Indices of the free parameters.
    fn free_parameters(&self) -> Result<Vec<usize>> {
        let mut free = Vec::new();
        for i in 0..self.parameter_count() {
            if self.get_infit(i)? {
                free.push(i);
            }
        }
        Ok(free)
    }
}
