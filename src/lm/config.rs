//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the damping schedule and numerical thresholds of the
//! solver; when to stop is decided by [`ConvergenceCriteria`].

use super::convergence::ConvergenceCriteria;

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda after a rejected step. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda after an accepted step. Default: 0.1
    pub lambda_down_factor: f64,

    /// Pivots smaller than this fraction of the largest curvature element
    /// make the normal equations singular. Default: 1e-8
    pub singular_threshold: f64,

    /// When to stop iterating.
    pub criteria: ConvergenceCriteria,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            singular_threshold: 1e-8,
            criteria: ConvergenceCriteria::default(),
        }
    }
}
