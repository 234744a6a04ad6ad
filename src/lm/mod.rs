//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides a damped Gauss-Newton solver for weighted nonlinear
//! least-squares problems described by the [`Problem`](crate::problem::Problem)
//! trait. The normal equations are solved by LU decomposition (nalgebra), and the
//! inverse curvature matrix gives the covariance of the free parameters.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod normal_equations;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult, LmState};
pub use config::LmConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
