//! Least-squares fitting of measurement-equation models.

mod complex_rvm_fit;
mod model_fit;

pub use complex_rvm_fit::{ComplexRvmFit, LinearPolarization, PhaseWindow};
pub use model_fit::{FitReport, GraphProblem, ModelFit, Observation};
