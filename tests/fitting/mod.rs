//! Tests of the fitting drivers.

pub mod complex_rvm_fit_tests;
pub mod model_fit_tests;
