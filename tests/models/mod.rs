//! Tests of the physical models.

pub mod backend_tests;
pub mod rvm_tests;
