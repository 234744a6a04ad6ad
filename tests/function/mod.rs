//! Tests of the function graph across node kinds.

pub mod composition_tests;
pub mod gradient_tests;
