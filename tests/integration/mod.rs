//! End-to-end workflows across modules.

pub mod calibration_tests;
