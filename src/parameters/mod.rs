//! # Parameter System
//!
//! Every leaf function owns its scalar parameters through a
//! [`ParameterStore`]. Composite functions own none of their own; they
//! address the parameters of their children through an index map (see
//! [`crate::function::composite`]).
//!
//! ## Core Components
//!
//! - [`Parameter`]: value, variance, fit flag and name
//! - [`Estimate`]: a value paired with its variance
//! - [`ParameterStore`]: the parameters of one leaf, with range-checked access
//! - [`CyclicBounds`]: wrapping of angular parameters into one period

pub mod bounds;
pub mod parameter;
pub mod store;

pub use bounds::CyclicBounds;
pub use parameter::{Estimate, Parameter};
pub use store::ParameterStore;
