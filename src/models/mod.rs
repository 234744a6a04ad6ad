//! Physical models of the measurement equation.
//!
//! Each model is a lightweight handle onto nodes of a [`Graph`]; the graph
//! owns the parameters, the handle knows which node means what. Angles
//! handed to the boost and rotation primitives are half angles, and the
//! getters and setters here convert to and from the physical values.
//!
//! [`Graph`]: crate::function::Graph

mod britton2000;
mod complex_rvm;
mod faraday;
mod rvm;
pub mod single_axis;
mod variable_backend;

pub use britton2000::Britton2000;
pub use complex_rvm::ComplexRvm;
pub use faraday::Faraday;
pub use rvm::RotatingVectorModel;
pub use single_axis::SingleAxis;
pub use variable_backend::VariableBackend;
