//! # psrmeal
//!
//! `psrmeal` models the polarimetric measurement equation of radio pulsar
//! observations as differentiable function graphs, and fits them to data
//! with the Levenberg-Marquardt algorithm.
//!
//! The library provides:
//! - An arena of function nodes with named, optionally fixed parameters and
//!   cached evaluation invalidated by change notification
//! - Composition rules (sums, products, chains, congruence transformations,
//!   Mueller matrices of Jones matrices) over scalars, complex numbers,
//!   Jones and Mueller matrices, with analytic gradients
//! - Physical models of receivers and pulsar emission geometry
//! - A Levenberg-Marquardt solver and fitting drivers
//! - A text interface to named model attributes and serializable
//!   calibration records
//!
//! ## Basic Usage
//!
//! ```
//! use psrmeal::function::Graph;
//! use psrmeal::models::SingleAxis;
//! use psrmeal::parameters::Estimate;
//!
//! let mut graph = Graph::new();
//! let backend = SingleAxis::new(&mut graph).unwrap();
//! backend.set_gain(&mut graph, Estimate::exact(2.0)).unwrap();
//!
//! let jones = graph.evaluate(backend.node(), None).unwrap();
//! let jones = jones.as_jones().unwrap();
//! assert!((jones[(0, 0)].re - 2.0).abs() < 1e-12);
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

pub mod value;

pub mod function;

pub mod models;

pub mod interface;

pub mod extension;

// Conditional modules
#[cfg(feature = "lm")]
pub mod problem;

#[cfg(feature = "lm")]
pub mod lm;

#[cfg(feature = "lm")]
pub mod fit;

// Re-exports for convenience
pub use error::{MealError, Result};
pub use function::{Graph, NodeId};
pub use value::{Value, ValueKind};

#[cfg(feature = "lm")]
pub use lm::LevenbergMarquardt;

#[cfg(feature = "lm")]
pub use problem::Problem;

/// Version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
