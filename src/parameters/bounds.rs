//! Cyclic parameter bounds
//!
//! Angular parameters such as a differential phase or a position angle are
//! only defined modulo their period. A parameter carrying [`CyclicBounds`]
//! has every value written to it wrapped into the half-open interval
//! `[lower, upper)`.

use serde::{Deserialize, Serialize};

use crate::error::{MealError, Result};

/// Wraps values into the half-open interval `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclicBounds {
    /// Inclusive lower limit
    pub lower: f64,

    /// Exclusive upper limit
    pub upper: f64,
}

impl CyclicBounds {
    /// Create new cyclic bounds
    ///
    /// # Arguments
    ///
    /// * `lower` - Inclusive lower limit
    /// * `upper` - Exclusive upper limit
    ///
    /// # Returns
    ///
    /// The bounds, or `InvalidParam` unless `lower < upper` and both are finite
    ///
    /// # Examples
    ///
    /// ```
    /// use psrmeal::parameters::bounds::CyclicBounds;
    ///
    /// let bounds = CyclicBounds::new(-1.0, 1.0).unwrap();
    /// assert_eq!(bounds.period(), 2.0);
    /// ```
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(MealError::invalid_param(
                "CyclicBounds::new",
                format!("invalid interval [{}, {})", lower, upper),
            ));
        }
        Ok(Self { lower, upper })
    }

    /// Bounds spanning one full turn centred on zero, `[-pi, pi)`.
    pub fn full_turn() -> Self {
        Self {
            lower: -std::f64::consts::PI,
            upper: std::f64::consts::PI,
        }
    }

    /// Bounds spanning half a turn centred on zero, `[-pi/2, pi/2)`.
    pub fn half_turn() -> Self {
        Self {
            lower: -std::f64::consts::FRAC_PI_2,
            upper: std::f64::consts::FRAC_PI_2,
        }
    }

    pub fn period(&self) -> f64 {
        self.upper - self.lower
    }

    /// Wrap a value into `[lower, upper)`; non-finite values pass through.
    pub fn wrap(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let period = self.period();
        let wrapped = self.lower + (value - self.lower).rem_euclid(period);
        // rem_euclid can round up to exactly one period
        if wrapped >= self.upper {
            self.lower
        } else {
            wrapped
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value < self.upper
    }
}
