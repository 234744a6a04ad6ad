//! Parameter definition and implementation
//!
//! A [`Parameter`] is one scalar degree of freedom owned by exactly one
//! function node: a value, its variance, a flag saying whether it is free
//! in a fit, and a name used by the text interface and in reports.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::bounds::CyclicBounds;

/// A value with its variance (the square of its standard error).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub variance: f64,
}

impl Estimate {
    pub fn new(value: f64, variance: f64) -> Self {
        Self { value, variance }
    }

    /// An estimate without uncertainty.
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            variance: 0.0,
        }
    }

    /// Standard error, the square root of the variance.
    pub fn get_error(&self) -> f64 {
        self.variance.sqrt()
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variance > 0.0 {
            write!(f, "{}+/-{}", self.value, self.get_error())
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// One scalar parameter of a function node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    pub name: String,

    /// Current value of the parameter
    value: f64,

    /// Variance of the value (zero when unknown)
    variance: f64,

    /// Whether this parameter is varied during optimization
    infit: bool,

    /// Optional cyclic bounds applied to every value written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cyclic: Option<CyclicBounds>,
}

impl Parameter {
    /// Create a new free parameter with zero variance
    ///
    /// # Examples
    ///
    /// ```
    /// use psrmeal::parameters::parameter::Parameter;
    ///
    /// let param = Parameter::new("gain", 1.0);
    /// assert_eq!(param.name, "gain");
    /// assert_eq!(param.value(), 1.0);
    /// assert!(param.infit());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            variance: 0.0,
            infit: true,
            cyclic: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, wrapping it into the cyclic bounds if any.
    ///
    /// Returns `true` when the stored value changed.
    pub fn set_value(&mut self, value: f64) -> bool {
        let value = match &self.cyclic {
            Some(bounds) => bounds.wrap(value),
            None => value,
        };
        // bitwise comparison so that NaN -> NaN is not reported as a change
        if value.to_bits() == self.value.to_bits() {
            return false;
        }
        self.value = value;
        true
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn set_variance(&mut self, variance: f64) {
        self.variance = variance;
    }

    pub fn infit(&self) -> bool {
        self.infit
    }

    pub fn set_infit(&mut self, infit: bool) {
        self.infit = infit;
    }

    pub fn cyclic(&self) -> Option<CyclicBounds> {
        self.cyclic
    }

    /// Install or remove cyclic bounds; the current value is wrapped.
    pub fn set_cyclic(&mut self, cyclic: Option<CyclicBounds>) {
        self.cyclic = cyclic;
        if let Some(bounds) = &self.cyclic {
            self.value = bounds.wrap(self.value);
        }
    }

    pub fn estimate(&self) -> Estimate {
        Estimate::new(self.value, self.variance)
    }

    /// Copy value, variance and fit flag, leaving name and bounds alone.
    pub fn copy_state(&mut self, other: &Parameter) -> bool {
        let changed = self.set_value(other.value);
        self.variance = other.variance;
        self.infit = other.infit;
        changed
    }
}
