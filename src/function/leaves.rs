//! Leaf functions: nodes that own their parameters (or have none).
//!
//! Leaves are cheap to compute and default to
//! [`EvaluationPolicy::NotCached`].

use num_complex::Complex64;

use super::{EvaluationPolicy, Graph, NodeId, NodeKind, ParameterPolicy};
use crate::error::{MealError, Result};
use crate::parameters::{Parameter, ParameterStore};
use crate::value::{self, Axis, Jones, Spinor, Value, ValueKind};

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Wavelength squared in m^2 of a frequency in MHz.
pub fn lambda_squared(frequency_mhz: f64) -> f64 {
    let lambda = SPEED_OF_LIGHT / (frequency_mhz * 1e6);
    lambda * lambda
}

impl Graph {
    fn add_leaf(&mut self, name: &str, kind: NodeKind, store: ParameterStore, result: ValueKind) -> Result<NodeId> {
        self.add_node(name, kind, ParameterPolicy::Store(store), result, EvaluationPolicy::NotCached)
    }

    /// A free scalar parameter.
    pub fn scalar_value(&mut self, name: &str, value: f64) -> Result<NodeId> {
        self.add_leaf(name, NodeKind::ScalarValue, ParameterStore::one(name, value), ValueKind::Scalar)
    }

    /// A fixed scalar.
    pub fn scalar_constant(&mut self, value: f64) -> Result<NodeId> {
        self.constant(Value::Scalar(value))
    }

    /// A fixed value of any kind.
    pub fn constant(&mut self, value: Value) -> Result<NodeId> {
        let result = value.kind();
        self.add_node(
            "constant",
            NodeKind::Constant(value),
            ParameterPolicy::Constant,
            result,
            EvaluationPolicy::NotCached,
        )
    }

    /// An independent variable, set with [`Graph::set_abscissa`].
    pub fn argument(&mut self, name: &str, value: f64) -> Result<NodeId> {
        self.add_node(
            name,
            NodeKind::Argument { value },
            ParameterPolicy::Constant,
            ValueKind::Scalar,
            EvaluationPolicy::NotCached,
        )
    }

    /// A polynomial in `x - offset` with `ncoef` free coefficients, all zero.
    pub fn polynomial(&mut self, name: &str, ncoef: usize, offset: f64) -> Result<NodeId> {
        let mut store = ParameterStore::none();
        for k in 0..ncoef {
            store.push(Parameter::new(&format!("{}_{}", name, k), 0.0));
        }
        self.add_leaf(
            name,
            NodeKind::Polynomial {
                abscissa: 0.0,
                offset,
            },
            store,
            ValueKind::Scalar,
        )
    }

    /// A real gain times the identity of `kind` (scalar, complex or Jones).
    pub fn gain(&mut self, name: &str, kind: ValueKind, gain: f64) -> Result<NodeId> {
        if !matches!(kind, ValueKind::Scalar | ValueKind::Complex | ValueKind::Jones) {
            return Err(MealError::invalid_param(
                "Graph::gain",
                format!("no gain of kind {}", kind),
            ));
        }
        self.add_leaf(name, NodeKind::Gain, ParameterStore::one(name, gain), kind)
    }

    /// A boost along `axis` by `beta`.
    pub fn boost(&mut self, name: &str, axis: Axis, beta: f64) -> Result<NodeId> {
        self.add_leaf(name, NodeKind::Boost { axis }, ParameterStore::one(name, beta), ValueKind::Jones)
    }

    /// A rotation about `axis` by `phi`.
    pub fn rotation(&mut self, name: &str, axis: Axis, phi: f64) -> Result<NodeId> {
        self.add_leaf(name, NodeKind::Rotation { axis }, ParameterStore::one(name, phi), ValueKind::Jones)
    }

    /// A complex number with free real and imaginary parts.
    pub fn complex_cartesian(&mut self, name: &str, z: Complex64) -> Result<NodeId> {
        let mut store = ParameterStore::new(&["real", "imag"]);
        store.set_param(0, z.re)?;
        store.set_param(1, z.im)?;
        self.add_leaf(name, NodeKind::ComplexCartesian, store, ValueKind::Complex)
    }

    /// A coherency matrix with free Stokes parameters.
    pub fn coherency(&mut self, name: &str, stokes: [f64; 4]) -> Result<NodeId> {
        let mut store = ParameterStore::new(&["I", "Q", "U", "V"]);
        for (k, s) in stokes.iter().enumerate() {
            store.set_param(k, *s)?;
        }
        self.add_leaf(name, NodeKind::Coherency, store, ValueKind::Jones)
    }

    /// A spinor with free real and imaginary parts of both components.
    pub fn spinor(&mut self, name: &str, s: Spinor) -> Result<NodeId> {
        let mut store = ParameterStore::new(&["re_0", "im_0", "re_1", "im_1"]);
        store.set_param(0, s[0].re)?;
        store.set_param(1, s[0].im)?;
        store.set_param(2, s[1].re)?;
        store.set_param(3, s[1].im)?;
        self.add_leaf(name, NodeKind::Spinor, store, ValueKind::Spinor)
    }

    /// Faraday rotation with a free rotation measure in rad/m^2.
    ///
    /// The position angle advances by `RM (lambda^2 - lambda_ref^2)`; without a
    /// reference frequency `lambda_ref` is zero (infinite frequency).
    pub fn faraday(&mut self, name: &str, rotation_measure: f64, frequency_mhz: f64) -> Result<NodeId> {
        self.add_leaf(
            name,
            NodeKind::Faraday {
                frequency: frequency_mhz,
                reference_frequency: None,
            },
            ParameterStore::one("rotation_measure", rotation_measure),
            ValueKind::Jones,
        )
    }

    /// Set the independent variable of an argument or polynomial.
    pub fn set_abscissa(&mut self, id: NodeId, x: f64) -> Result<()> {
        let node = self.node_mut(id)?;
        let changed = match &mut node.kind {
            NodeKind::Argument { value } => std::mem::replace(value, x) != x,
            NodeKind::Polynomial { abscissa, .. } => std::mem::replace(abscissa, x) != x,
            other => {
                return Err(MealError::invalid_state(
                    "Graph::set_abscissa",
                    format!("{} {} has no abscissa", id, other.class_name()),
                ))
            }
        };
        if changed {
            self.set_evaluation_changed(id)?;
        }
        Ok(())
    }

    pub fn get_abscissa(&self, id: NodeId) -> Result<f64> {
        match &self.node(id)?.kind {
            NodeKind::Argument { value } => Ok(*value),
            NodeKind::Polynomial { abscissa, .. } => Ok(*abscissa),
            other => Err(MealError::invalid_state(
                "Graph::get_abscissa",
                format!("{} {} has no abscissa", id, other.class_name()),
            )),
        }
    }

    /// Replace the value of a constant.
    pub fn set_constant(&mut self, id: NodeId, value: Value) -> Result<()> {
        let node = self.node_mut(id)?;
        match &mut node.kind {
            NodeKind::Constant(current) => {
                if current.kind() != value.kind() {
                    return Err(MealError::invalid_param(
                        "Graph::set_constant",
                        format!("kind {} != {}", value.kind(), current.kind()),
                    ));
                }
                *current = value;
            }
            other => {
                return Err(MealError::invalid_state(
                    "Graph::set_constant",
                    format!("{} is a {}", id, other.class_name()),
                ))
            }
        }
        self.set_evaluation_changed(id)
    }

    /// Change the number of polynomial coefficients.
    ///
    /// New coefficients start at zero; every composite that maps the
    /// polynomial is remapped.
    pub fn set_ncoef(&mut self, id: NodeId, ncoef: usize) -> Result<()> {
        if !matches!(self.node(id)?.kind, NodeKind::Polynomial { .. }) {
            return Err(MealError::invalid_state(
                "Graph::set_ncoef",
                format!("{} is not a polynomial", id),
            ));
        }
        let name = self.get_name(id)?.to_string();
        let store = self.store_mut(id)?;
        if store.len() == ncoef {
            return Ok(());
        }
        while store.len() > ncoef {
            store.pop();
        }
        while store.len() < ncoef {
            let k = store.len();
            store.push(Parameter::new(&format!("{}_{}", name, k), 0.0));
        }
        self.notify(id, super::Attribute::ParameterCount)
    }

    /// Set the observing frequency of a Faraday rotation, in MHz.
    pub fn set_frequency(&mut self, id: NodeId, frequency_mhz: f64) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Faraday { frequency, .. } => *frequency = frequency_mhz,
            other => {
                return Err(MealError::invalid_state(
                    "Graph::set_frequency",
                    format!("{} is a {}", id, other.class_name()),
                ))
            }
        }
        self.set_evaluation_changed(id)
    }

    /// Set (or clear) the reference frequency of a Faraday rotation, in MHz.
    pub fn set_reference_frequency(&mut self, id: NodeId, reference_mhz: Option<f64>) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Faraday {
                reference_frequency, ..
            } => *reference_frequency = reference_mhz,
            other => {
                return Err(MealError::invalid_state(
                    "Graph::set_reference_frequency",
                    format!("{} is a {}", id, other.class_name()),
                ))
            }
        }
        self.set_evaluation_changed(id)
    }

    /// Observing and reference frequency of a Faraday rotation, in MHz.
    pub fn get_frequencies(&self, id: NodeId) -> Result<(f64, Option<f64>)> {
        match &self.node(id)?.kind {
            NodeKind::Faraday {
                frequency,
                reference_frequency,
            } => Ok((*frequency, *reference_frequency)),
            other => Err(MealError::invalid_state(
                "Graph::get_frequencies",
                format!("{} is a {}", id, other.class_name()),
            )),
        }
    }

    pub(crate) fn leaf_params(&self, id: NodeId) -> Result<Vec<f64>> {
        match &self.node(id)?.parameters {
            ParameterPolicy::Store(store) => Ok(store.iter().map(|p| p.value()).collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// Scale factor of the Faraday rotation angle per unit rotation measure.
pub fn faraday_scale(frequency: f64, reference_frequency: Option<f64>) -> f64 {
    let reference = reference_frequency.map(lambda_squared).unwrap_or(0.0);
    lambda_squared(frequency) - reference
}

fn boost_gradient(axis: Axis, beta: f64) -> Jones {
    value::hermitian(beta.sinh(), axis, beta.cosh())
}

fn rotation_gradient(axis: Axis, phi: f64) -> Jones {
    value::unitary(-phi.sin(), axis, phi.cos())
}

/// Value and gradient of a leaf given its parameter values.
pub(crate) fn calculate_leaf(
    kind: &NodeKind,
    result: ValueKind,
    params: &[f64],
    gradient: Option<&mut Vec<Value>>,
) -> Result<Value> {
    let mut grad = Vec::with_capacity(params.len());

    let value = match kind {
        NodeKind::ScalarValue => {
            grad.push(Value::Scalar(1.0));
            Value::Scalar(params[0])
        }
        NodeKind::Constant(value) => value.clone(),
        NodeKind::Argument { value } => Value::Scalar(*value),
        NodeKind::Polynomial { abscissa, offset } => {
            let dx = abscissa - offset;
            let mut power = 1.0;
            let mut sum = 0.0;
            for c in params {
                grad.push(Value::Scalar(power));
                sum += c * power;
                power *= dx;
            }
            Value::Scalar(sum)
        }
        NodeKind::Gain => {
            let identity = Value::identity(result)?;
            grad.push(identity.clone());
            identity.scale(params[0])
        }
        NodeKind::Boost { axis } => {
            let beta = params[0];
            grad.push(Value::Jones(boost_gradient(*axis, beta)));
            Value::Jones(value::hermitian(beta.cosh(), *axis, beta.sinh()))
        }
        NodeKind::Rotation { axis } => {
            let phi = params[0];
            grad.push(Value::Jones(rotation_gradient(*axis, phi)));
            Value::Jones(value::unitary(phi.cos(), *axis, phi.sin()))
        }
        NodeKind::ComplexCartesian => {
            grad.push(Value::Complex(Complex64::new(1.0, 0.0)));
            grad.push(Value::Complex(Complex64::new(0.0, 1.0)));
            Value::Complex(Complex64::new(params[0], params[1]))
        }
        NodeKind::Coherency => {
            for k in 0..4 {
                grad.push(Value::Jones(value::pauli(k).map(|z| z * 0.5)));
            }
            Value::Jones(value::coherency([params[0], params[1], params[2], params[3]]))
        }
        NodeKind::Spinor => {
            let zero = Complex64::new(0.0, 0.0);
            let one = Complex64::new(1.0, 0.0);
            let i = Complex64::new(0.0, 1.0);
            grad.push(Value::Spinor(Spinor::new(one, zero)));
            grad.push(Value::Spinor(Spinor::new(i, zero)));
            grad.push(Value::Spinor(Spinor::new(zero, one)));
            grad.push(Value::Spinor(Spinor::new(zero, i)));
            Value::Spinor(Spinor::new(
                Complex64::new(params[0], params[1]),
                Complex64::new(params[2], params[3]),
            ))
        }
        NodeKind::Faraday {
            frequency,
            reference_frequency,
        } => {
            // a rotation by -phi about V advances the position angle by phi
            let scale = faraday_scale(*frequency, *reference_frequency);
            let phi = -params[0] * scale;
            grad.push(Value::Jones(rotation_gradient(Axis::V, phi).map(|z| z * -scale)));
            Value::Jones(value::unitary(phi.cos(), Axis::V, phi.sin()))
        }
        other => {
            return Err(MealError::invalid_state(
                "calculate_leaf",
                format!("{} is not a leaf", other.class_name()),
            ))
        }
    };

    if let Some(gradient) = gradient {
        *gradient = grad;
    }
    Ok(value)
}
