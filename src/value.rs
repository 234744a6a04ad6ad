//! Function results.
//!
//! A function node produces one of a small, fixed set of physical
//! quantities: a real scalar, a complex number, a Jones matrix (2x2
//! complex), a Mueller matrix (4x4 real) or a complex spinor. [`Value`]
//! is the sum type over these; partial derivatives with respect to
//! parameters share the type of the value they differentiate.
//!
//! The Pauli basis used throughout is
//! `sigma_0 = I`, `sigma_1 = diag(1, -1)`, `sigma_2 = [[0, 1], [1, 0]]`,
//! `sigma_3 = [[0, -i], [i, 0]]`, so that Stokes Q, U and V couple to
//! `sigma_1`, `sigma_2` and `sigma_3` respectively.

use nalgebra::{Matrix2, Matrix4, Vector2};
use num_complex::Complex64;
use std::fmt;

use crate::error::{MealError, Result};

/// 2x2 complex matrix acting on the electric field.
pub type Jones = Matrix2<Complex64>;

/// 4x4 real matrix acting on the Stokes vector.
pub type Mueller = Matrix4<f64>;

/// Two complex field components.
pub type Spinor = Vector2<Complex64>;

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Scalar,
    Complex,
    Jones,
    Mueller,
    Spinor,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Scalar => "Scalar",
            ValueKind::Complex => "Complex",
            ValueKind::Jones => "Jones",
            ValueKind::Mueller => "Mueller",
            ValueKind::Spinor => "Spinor",
        };
        f.write_str(name)
    }
}

/// Axis of a boost or rotation in the Pauli basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Stokes Q, `sigma_1`
    Q,
    /// Stokes U, `sigma_2`
    U,
    /// Stokes V, `sigma_3`
    V,
}

impl Axis {
    pub fn pauli(&self) -> Jones {
        match self {
            Axis::Q => pauli(1),
            Axis::U => pauli(2),
            Axis::V => pauli(3),
        }
    }
}

/// The value of a function, or one partial derivative of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Complex(Complex64),
    Jones(Jones),
    Mueller(Mueller),
    Spinor(Spinor),
}

fn square_parts(z: Complex64) -> Complex64 {
    Complex64::new(z.re * z.re, z.im * z.im)
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Complex(_) => ValueKind::Complex,
            Value::Jones(_) => ValueKind::Jones,
            Value::Mueller(_) => ValueKind::Mueller,
            Value::Spinor(_) => ValueKind::Spinor,
        }
    }

    /// The additive identity of the given kind.
    pub fn zero(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Scalar => Value::Scalar(0.0),
            ValueKind::Complex => Value::Complex(Complex64::new(0.0, 0.0)),
            ValueKind::Jones => Value::Jones(Jones::zeros()),
            ValueKind::Mueller => Value::Mueller(Mueller::zeros()),
            ValueKind::Spinor => Value::Spinor(Spinor::zeros()),
        }
    }

    /// The multiplicative identity of the given kind.
    pub fn identity(kind: ValueKind) -> Result<Value> {
        match kind {
            ValueKind::Scalar => Ok(Value::Scalar(1.0)),
            ValueKind::Complex => Ok(Value::Complex(Complex64::new(1.0, 0.0))),
            ValueKind::Jones => Ok(Value::Jones(Jones::identity())),
            ValueKind::Mueller => Ok(Value::Mueller(Mueller::identity())),
            ValueKind::Spinor => Err(MealError::invalid_state(
                "Value::identity",
                "a spinor has no multiplicative identity",
            )),
        }
    }

    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(x) => Ok(*x),
            other => Err(mismatch("Value::as_scalar", ValueKind::Scalar, other.kind())),
        }
    }

    pub fn as_complex(&self) -> Result<Complex64> {
        match self {
            Value::Complex(z) => Ok(*z),
            Value::Scalar(x) => Ok(Complex64::new(*x, 0.0)),
            other => Err(mismatch("Value::as_complex", ValueKind::Complex, other.kind())),
        }
    }

    pub fn as_jones(&self) -> Result<Jones> {
        match self {
            Value::Jones(j) => Ok(*j),
            other => Err(mismatch("Value::as_jones", ValueKind::Jones, other.kind())),
        }
    }

    pub fn as_mueller(&self) -> Result<Mueller> {
        match self {
            Value::Mueller(m) => Ok(*m),
            other => Err(mismatch("Value::as_mueller", ValueKind::Mueller, other.kind())),
        }
    }

    pub fn as_spinor(&self) -> Result<Spinor> {
        match self {
            Value::Spinor(s) => Ok(*s),
            other => Err(mismatch("Value::as_spinor", ValueKind::Spinor, other.kind())),
        }
    }

    /// Sum of two values of the same kind.
    pub fn try_add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + b)),
            (Value::Complex(a), Value::Complex(b)) => Ok(Value::Complex(a + b)),
            (Value::Jones(a), Value::Jones(b)) => Ok(Value::Jones(a + b)),
            (Value::Mueller(a), Value::Mueller(b)) => Ok(Value::Mueller(a + b)),
            (Value::Spinor(a), Value::Spinor(b)) => Ok(Value::Spinor(a + b)),
            (a, b) => Err(mismatch("Value::try_add", a.kind(), b.kind())),
        }
    }

    /// Multiply every component by a real factor.
    pub fn scale(&self, factor: f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(x * factor),
            Value::Complex(z) => Value::Complex(z * factor),
            Value::Jones(j) => Value::Jones(j.map(|z| z * factor)),
            Value::Mueller(m) => Value::Mueller(m * factor),
            Value::Spinor(s) => Value::Spinor(s.map(|z| z * factor)),
        }
    }

    /// Product in the algebra of the operands.
    ///
    /// Scalars and complex numbers multiply anything; Jones matrices
    /// multiply Jones matrices and spinors; Mueller matrices multiply
    /// Mueller matrices.
    pub fn try_mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), b) => Ok(b.scale(*a)),
            (a, Value::Scalar(b)) => Ok(a.scale(*b)),
            (Value::Complex(a), Value::Complex(b)) => Ok(Value::Complex(a * b)),
            (Value::Complex(a), Value::Jones(j)) | (Value::Jones(j), Value::Complex(a)) => {
                Ok(Value::Jones(j.map(|z| z * a)))
            }
            (Value::Complex(a), Value::Spinor(s)) => Ok(Value::Spinor(s.map(|z| z * a))),
            (Value::Jones(a), Value::Jones(b)) => Ok(Value::Jones(a * b)),
            (Value::Jones(a), Value::Spinor(s)) => Ok(Value::Spinor(a * s)),
            (Value::Mueller(a), Value::Mueller(b)) => Ok(Value::Mueller(a * b)),
            (a, b) => Err(mismatch("Value::try_mul", a.kind(), b.kind())),
        }
    }

    /// Hermitian conjugate (transpose for real matrices).
    pub fn adjoint(&self) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(*x),
            Value::Complex(z) => Value::Complex(z.conj()),
            Value::Jones(j) => Value::Jones(j.adjoint()),
            Value::Mueller(m) => Value::Mueller(m.transpose()),
            Value::Spinor(s) => Value::Spinor(s.map(|z| z.conj())),
        }
    }

    /// Square of every real component, used to propagate variances.
    pub fn component_square(&self) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(x * x),
            Value::Complex(z) => Value::Complex(square_parts(*z)),
            Value::Jones(j) => Value::Jones(j.map(square_parts)),
            Value::Mueller(m) => Value::Mueller(m.map(|x| x * x)),
            Value::Spinor(s) => Value::Spinor(s.map(square_parts)),
        }
    }

    /// Number of real components.
    pub fn ncomponents(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Complex(_) => 2,
            Value::Jones(_) => 8,
            Value::Mueller(_) => 16,
            Value::Spinor(_) => 4,
        }
    }

    /// The real components, row-major, real part before imaginary part.
    pub fn components(&self) -> Vec<f64> {
        fn push_complex<'a>(out: &mut Vec<f64>, values: impl Iterator<Item = &'a Complex64>) {
            for z in values {
                out.push(z.re);
                out.push(z.im);
            }
        }

        let mut out = Vec::with_capacity(self.ncomponents());
        match self {
            Value::Scalar(x) => out.push(*x),
            Value::Complex(z) => push_complex(&mut out, std::iter::once(z)),
            Value::Jones(j) => {
                for r in 0..2 {
                    push_complex(&mut out, (0..2).map(|c| &j[(r, c)]));
                }
            }
            Value::Mueller(m) => {
                for r in 0..4 {
                    for c in 0..4 {
                        out.push(m[(r, c)]);
                    }
                }
            }
            Value::Spinor(s) => push_complex(&mut out, s.iter()),
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.components().iter().all(|x| x.is_finite())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(x) => write!(f, "{}", x),
            Value::Complex(z) => write!(f, "({},{})", z.re, z.im),
            other => write!(f, "{}{:?}", other.kind(), other.components()),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Complex64> for Value {
    fn from(z: Complex64) -> Self {
        Value::Complex(z)
    }
}

impl From<Jones> for Value {
    fn from(j: Jones) -> Self {
        Value::Jones(j)
    }
}

/// A value together with the variance of each of its real components.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEstimate {
    pub value: Value,
    pub variance: Value,
}

fn mismatch(location: &str, expected: ValueKind, found: ValueKind) -> MealError {
    MealError::invalid_state(location, format!("incompatible kinds {} and {}", expected, found))
}

/// The Pauli matrix `sigma_k`, `k` in `0..=3`; any other `k` gives zero.
pub fn pauli(k: usize) -> Jones {
    let o = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    let i = Complex64::new(0.0, 1.0);
    match k {
        0 => Jones::new(one, o, o, one),
        1 => Jones::new(one, o, o, -one),
        2 => Jones::new(o, one, one, o),
        3 => Jones::new(o, -i, i, o),
        _ => Jones::zeros(),
    }
}

/// `q0 I + q sigma_axis`, the Jones matrix of a boost when
/// `(q0, q) = (cosh beta, sinh beta)`.
pub fn hermitian(q0: f64, axis: Axis, q: f64) -> Jones {
    Jones::identity().map(|z| z * q0) + axis.pauli().map(|z| z * q)
}

/// `q0 I + i q sigma_axis`, the Jones matrix of a rotation when
/// `(q0, q) = (cos phi, sin phi)`.
pub fn unitary(q0: f64, axis: Axis, q: f64) -> Jones {
    let iq = Complex64::new(0.0, q);
    Jones::identity().map(|z| z * q0) + axis.pauli().map(|z| z * iq)
}

/// Coherency matrix `rho = (S0 I + S1 sigma_1 + S2 sigma_2 + S3 sigma_3) / 2`.
pub fn coherency(stokes: [f64; 4]) -> Jones {
    (0..4).fold(Jones::zeros(), |acc, k| acc + pauli(k).map(|z| z * (0.5 * stokes[k])))
}

/// Stokes parameters of a coherency matrix, `S_k = Re tr(sigma_k rho)`.
pub fn stokes(rho: &Jones) -> [f64; 4] {
    let mut s = [0.0; 4];
    for (k, sk) in s.iter_mut().enumerate() {
        *sk = (pauli(k) * rho).trace().re;
    }
    s
}
