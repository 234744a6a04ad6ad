//! Solution and inversion of the normal equations.
//!
//! Both operations factorize the curvature matrix with nalgebra's LU
//! decomposition with complete pivoting. A pivot smaller than the
//! singular threshold times the largest element of the matrix raises
//! `InvalidState`.

use nalgebra::linalg::FullPivLU;
use nalgebra::{DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2};

use crate::error::{MealError, Result};

fn ndarray_to_nalgebra(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn singular(location: &str, detail: String) -> MealError {
    MealError::invalid_state(location, format!("singular matrix: {}", detail))
}

fn factorize(a: &Array2<f64>, threshold: f64, location: &str) -> Result<FullPivLU<f64, Dyn, Dyn>> {
    let n = a.nrows();
    if a.ncols() != n || n == 0 {
        return Err(MealError::invalid_param(
            location,
            format!("matrix {}x{} is not square", a.nrows(), a.ncols()),
        ));
    }

    let scale = a.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    if !scale.is_finite() {
        return Err(MealError::invalid_state(location, "non-finite matrix element"));
    }

    let lu = ndarray_to_nalgebra(a).full_piv_lu();
    let smallest = lu
        .u()
        .diagonal()
        .iter()
        .fold(f64::INFINITY, |m, x| m.min(x.abs()));
    if smallest <= threshold * scale {
        return Err(singular(
            location,
            format!("smallest pivot {:e}, largest element {:e}", smallest, scale),
        ));
    }
    Ok(lu)
}

/// Solve `a x = b`.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>, threshold: f64) -> Result<Array1<f64>> {
    if b.len() != a.nrows() {
        return Err(MealError::invalid_param(
            "normal_equations::solve",
            format!("matrix {}x{} and vector {}", a.nrows(), a.ncols(), b.len()),
        ));
    }
    let lu = factorize(a, threshold, "normal_equations::solve")?;
    let rhs = DVector::from_iterator(b.len(), b.iter().copied());
    let x = lu
        .solve(&rhs)
        .ok_or_else(|| singular("normal_equations::solve", "LU solve failed".to_string()))?;
    Ok(x.iter().copied().collect())
}

/// The inverse of `a`.
pub fn invert(a: &Array2<f64>, threshold: f64) -> Result<Array2<f64>> {
    let lu = factorize(a, threshold, "normal_equations::invert")?;
    let inverse = lu
        .try_inverse()
        .ok_or_else(|| singular("normal_equations::invert", "LU inverse failed".to_string()))?;
    Ok(Array2::from_shape_fn(a.dim(), |(i, j)| inverse[(i, j)]))
}
