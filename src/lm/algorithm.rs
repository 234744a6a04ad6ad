//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt
//! algorithm for weighted nonlinear least-squares problems. Each iteration
//! solves the damped normal equations
//!
//! ```text
//! sum_k alpha'_jk delta_k = beta_j,   alpha'_jj = alpha_jj (1 + lambda)
//! ```
//!
//! where `alpha = J^T J` is the curvature matrix and `beta = J^T r`, both
//! restricted to the free parameters. A step that lowers chi-squared is
//! accepted and lambda decreases; otherwise the parameters are restored
//! and lambda increases.

use log::{debug, info};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{MealError, Result};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::normal_equations;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values, free and fixed
    pub params: Array1<f64>,

    /// Chi-squared at the solution
    pub chisq: f64,

    /// Number of residuals minus number of free parameters
    pub nfree: usize,

    /// Number of iterations performed
    pub iterations: usize,

    /// How the iteration ended
    pub status: ConvergenceStatus,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the result
    pub message: String,

    /// Damping parameter at the end of the iteration
    pub lambda: f64,

    /// Covariance of all parameters; rows and columns of fixed parameters are zero
    pub covariance: Array2<f64>,
}

impl LmResult {
    /// Chi-squared per degree of freedom.
    pub fn reduced_chisq(&self) -> f64 {
        if self.nfree == 0 {
            f64::NAN
        } else {
            self.chisq / self.nfree as f64
        }
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Chi-squared: {:.6e} (nfree = {})", self.chisq, self.nfree)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.criteria.max_iterations = max_iterations;
        self
    }

    /// Set the relative chi-squared threshold for convergence.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.criteria.threshold = threshold;
        self
    }

    /// Set the number of consecutive non-improving steps that ends the fit.
    pub fn with_max_not_improving(mut self, steps: usize) -> Self {
        self.config.criteria.max_not_improving = steps;
        self
    }

    /// Replace all convergence criteria.
    pub fn with_criteria(mut self, criteria: ConvergenceCriteria) -> Self {
        self.config.criteria = criteria;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the factor by which to increase lambda.
    pub fn with_lambda_up_factor(mut self, factor: f64) -> Self {
        self.config.lambda_up_factor = factor;
        self
    }

    /// Set the factor by which to decrease lambda.
    pub fn with_lambda_down_factor(mut self, factor: f64) -> Self {
        self.config.lambda_down_factor = factor;
        self
    }

    /// Set the relative pivot size below which the normal equations are singular.
    pub fn with_singular_threshold(mut self, threshold: f64) -> Self {
        self.config.singular_threshold = threshold;
        self
    }

    /// Evaluate the problem at its current parameters and set up the iteration.
    ///
    /// # Errors
    ///
    /// * `InvalidState` when there are no free parameters, when there are
    ///   fewer residuals than free parameters, or when chi-squared is not finite
    pub fn init<P: Problem>(&self, problem: &mut P) -> Result<LmState> {
        let free = problem.free_parameters()?;
        let nfit = free.len();
        let ndata = problem.residual_count();

        if nfit == 0 {
            return Err(MealError::invalid_state(
                "LevenbergMarquardt::init",
                "no free parameters",
            ));
        }
        if ndata < nfit {
            return Err(MealError::invalid_state(
                "LevenbergMarquardt::init",
                format!("ndata={} < nfit={}", ndata, nfit),
            ));
        }

        let (residuals, jacobian) = problem.eval_with_jacobian()?;
        let chisq = chi_squared(&residuals, 0)?;
        let (alpha, beta) = curvature(&jacobian, &residuals, &free);
        debug!(
            "LevenbergMarquardt::init nparam={} nfit={} ndata={} chisq={}",
            problem.parameter_count(),
            nfit,
            ndata,
            chisq
        );

        Ok(LmState {
            free,
            ndata,
            alpha,
            beta,
            chisq,
            lambda: self.config.initial_lambda,
            iterations: 0,
            not_improving: 0,
        })
    }

    /// Take one damped step.
    ///
    /// A step that lowers chi-squared is kept; otherwise the previous
    /// parameters are restored. Returns the convergence status after the step.
    ///
    /// # Errors
    ///
    /// * `InvalidState` when the damped normal equations are singular or
    ///   chi-squared is not finite
    pub fn iter<P: Problem>(&self, state: &mut LmState, problem: &mut P) -> Result<ConvergenceStatus> {
        state.iterations += 1;
        let nfit = state.free.len();

        let mut damped = state.alpha.clone();
        for k in 0..nfit {
            damped[[k, k]] *= 1.0 + state.lambda;
        }
        let delta = normal_equations::solve(&damped, &state.beta, self.config.singular_threshold)
            .map_err(|e| e.context("LevenbergMarquardt::iter"))?;

        let previous = state
            .free
            .iter()
            .map(|&i| problem.get_param(i))
            .collect::<Result<Vec<f64>>>()?;
        for (k, &i) in state.free.iter().enumerate() {
            problem.set_param(i, previous[k] + delta[k])?;
        }

        let (residuals, jacobian) = problem.eval_with_jacobian()?;
        let chisq = chi_squared(&residuals, state.iterations)?;
        let improved = chisq < state.chisq;
        state.not_improving = if improved { 0 } else { state.not_improving + 1 };

        debug!(
            "LevenbergMarquardt::iter iteration={} chisq={} lambda={} {}",
            state.iterations,
            chisq,
            state.lambda,
            if improved { "accepted" } else { "rejected" }
        );

        let status = self
            .config
            .criteria
            .check(state.chisq, chisq, state.not_improving, state.iterations);

        if improved {
            let (alpha, beta) = curvature(&jacobian, &residuals, &state.free);
            state.alpha = alpha;
            state.beta = beta;
            state.chisq = chisq;
            state.lambda *= self.config.lambda_down_factor;
        } else {
            for (k, &i) in state.free.iter().enumerate() {
                problem.set_param(i, previous[k])?;
            }
            state.lambda *= self.config.lambda_up_factor;
        }
        Ok(status)
    }

    /// Finish the iteration: invert the undamped curvature matrix, set the
    /// variance of every free parameter and summarize.
    ///
    /// # Errors
    ///
    /// * `InvalidState` when the curvature matrix is singular
    pub fn result<P: Problem>(
        &self,
        state: LmState,
        problem: &mut P,
        status: ConvergenceStatus,
    ) -> Result<LmResult> {
        let nparam = problem.parameter_count();
        let nfit = state.free.len();

        let inverse = normal_equations::invert(&state.alpha, self.config.singular_threshold)
            .map_err(|e| e.context("LevenbergMarquardt::result"))?;

        let mut covariance = Array2::zeros((nparam, nparam));
        for (k, &i) in state.free.iter().enumerate() {
            for (l, &j) in state.free.iter().enumerate() {
                covariance[[i, j]] = inverse[[k, l]];
            }
            problem.set_variance(i, inverse[[k, k]])?;
        }

        let params = (0..nparam)
            .map(|i| problem.get_param(i))
            .collect::<Result<Vec<f64>>>()?;

        let nfree = state.ndata - nfit;
        let message = status.description();
        info!(
            "LevenbergMarquardt::result {} chisq={} nfree={} iterations={}",
            message, state.chisq, nfree, state.iterations
        );

        Ok(LmResult {
            params: Array1::from_vec(params),
            chisq: state.chisq,
            nfree,
            iterations: state.iterations,
            status,
            success: status.is_converged(),
            message,
            lambda: state.lambda,
            covariance,
        })
    }

    /// Minimize chi-squared for the given problem.
    ///
    /// The problem's parameters are updated in place; on return they hold
    /// the best solution found, and the variance of every free parameter
    /// is set from the diagonal of the covariance matrix.
    ///
    /// # Errors
    ///
    /// * `InvalidState` when there are no free parameters, when chi-squared
    ///   is not finite at any step, or when the normal equations are singular
    pub fn minimize<P: Problem>(&self, problem: &mut P) -> Result<LmResult> {
        let mut state = self
            .init(problem)
            .map_err(|e| e.context("LevenbergMarquardt::minimize"))?;
        let status = loop {
            let status = self
                .iter(&mut state, problem)
                .map_err(|e| e.context("LevenbergMarquardt::minimize"))?;
            if status.is_terminated() {
                break status;
            }
        };
        self.result(state, problem, status)
            .map_err(|e| e.context("LevenbergMarquardt::minimize"))
    }
}

/// Working state of one minimization between calls to
/// [`LevenbergMarquardt::iter`].
#[derive(Debug, Clone)]
pub struct LmState {
    free: Vec<usize>,
    ndata: usize,
    alpha: Array2<f64>,
    beta: Array1<f64>,
    chisq: f64,
    lambda: f64,
    iterations: usize,
    not_improving: usize,
}

impl LmState {
    /// Chi-squared of the best step so far.
    pub fn chisq(&self) -> f64 {
        self.chisq
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Indices of the free parameters.
    pub fn free(&self) -> &[usize] {
        &self.free
    }
}

fn chi_squared(residuals: &Array1<f64>, iteration: usize) -> Result<f64> {
    let chisq: f64 = residuals.iter().map(|r| r * r).sum();
    if !chisq.is_finite() {
        return Err(MealError::invalid_state(
            "LevenbergMarquardt::minimize",
            format!("non-finite chi-squared={} at iteration {}", chisq, iteration),
        ));
    }
    Ok(chisq)
}

/// `alpha = J^T J` and `beta = J^T r` over the free parameters.
fn curvature(jacobian: &Array2<f64>, residuals: &Array1<f64>, free: &[usize]) -> (Array2<f64>, Array1<f64>) {
    let nfit = free.len();
    let mut alpha = Array2::zeros((nfit, nfit));
    let mut beta = Array1::zeros(nfit);

    for (row, r) in jacobian.outer_iter().zip(residuals.iter()) {
        for (k, &i) in free.iter().enumerate() {
            let gi = row[i];
            if gi == 0.0 {
                continue;
            }
            beta[k] += gi * r;
            for (l, &j) in free.iter().enumerate().take(k + 1) {
                alpha[[k, l]] += gi * row[j];
            }
        }
    }
    for k in 0..nfit {
        for l in 0..k {
            alpha[[l, k]] = alpha[[k, l]];
        }
    }
    (alpha, beta)
}
