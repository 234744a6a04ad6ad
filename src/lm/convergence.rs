//! Convergence criteria for the Levenberg-Marquardt iteration.
//!
//! An iteration either accepts a step (chi-squared decreased) or rejects
//! it. The fit has converged when an accepted step improves chi-squared by
//! a relative amount below the threshold, when chi-squared reaches zero, or
//! when too many consecutive steps fail to improve it.

/// Possible convergence states of the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The algorithm is still running.
    Running,

    /// An accepted step changed chi-squared by less than the threshold.
    ChiSquaredConvergence,

    /// Chi-squared reached zero.
    ExactFit,

    /// Too many consecutive steps failed to decrease chi-squared.
    NotImproving,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has terminated (either converged or failed).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ChiSquaredConvergence
                | ConvergenceStatus::ExactFit
                | ConvergenceStatus::NotImproving
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::Running => "Optimization is still running".to_string(),
            ConvergenceStatus::ChiSquaredConvergence => {
                "Converged: small relative change in chi-squared".to_string()
            }
            ConvergenceStatus::ExactFit => "Converged: chi-squared is zero".to_string(),
            ConvergenceStatus::NotImproving => {
                "Converged: chi-squared no longer improving".to_string()
            }
            ConvergenceStatus::MaxIterationsReached => {
                "Terminated: maximum iterations reached".to_string()
            }
        }
    }
}

/// Criteria for determining when the iteration has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Relative decrease in chi-squared below which an accepted step ends the fit.
    pub threshold: f64,

    /// Consecutive non-improving steps after which the fit ends.
    pub max_not_improving: usize,

    /// Maximum number of iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            threshold: 1e-6,
            max_not_improving: 25,
            max_iterations: 1000,
        }
    }
}

impl ConvergenceCriteria {
    /// Creates a new set of convergence criteria.
    pub fn new(threshold: f64, max_not_improving: usize, max_iterations: usize) -> Self {
        Self {
            threshold,
            max_not_improving,
            max_iterations,
        }
    }

    /// Checks whether the iteration has converged.
    ///
    /// # Arguments
    ///
    /// * `chisq` - Chi-squared before the step
    /// * `new_chisq` - Chi-squared after the step
    /// * `not_improving` - Consecutive rejected steps, including this one
    /// * `iterations` - The number of iterations so far
    ///
    /// # Returns
    ///
    /// * The convergence status
    pub fn check(
        &self,
        chisq: f64,
        new_chisq: f64,
        not_improving: usize,
        iterations: usize,
    ) -> ConvergenceStatus {
        if new_chisq < chisq {
            if new_chisq == 0.0 {
                return ConvergenceStatus::ExactFit;
            }
            if (chisq - new_chisq) / chisq < self.threshold {
                return ConvergenceStatus::ChiSquaredConvergence;
            }
        } else if not_improving >= self.max_not_improving {
            return ConvergenceStatus::NotImproving;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        ConvergenceStatus::Running
    }
}
