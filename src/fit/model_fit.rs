//! Fitting a graph node to observed values.
//!
//! Each observation pairs an abscissa (time, frequency, pulse phase, or
//! anything else the caller can apply to the graph) with a measured value
//! and its variance. A caller-supplied closure moves the graph to the
//! abscissa of each observation before the model is evaluated.

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::lm::{ConvergenceStatus, LevenbergMarquardt};
use crate::problem::Problem;
use crate::value::Value;

/// One measured value of the model.
#[derive(Debug, Clone)]
pub struct Observation<X> {
    pub abscissa: X,
    pub value: Value,
    /// Variance of each component of `value`; components with zero or
    /// negative variance are ignored.
    pub variance: Value,
}

impl<X> Observation<X> {
    pub fn new(abscissa: X, value: Value, variance: Value) -> Self {
        Self {
            abscissa,
            value,
            variance,
        }
    }
}

/// Summary of a completed fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub chisq: f64,
    /// Number of constraints minus number of free parameters.
    pub nfree: usize,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
    pub covariance: Array2<f64>,
    #[serde(skip)]
    pub status: ConvergenceStatus,
}

impl FitReport {
    pub fn reduced_chisq(&self) -> f64 {
        self.chisq / self.nfree as f64
    }
}

/// A [`Problem`] over the parameters of one graph node.
pub struct GraphProblem<'a, X, F>
where
    F: FnMut(&mut Graph, &X) -> Result<()>,
{
    graph: &'a mut Graph,
    model: NodeId,
    observations: &'a [Observation<X>],
    set_abscissa: F,
    weights: Vec<Vec<f64>>,
    nresidual: usize,
}

impl<'a, X, F> GraphProblem<'a, X, F>
where
    F: FnMut(&mut Graph, &X) -> Result<()>,
{
    /// Check every observation against the result kind of `model`.
    pub fn new(
        graph: &'a mut Graph,
        model: NodeId,
        observations: &'a [Observation<X>],
        set_abscissa: F,
    ) -> Result<Self> {
        let kind = graph.result_kind(model)?;
        let mut weights = Vec::with_capacity(observations.len());
        for (i, observation) in observations.iter().enumerate() {
            if observation.value.kind() != kind || observation.variance.kind() != kind {
                return Err(MealError::invalid_param(
                    "GraphProblem::new",
                    format!(
                        "observation {} is {}+/-{}; model is {}",
                        i,
                        observation.value.kind(),
                        observation.variance.kind(),
                        kind
                    ),
                ));
            }
            let w: Vec<f64> = observation
                .variance
                .components()
                .iter()
                .map(|&v| if v > 0.0 { 1.0 / v.sqrt() } else { 0.0 })
                .collect();
            weights.push(w);
        }
        let nresidual = weights
            .iter()
            .map(|w| w.iter().filter(|x| **x > 0.0).count())
            .sum();

        Ok(Self {
            graph,
            model,
            observations,
            set_abscissa,
            weights,
            nresidual,
        })
    }

    fn evaluate(&mut self, with_jacobian: bool) -> Result<(Array1<f64>, Array2<f64>)> {
        let nparam = self.graph.nparam(self.model)?;
        let mut residuals = Array1::zeros(self.nresidual);
        let mut jacobian = Array2::zeros((if with_jacobian { self.nresidual } else { 0 }, nparam));

        let mut row = 0;
        let mut gradient = Vec::new();
        for (observation, weights) in self.observations.iter().zip(&self.weights) {
            (self.set_abscissa)(&mut *self.graph, &observation.abscissa)?;
            let model = if with_jacobian {
                self.graph.evaluate(self.model, Some(&mut gradient))?
            } else {
                self.graph.evaluate(self.model, None)?
            };

            let data = observation.value.components();
            let predicted = model.components();
            let partials: Vec<Vec<f64>> = if with_jacobian {
                gradient.iter().map(Value::components).collect()
            } else {
                Vec::new()
            };

            for (c, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                residuals[row] = (data[c] - predicted[c]) * w;
                for (j, partial) in partials.iter().enumerate() {
                    jacobian[[row, j]] = partial[c] * w;
                }
                row += 1;
            }
        }
        Ok((residuals, jacobian))
    }
}

impl<'a, X, F> Problem for GraphProblem<'a, X, F>
where
    F: FnMut(&mut Graph, &X) -> Result<()>,
{
    fn parameter_count(&self) -> usize {
        self.graph.nparam(self.model).unwrap_or(0)
    }

    fn residual_count(&self) -> usize {
        self.nresidual
    }

    fn get_param(&self, index: usize) -> Result<f64> {
        self.graph.get_param(self.model, index)
    }

    fn set_param(&mut self, index: usize, value: f64) -> Result<()> {
        self.graph.set_param(self.model, index, value)
    }

    fn get_infit(&self, index: usize) -> Result<bool> {
        self.graph.get_infit(self.model, index)
    }

    fn set_variance(&mut self, index: usize, variance: f64) -> Result<()> {
        self.graph.set_variance(self.model, index, variance)
    }

    fn eval(&mut self) -> Result<Array1<f64>> {
        Ok(self.evaluate(false)?.0)
    }

    fn eval_with_jacobian(&mut self) -> Result<(Array1<f64>, Array2<f64>)> {
        self.evaluate(true)
    }
}

/// Fits graph nodes to observations with Levenberg-Marquardt.
#[derive(Debug, Clone, Default)]
pub struct ModelFit {
    solver: LevenbergMarquardt,
}

impl ModelFit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(solver: LevenbergMarquardt) -> Self {
        Self { solver }
    }

    /// Fit the free parameters of `model`.
    ///
    /// On success the parameters of the graph hold the solution and their
    /// variances are set from the covariance matrix.
    pub fn fit<X, F>(
        &self,
        graph: &mut Graph,
        model: NodeId,
        observations: &[Observation<X>],
        set_abscissa: F,
    ) -> Result<FitReport>
    where
        F: FnMut(&mut Graph, &X) -> Result<()>,
    {
        let mut problem = GraphProblem::new(graph, model, observations, set_abscissa)?;
        let result = self
            .solver
            .minimize(&mut problem)
            .map_err(|e| e.context("ModelFit::fit"))?;
        Ok(FitReport {
            chisq: result.chisq,
            nfree: result.nfree,
            iterations: result.iterations,
            converged: result.success,
            message: result.message,
            covariance: result.covariance,
            status: result.status,
        })
    }
}
