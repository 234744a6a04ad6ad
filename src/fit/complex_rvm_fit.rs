//! Rotating vector model fit to the complex linear polarization.
//!
//! A single attempt runs init (select data, derive first guesses), iterate
//! (Levenberg-Marquardt until convergence) and repair (bring the angles
//! into canonical ranges). The grid searches repeat the whole attempt from
//! many starting geometries and keep the best.

use log::{debug, info, warn};
use ndarray::Array2;
use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, PI};

use super::model_fit::{ModelFit, Observation};
use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::lm::LevenbergMarquardt;
use crate::models::ComplexRvm;
use crate::parameters::{Estimate, Parameter};
use crate::value::Value;

/// Stokes Q and U measured at one pulse phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPolarization {
    /// Pulse phase in radians.
    pub phase: f64,
    pub q: Estimate,
    pub u: Estimate,
}

impl LinearPolarization {
    pub fn new(phase: f64, q: Estimate, u: Estimate) -> Self {
        Self { phase, q, u }
    }

    /// `L = Q + iU`
    pub fn linear(&self) -> Complex64 {
        Complex64::new(self.q.value, self.u.value)
    }

    /// Variance of `|L|`, `(Q^2 var_Q + U^2 var_U) / L^2`.
    pub fn linear_variance(&self) -> f64 {
        let l2 = self.linear().norm_sqr();
        (self.q.value.powi(2) * self.q.variance + self.u.value.powi(2) * self.u.variance) / l2
    }

    /// `|L| / sigma_L`
    pub fn significance(&self) -> f64 {
        self.linear().norm() / self.linear_variance().sqrt()
    }
}

/// A range of pulse phase `[start, end)` in radians; wraps when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWindow {
    pub start: f64,
    pub end: f64,
}

impl PhaseWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, phase: f64) -> bool {
        if self.start <= self.end {
            phase >= self.start && phase < self.end
        } else {
            phase >= self.start || phase < self.end
        }
    }
}

/// A phase bin that passed selection.
#[derive(Debug, Clone, Copy)]
struct Selected {
    phase: f64,
    linear: Complex64,
    variance: Complex64,
}

/// First guesses derived from the steepest position-angle swing.
#[derive(Debug, Clone, Copy)]
struct Guess {
    phi0: f64,
    psi0: f64,
    slope: f64,
}

pub struct ComplexRvmFit {
    graph: Graph,
    model: ComplexRvm,
    data: Vec<LinearPolarization>,
    selected: Vec<Selected>,
    stale: bool,

    threshold: f64,
    include: Vec<PhaseWindow>,
    exclude: Vec<PhaseWindow>,
    orthogonal: Vec<PhaseWindow>,
    guess_smooth: usize,
    guess_zeta: bool,
    alpha_range: (f64, f64),
    zeta_range: (f64, f64),
    chisq_map: bool,
    solver: LevenbergMarquardt,

    chisq: f64,
    nfree: usize,
    covariance: Option<Array2<f64>>,
    map: Option<Array2<f64>>,
}

impl ComplexRvmFit {
    pub fn new() -> Result<Self> {
        let mut graph = Graph::new();
        let model = ComplexRvm::new(&mut graph)?;
        Ok(Self {
            graph,
            model,
            data: Vec::new(),
            selected: Vec::new(),
            stale: true,
            threshold: 3.0,
            include: Vec::new(),
            exclude: Vec::new(),
            orthogonal: Vec::new(),
            guess_smooth: 1,
            guess_zeta: true,
            alpha_range: (0.0, PI),
            zeta_range: (0.0, PI),
            chisq_map: false,
            solver: LevenbergMarquardt::new(),
            chisq: f64::NAN,
            nfree: 0,
            covariance: None,
            map: None,
        })
    }

    pub fn add_observation(&mut self, observation: LinearPolarization) {
        self.data.push(observation);
        self.stale = true;
    }

    pub fn set_observations(&mut self, data: Vec<LinearPolarization>) {
        self.data = data;
        self.stale = true;
    }

    /// Minimum `L / sigma_L` of a bin to be included. Default: 3
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        self.stale = true;
    }

    /// Only bins inside one of the include windows are fit (when any are given).
    pub fn add_include(&mut self, window: PhaseWindow) {
        self.include.push(window);
        self.stale = true;
    }

    pub fn add_exclude(&mut self, window: PhaseWindow) {
        self.exclude.push(window);
        self.stale = true;
    }

    /// Bins in an orthogonal-mode window have their linear polarization negated.
    pub fn add_orthogonal_mode(&mut self, window: PhaseWindow) {
        self.orthogonal.push(window);
        self.stale = true;
    }

    /// Number of neighbouring cross products summed when guessing the slope. Default: 1
    pub fn set_guess_smooth(&mut self, width: usize) {
        self.guess_smooth = width.max(1);
    }

    /// Derive zeta from alpha and the steepest slope on each init. Default: true
    pub fn set_guess_zeta(&mut self, flag: bool) {
        self.guess_zeta = flag;
    }

    pub fn set_alpha_range(&mut self, lower: f64, upper: f64) {
        self.alpha_range = (lower, upper);
    }

    pub fn set_zeta_range(&mut self, lower: f64, upper: f64) {
        self.zeta_range = (lower, upper);
    }

    /// Record chi-squared at every grid point of a search.
    pub fn set_chisq_map(&mut self, flag: bool) {
        self.chisq_map = flag;
    }

    /// Relative chi-squared change that ends an attempt.
    pub fn set_convergence_threshold(&mut self, threshold: f64) {
        self.solver = self.solver.clone().with_threshold(threshold);
    }

    pub fn set_solver(&mut self, solver: LevenbergMarquardt) {
        self.solver = solver;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn model(&self) -> &ComplexRvm {
        &self.model
    }

    pub fn get_chisq(&self) -> f64 {
        self.chisq
    }

    pub fn get_nfree(&self) -> usize {
        self.nfree
    }

    /// Covariance of all model parameters after the last successful fit.
    pub fn covariance(&self) -> Option<&Array2<f64>> {
        self.covariance.as_ref()
    }

    /// Chi-squared over the last grid search; NaN where the fit failed.
    pub fn chisq_map(&self) -> Option<&Array2<f64>> {
        self.map.as_ref()
    }

    pub fn get_magnetic_axis(&self) -> Result<Estimate> {
        self.model.get_rvm().get_magnetic_axis(&self.graph)
    }

    pub fn set_magnetic_axis(&mut self, alpha: Estimate) -> Result<()> {
        self.model.get_rvm().set_magnetic_axis(&mut self.graph, alpha)
    }

    pub fn get_line_of_sight(&self) -> Result<Estimate> {
        self.model.get_rvm().get_line_of_sight(&self.graph)
    }

    pub fn set_line_of_sight(&mut self, zeta: Estimate) -> Result<()> {
        self.model.get_rvm().set_line_of_sight(&mut self.graph, zeta)
    }

    pub fn get_magnetic_meridian(&self) -> Result<Estimate> {
        self.model.get_rvm().get_magnetic_meridian(&self.graph)
    }

    pub fn set_magnetic_meridian(&mut self, phi0: Estimate) -> Result<()> {
        self.model.get_rvm().set_magnetic_meridian(&mut self.graph, phi0)
    }

    pub fn get_reference_position_angle(&self) -> Result<Estimate> {
        self.model.get_rvm().get_reference_position_angle(&self.graph)
    }

    pub fn set_reference_position_angle(&mut self, psi0: Estimate) -> Result<()> {
        self.model
            .get_rvm()
            .set_reference_position_angle(&mut self.graph, psi0)
    }

    /// Number of phase bins selected for the fit.
    pub fn nselected(&mut self) -> Result<usize> {
        if self.stale {
            self.build_states()?;
        }
        Ok(self.selected.len())
    }

    fn angle_leaves(&self) -> [NodeId; 4] {
        let rvm = self.model.get_rvm();
        [rvm.psi0(), rvm.zeta(), rvm.alpha(), rvm.phi0()]
    }

    /// Select data and rebuild the model with one state per selected bin.
    ///
    /// The values and fit flags of the four angles carry over.
    fn build_states(&mut self) -> Result<()> {
        let angles: Vec<Vec<Parameter>> = self
            .angle_leaves()
            .iter()
            .map(|leaf| self.graph.snapshot(*leaf))
            .collect::<Result<_>>()?;

        let mut selected = Vec::new();
        for datum in &self.data {
            let phase = datum.phase;
            if !self.include.is_empty() && !self.include.iter().any(|w| w.contains(phase)) {
                continue;
            }
            if self.exclude.iter().any(|w| w.contains(phase)) {
                continue;
            }
            let significance = datum.significance();
            if !(significance >= self.threshold) {
                debug!(
                    "ComplexRvmFit::build_states skip phase={} L/sigma={}",
                    phase, significance
                );
                continue;
            }
            let sign = if self.orthogonal.iter().any(|w| w.contains(phase)) {
                -1.0
            } else {
                1.0
            };
            selected.push(Selected {
                phase,
                linear: datum.linear() * sign,
                variance: Complex64::new(datum.q.variance, datum.u.variance),
            });
        }
        selected.sort_by(|a, b| a.phase.total_cmp(&b.phase));

        let mut graph = Graph::new();
        let mut model = ComplexRvm::new(&mut graph)?;
        for s in &selected {
            model.add_state(&mut graph, s.phase, s.linear)?;
        }

        let rvm = model.get_rvm();
        let leaves = [rvm.psi0(), rvm.zeta(), rvm.alpha(), rvm.phi0()];
        for (leaf, state) in leaves.iter().zip(&angles) {
            graph.restore(*leaf, state)?;
        }

        info!(
            "ComplexRvmFit::build_states selected {} of {} bins",
            selected.len(),
            self.data.len()
        );
        self.graph = graph;
        self.model = model;
        self.selected = selected;
        self.stale = false;
        Ok(())
    }

    fn guess(&self) -> Result<Guess> {
        let n = self.selected.len();
        let cross: Vec<Complex64> = self
            .selected
            .windows(2)
            .map(|pair| pair[1].linear * pair[0].linear.conj())
            .collect();

        let width = self.guess_smooth.min(cross.len());
        let mut best: Option<(usize, f64)> = None;
        for i in 0..=(cross.len() - width) {
            let c: Complex64 = cross[i..i + width].iter().sum();
            let dphase = self.selected[i + width].phase - self.selected[i].phase;
            if dphase <= 0.0 {
                continue;
            }
            let slope = 0.5 * c.arg() * width as f64 / dphase;
            if best.map_or(true, |(_, s)| slope.abs() > s.abs()) {
                best = Some((i, slope));
            }
        }

        let (i, slope) = best.ok_or_else(|| {
            MealError::invalid_state(
                "ComplexRvmFit::guess",
                format!("no distinct phases among {} bins", n),
            )
        })?;
        let lower = &self.selected[i];
        let upper = &self.selected[i + width];
        let c: Complex64 = cross[i..i + width].iter().sum();

        Ok(Guess {
            phi0: 0.5 * (lower.phase + upper.phase),
            psi0: 0.5 * lower.linear.arg() + 0.25 * c.arg() * width as f64,
            slope,
        })
    }

    /// Select data, build the model if needed and set first guesses.
    ///
    /// The linear-polarization gains start at `|L|`; `phi0` and `psi0` are
    /// placed at the steepest position-angle swing, and `zeta` is derived
    /// from `alpha` and that slope when zeta guessing is enabled. Angles
    /// that are not free are left alone.
    pub fn init(&mut self) -> Result<()> {
        if self.stale {
            self.build_states()?;
        }
        if self.selected.len() < 2 {
            return Err(MealError::invalid_state(
                "ComplexRvmFit::init",
                format!("{} bins above threshold; need at least 2", self.selected.len()),
            ));
        }

        for (i, s) in self.selected.iter().enumerate() {
            self.model
                .set_linear(&mut self.graph, i, Estimate::exact(s.linear.norm()))?;
        }

        let guess = self.guess()?;
        debug!(
            "ComplexRvmFit::init phi0={} psi0={} slope={}",
            guess.phi0, guess.psi0, guess.slope
        );

        let rvm = *self.model.get_rvm();
        let graph = &mut self.graph;
        if graph.get_infit(rvm.phi0(), 0)? {
            graph.set_param(rvm.phi0(), 0, guess.phi0)?;
        }
        if graph.get_infit(rvm.psi0(), 0)? {
            graph.set_param(rvm.psi0(), 0, wrap_upper(guess.psi0, FRAC_PI_2, PI))?;
        }
        if self.guess_zeta && guess.slope != 0.0 && graph.get_infit(rvm.zeta(), 0)? {
            let alpha = graph.get_param(rvm.alpha(), 0)?;
            let ratio = (alpha.sin() / guess.slope).clamp(-1.0, 1.0);
            graph.set_param(rvm.zeta(), 0, alpha + ratio.asin())?;
        }
        Ok(())
    }

    /// One complete fit attempt from the current starting geometry.
    pub fn solve(&mut self) -> Result<()> {
        self.init()?;

        let observations: Vec<Observation<usize>> = self
            .selected
            .iter()
            .enumerate()
            .map(|(i, s)| Observation::new(i, Value::Complex(s.linear), Value::Complex(s.variance)))
            .collect();

        let model = &self.model;
        let report = ModelFit::with_solver(self.solver.clone())
            .fit(&mut self.graph, model.node(), &observations, |graph, i| {
                model.set_state(graph, *i)
            })
            .map_err(|e| e.context("ComplexRvmFit::solve"))?;

        if !report.converged {
            warn!("ComplexRvmFit::solve {}", report.message);
        }

        self.repair()?;
        self.chisq = report.chisq;
        self.nfree = report.nfree;
        self.covariance = Some(report.covariance);
        Ok(())
    }

    /// Bring the geometry into canonical ranges without changing the model.
    ///
    /// - `zeta` in `(-pi, pi]`, then `(alpha, zeta) -> (-alpha, -zeta)` if negative
    /// - `alpha` in `[0, pi)`
    /// - `phi0` in `(-pi, pi]`
    /// - gains negated with `psi0 += pi/2` when their sum is negative
    /// - `psi0` in `(-pi/2, pi/2]`
    fn repair(&mut self) -> Result<()> {
        let rvm = *self.model.get_rvm();

        let mut zeta = wrap_upper(self.graph.get_param(rvm.zeta(), 0)?, PI, 2.0 * PI);
        let mut alpha = self.graph.get_param(rvm.alpha(), 0)?;
        if zeta < 0.0 {
            zeta = -zeta;
            alpha = -alpha;
        }
        alpha = alpha.rem_euclid(PI);
        if alpha >= PI {
            alpha = 0.0;
        }
        let phi0 = wrap_upper(self.graph.get_param(rvm.phi0(), 0)?, PI, 2.0 * PI);
        let mut psi0 = self.graph.get_param(rvm.psi0(), 0)?;

        let mut total = 0.0;
        for i in 0..self.model.nstate() {
            total += self.model.get_linear(&self.graph, i)?.value;
        }
        if total < 0.0 {
            warn!("ComplexRvmFit::repair negative net linear polarization; rotating psi0");
            for i in 0..self.model.nstate() {
                let gain = self.model.get_linear(&self.graph, i)?;
                self.model
                    .set_linear(&mut self.graph, i, Estimate::new(-gain.value, gain.variance))?;
            }
            psi0 += FRAC_PI_2;
        }
        psi0 = wrap_upper(psi0, FRAC_PI_2, PI);

        for (leaf, value) in [
            (rvm.zeta(), zeta),
            (rvm.alpha(), alpha),
            (rvm.phi0(), phi0),
            (rvm.psi0(), psi0),
        ] {
            self.graph.set_param(leaf, 0, value)?;
        }
        Ok(())
    }

    /// Fit from every point of an `nalpha` by `nzeta` grid of starting geometries.
    ///
    /// `alpha_i = lower + i span / nalpha` and
    /// `zeta_j = lower + (j + 1/2) span / nzeta`; zeta is not guessed.
    /// Failed grid points are logged and skipped. The best solution is
    /// kept.
    pub fn search_2d(&mut self, nalpha: usize, nzeta: usize) -> Result<()> {
        let saved = self.guess_zeta;
        self.guess_zeta = false;
        let result = self.search(nalpha, nzeta);
        self.guess_zeta = saved;
        result
    }

    /// Fit from `nalpha` starting values of alpha, guessing zeta from each.
    pub fn search_1d(&mut self, nalpha: usize) -> Result<()> {
        let saved = self.guess_zeta;
        self.guess_zeta = true;
        let result = self.search(nalpha, 0);
        self.guess_zeta = saved;
        result
    }

    /// `nzeta == 0` leaves zeta to the guess.
    fn search(&mut self, nalpha: usize, nzeta: usize) -> Result<()> {
        if nalpha == 0 {
            return Err(MealError::invalid_param("ComplexRvmFit::search", "nalpha = 0"));
        }
        if self.stale {
            self.build_states()?;
        }

        let mut map = Array2::from_elem((nalpha, nzeta.max(1)), f64::NAN);
        let mut best: Option<(f64, usize, Array2<f64>, Vec<Parameter>)> = None;
        let (alpha_lower, alpha_upper) = self.alpha_range;
        let (zeta_lower, zeta_upper) = self.zeta_range;

        for i in 0..nalpha {
            let alpha = alpha_lower + i as f64 * (alpha_upper - alpha_lower) / nalpha as f64;
            for j in 0..nzeta.max(1) {
                self.set_magnetic_axis(Estimate::exact(alpha))?;
                if nzeta > 0 {
                    let zeta =
                        zeta_lower + (j as f64 + 0.5) * (zeta_upper - zeta_lower) / nzeta as f64;
                    self.set_line_of_sight(Estimate::exact(zeta))?;
                }

                match self.solve() {
                    Ok(()) => {
                        map[[i, j]] = self.chisq;
                        let better = best.as_ref().map_or(true, |(chisq, ..)| self.chisq < *chisq);
                        if better {
                            let snapshot = self.graph.snapshot(self.model.node())?;
                            let covariance = self.covariance.clone().unwrap_or_default();
                            best = Some((self.chisq, self.nfree, covariance, snapshot));
                        }
                    }
                    Err(err) => {
                        warn!(
                            "ComplexRvmFit::search alpha={} grid point ({}, {}) failed: {}",
                            alpha, i, j, err
                        );
                    }
                }
            }
        }

        let (chisq, nfree, covariance, snapshot) = best.ok_or_else(|| {
            MealError::invalid_state("ComplexRvmFit::search", "every grid point failed")
        })?;
        self.graph.restore(self.model.node(), &snapshot)?;
        self.chisq = chisq;
        self.nfree = nfree;
        self.covariance = Some(covariance);
        self.map = if self.chisq_map { Some(map) } else { None };
        info!(
            "ComplexRvmFit::search best chisq={} nfree={} alpha={} zeta={}",
            chisq,
            nfree,
            self.get_magnetic_axis()?.value,
            self.get_line_of_sight()?.value
        );
        Ok(())
    }
}

/// Wrap `x` into `(upper - period, upper]`.
fn wrap_upper(x: f64, upper: f64, period: f64) -> f64 {
    upper - (upper - x).rem_euclid(period)
}
