//! Per-run convergence state.

use fs_core::ErrorMeasure;

/// Iteration counter and last errors of one convergence run.
///
/// Created fresh for every converge call so repeated runs never share
/// counters.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceContext {
    pub iter: usize,
    pub mol: ErrorMeasure,
    pub t: ErrorMeasure,
    pub converged: bool,
}

impl ConvergenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, mol: ErrorMeasure, t: ErrorMeasure, converged: bool) {
        self.iter += 1;
        self.mol = mol;
        self.t = t;
        self.converged = converged;
    }

    pub fn report(&self) -> ConvergenceReport {
        ConvergenceReport {
            iterations: self.iter,
            mol_error: self.mol.abs,
            rmol_error: self.mol.rel,
            t_error: self.t.abs,
            rt_error: self.t.rel,
            converged: self.converged,
        }
    }
}

/// Outcome of a converge call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvergenceReport {
    pub iterations: usize,
    /// [kmol/hr]
    pub mol_error: f64,
    pub rmol_error: f64,
    /// [K]
    pub t_error: f64,
    pub rt_error: f64,
    pub converged: bool,
}

impl ConvergenceReport {
    /// Report of a path run without a recycle.
    pub fn once(iterations: usize) -> Self {
        Self {
            iterations,
            converged: true,
            ..Self::default()
        }
    }
}
