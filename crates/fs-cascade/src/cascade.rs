//! Countercurrent cascade of equilibrium stages solved as one problem.
//!
//! The iteration variable is the top-phase flow of every active chemical on
//! every stage. One iterate refreshes each stage's equilibrium data (K and
//! T, then B from the energy balances) from the current flows and solves
//! the component balances for new top flows.

use std::sync::Arc;

use fs_core::accelerate::{conditional_fixed_point, fixed_point};
use fs_core::measure_error;
use fs_core::units::constants::T_REF_K;
use fs_core::StreamId;
use fs_thermo::{Phase, PhasePair, PropertyPackage, StreamArena, StreamState, ThermoError};
use fs_units::common::check_streams;
use fs_units::{Unit, UnitResult};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::energy::{StageEnthalpies, phase_ratio_departures, temperature_departures};
use crate::error::{CascadeError, CascadeResult};
use crate::interpolate::{fill_missing, fill_missing_vectors, get_neighbors};
use crate::mass::{
    StageSplits, bottoms_stripping_factors, flatten, mass_balance, material_errors,
    outlet_totals, top_flow_rates, unflatten,
};
use crate::optimize::{LeastSquaresConfig, bounded_least_squares};
use crate::partition::{ChemicalRouting, PhasePartition};
use crate::specification::{CascadeAlgorithm, CascadeConfig};

/// A feed entering one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeFeed {
    pub stage: usize,
    pub state: StreamState,
}

/// Outcome of the last solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CascadeReport {
    pub iterations: usize,
    pub attempts: usize,
    pub mol_error: f64,
    pub rmol_error: f64,
    pub converged: bool,
    /// Sequential stage sweeps were needed.
    pub fallback: bool,
}

/// Streams connecting a cascade to a flowsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePorts {
    /// Inlets in the order of `CascadeConfig::feed_stages`.
    pub feeds: Vec<StreamId>,
    pub top: StreamId,
    pub bottom: StreamId,
    pub top_side_draws: Vec<(usize, StreamId)>,
    pub bottom_side_draws: Vec<(usize, StreamId)>,
}

pub struct MultiStageEquilibrium {
    pub(crate) name: String,
    pub(crate) config: CascadeConfig,
    pub(crate) thermo: Arc<dyn PropertyPackage>,
    pub(crate) routing: ChemicalRouting,
    pub(crate) splits: StageSplits,
    pub(crate) stages: Vec<PhasePartition>,
    pub(crate) feeds: Vec<CascadeFeed>,
    /// Feed flows per stage, all chemicals.
    pub(crate) feed: DMatrix<f64>,
    /// Vapor part of `feed`.
    pub(crate) top_feed: DMatrix<f64>,
    /// Feed enthalpy per stage [kJ/hr].
    pub(crate) feed_enthalpy: Vec<f64>,
    /// Flow-weighted feed temperature [K].
    pub(crate) feed_temperature: f64,
    pub(crate) top: DMatrix<f64>,
    pub(crate) bottom: DMatrix<f64>,
    pub(crate) iter: usize,
    cached: bool,
    report: CascadeReport,
    ports: Option<CascadePorts>,
    inlets: Vec<StreamId>,
    outlets: Vec<StreamId>,
}

impl std::fmt::Debug for MultiStageEquilibrium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStageEquilibrium")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .field("report", &self.report)
            .finish()
    }
}

fn row(m: &DMatrix<f64>, i: usize) -> Vec<f64> {
    m.row(i).iter().copied().collect()
}

impl MultiStageEquilibrium {
    pub fn new(
        name: impl Into<String>,
        config: CascadeConfig,
        thermo: Arc<dyn PropertyPackage>,
    ) -> CascadeResult<Self> {
        let m = thermo.chemicals().len();
        config.validate(m)?;
        let n = config.n_stages;
        let routing = if config.partition_data.is_some() {
            ChemicalRouting::all_active(m)
        } else {
            ChemicalRouting::from_chemicals(thermo.chemicals())
        };
        let stages = (0..n)
            .map(|i| {
                let stage = PhasePartition::new(config.phases, config.pressure, T_REF_K)
                    .with_specification(config.specifications.get(&i).copied());
                match &config.partition_data {
                    Some(data) => stage.with_fixed_k(data.stage(i).to_vec()),
                    None => stage,
                }
            })
            .collect();
        let (top_split, bottom_split) = config.splits();
        Ok(Self {
            name: name.into(),
            splits: StageSplits::new(top_split, bottom_split),
            routing,
            stages,
            feeds: Vec::new(),
            feed: DMatrix::zeros(n, m),
            top_feed: DMatrix::zeros(n, m),
            feed_enthalpy: vec![0.0; n],
            feed_temperature: T_REF_K,
            top: DMatrix::zeros(n, m),
            bottom: DMatrix::zeros(n, m),
            iter: 0,
            cached: false,
            report: CascadeReport::default(),
            ports: None,
            inlets: Vec::new(),
            outlets: Vec::new(),
            config,
            thermo,
        })
    }

    /// Connect the cascade to flowsheet streams so it can run as a unit.
    pub fn with_ports(mut self, ports: CascadePorts) -> CascadeResult<Self> {
        for (k, _) in ports.feeds.iter().enumerate() {
            self.config.feed_stage(k)?;
        }
        let draws_match = ports.top_side_draws.iter().map(|(i, _)| *i).eq(self.config.top_side_draws.keys().copied())
            && ports.bottom_side_draws.iter().map(|(i, _)| *i).eq(self.config.bottom_side_draws.keys().copied());
        if !draws_match {
            return Err(CascadeError::InvalidConfig {
                what: "side-draw streams must match the configured side draws in stage order",
            });
        }
        self.inlets = ports.feeds.clone();
        self.outlets = [ports.top, ports.bottom]
            .into_iter()
            .chain(ports.top_side_draws.iter().map(|(_, id)| *id))
            .chain(ports.bottom_side_draws.iter().map(|(_, id)| *id))
            .collect();
        self.ports = Some(ports);
        Ok(self)
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[PhasePartition] {
        &self.stages
    }

    pub fn report(&self) -> CascadeReport {
        self.report
    }

    /// Top-phase flows leaving each stage (stages by row).
    pub fn top_flows(&self) -> &DMatrix<f64> {
        &self.top
    }

    pub fn bottom_flows(&self) -> &DMatrix<f64> {
        &self.bottom
    }

    pub fn stage_temperatures(&self) -> Vec<f64> {
        self.stages.iter().map(|s| s.t).collect()
    }

    pub fn phase_ratios(&self) -> Vec<f64> {
        self.stages.iter().map(|s| s.phase_ratio()).collect()
    }

    pub fn top_product(&self) -> Vec<f64> {
        row(&self.top, 0)
    }

    pub fn bottom_product(&self) -> Vec<f64> {
        row(&self.bottom, self.n_stages() - 1)
    }

    pub fn top_side_draw(&self, stage: usize) -> Vec<f64> {
        let s = self.splits.top[stage];
        self.top.row(stage).iter().map(|v| v * s).collect()
    }

    pub fn bottom_side_draw(&self, stage: usize) -> Vec<f64> {
        let s = self.splits.bottom[stage];
        self.bottom.row(stage).iter().map(|v| v * s).collect()
    }

    /// Component balance residual of every stage, `in - out`.
    pub fn material_errors(&self) -> DMatrix<f64> {
        material_errors(&self.top, &self.bottom, &self.feed, &self.splits)
    }

    /// Forget the previous solution; the next solve starts from a hot start.
    pub fn reset_cache(&mut self) {
        self.cached = false;
    }

    /// Converge the cascade for `feeds`.
    ///
    /// With `use_cache` the previous solution is the starting point; if
    /// that fails the solve is repeated once from a hot start.
    pub fn solve(&mut self, feeds: &[CascadeFeed]) -> CascadeResult<CascadeReport> {
        self.load_feeds(feeds)?;
        let warm = self.config.use_cache && self.cached;
        match self.solve_once(warm) {
            Err(error) if warm => {
                warn!(cascade = %self.name, %error, "cascade failed from cached state, retrying from hot start");
                self.cached = false;
                self.solve_once(false)
            }
            result => result,
        }
    }

    fn load_feeds(&mut self, feeds: &[CascadeFeed]) -> CascadeResult<()> {
        let (n, m) = self.feed.shape();
        let mut feed = DMatrix::zeros(n, m);
        let mut top_feed = DMatrix::zeros(n, m);
        let mut enthalpy = vec![0.0; n];
        let (mut flow_t, mut total) = (0.0, 0.0);
        for f in feeds {
            if f.stage >= n {
                return Err(CascadeError::InvalidConfig {
                    what: "feed stage out of range",
                });
            }
            if f.state.mol.len() != m {
                return Err(ThermoError::ComponentCount {
                    expected: m,
                    got: f.state.mol.len(),
                }
                .into());
            }
            let flow = f.state.total_flow();
            if flow <= 0.0 {
                continue;
            }
            for (j, v) in f.state.mol.iter().enumerate() {
                feed[(f.stage, j)] += v;
                if f.state.phase == Phase::Gas {
                    top_feed[(f.stage, j)] += v;
                }
            }
            enthalpy[f.stage] +=
                self.thermo
                    .enthalpy(&f.state.mol, f.state.phase, f.state.t, f.state.p)?;
            flow_t += flow * f.state.t;
            total += flow;
        }
        self.feed = feed;
        self.top_feed = top_feed;
        self.feed_enthalpy = enthalpy;
        self.feed_temperature = if total > 0.0 { flow_t / total } else { T_REF_K };
        self.feeds = feeds.to_vec();
        Ok(())
    }

    fn solve_once(&mut self, warm: bool) -> CascadeResult<CascadeReport> {
        self.report = CascadeReport::default();
        if self.feed.sum() <= 0.0 {
            self.top.fill(0.0);
            self.bottom.fill(0.0);
            self.report.converged = true;
            return Ok(self.report);
        }
        if !warm {
            self.hot_start()?;
        }
        if self.active_feed().sum() <= 0.0 {
            self.report.converged = true;
        } else {
            let x0 = self.top_flat();
            let x = match self.config.algorithm {
                CascadeAlgorithm::Root => self.run_root(x0)?,
                CascadeAlgorithm::Optimize => self.run_optimize(x0)?,
            };
            self.set_flow_rates(&x);
        }
        self.correct_overall_mass_balance();
        self.cached = true;
        let report = self.report;
        if report.converged {
            info!(
                cascade = %self.name,
                iterations = report.iterations,
                attempts = report.attempts,
                "cascade converged"
            );
        } else if self.config.strict {
            return Err(CascadeError::ConvergenceFailed {
                name: self.name.clone(),
                attempts: report.attempts,
                mol_error: report.mol_error,
                rmol_error: report.rmol_error,
            });
        } else {
            warn!(
                cascade = %self.name,
                mol_error = report.mol_error,
                rmol_error = report.rmol_error,
                "cascade did not converge, keeping last iterate"
            );
        }
        Ok(report)
    }

    fn run_root(&mut self, x0: Vec<f64>) -> CascadeResult<Vec<f64>> {
        let mut x = x0;
        for attempt in 0..self.config.max_attempts {
            self.report.attempts = attempt + 1;
            self.iter = 0;
            x = conditional_fixed_point(|x| self.conditional_iter(x), x)?;
            if self.report.converged {
                return Ok(x);
            }
            debug!(cascade = %self.name, attempt, "falling back to sequential stage sweeps");
            self.report.fallback = true;
            self.iter = 0;
            x = conditional_fixed_point(|x| self.sequential_iter(x), x)?;
            if self.report.converged {
                return Ok(x);
            }
        }
        Ok(x)
    }

    /// Least squares on the fixed-point residual, finished by the root
    /// strategy from wherever it stops.
    fn run_optimize(&mut self, x0: Vec<f64>) -> CascadeResult<Vec<f64>> {
        let config = LeastSquaresConfig {
            max_iterations: self.config.maxiter,
            abs_tol: self.config.molar_tolerance,
            ..LeastSquaresConfig::default()
        };
        let result = bounded_least_squares(
            DVector::from_vec(x0),
            |x: &DVector<f64>| -> CascadeResult<DVector<f64>> {
                let new = self.iterate(x.as_slice())?;
                Ok(DVector::from_vec(new) - x)
            },
            &config,
        )?;
        debug!(
            cascade = %self.name,
            iterations = result.iterations,
            residual = result.residual_max,
            "least squares finished"
        );
        self.run_root(result.x.as_slice().to_vec())
    }

    fn conditional_iter(&mut self, x: &[f64]) -> CascadeResult<(Vec<f64>, bool)> {
        let new = self.iterate(x)?;
        Ok(self.check_convergence(x, new, self.config.maxiter))
    }

    fn sequential_iter(&mut self, x: &[f64]) -> CascadeResult<(Vec<f64>, bool)> {
        self.set_flow_rates(x);
        let n = self.n_stages();
        for i in (0..n).chain((0..n).rev()) {
            self.run_stage(i)?;
        }
        let new = self.top_flat();
        Ok(self.check_convergence(x, new, self.config.fallback_maxiter))
    }

    fn check_convergence(&mut self, old: &[f64], new: Vec<f64>, maxiter: usize) -> (Vec<f64>, bool) {
        self.iter += 1;
        self.report.iterations += 1;
        let error = measure_error(old, &new);
        self.report.mol_error = error.abs;
        self.report.rmol_error = error.rel;
        self.report.converged =
            error.all_within(self.config.molar_tolerance, self.config.relative_molar_tolerance);
        debug!(
            cascade = %self.name,
            iter = self.iter,
            mol_error = error.abs,
            rmol_error = error.rel,
            "cascade iteration"
        );
        let keep_going = !self.report.converged && self.iter < maxiter;
        (new, keep_going)
    }

    /// Full equilibrium of stage `i` with its neighbours' current outlets.
    fn run_stage(&mut self, i: usize) -> CascadeResult<()> {
        let n = self.n_stages();
        let p = self.config.pressure;
        let mut inlet = row(&self.feed, i);
        let mut h = self.feed_enthalpy[i];
        if i + 1 < n {
            let s = self.splits.asplit_left[i + 1];
            let flows: Vec<f64> = self.top.row(i + 1).iter().map(|v| v * s).collect();
            h += self
                .thermo
                .enthalpy(&flows, self.config.phases.top(), self.stages[i + 1].t, p)?;
            inlet.iter_mut().zip(&flows).for_each(|(a, b)| *a += b);
        }
        if i > 0 {
            let s = self.splits.bsplit_left[i - 1];
            let flows: Vec<f64> = self.bottom.row(i - 1).iter().map(|v| v * s).collect();
            h += self
                .thermo
                .enthalpy(&flows, self.config.phases.bottom(), self.stages[i - 1].t, p)?;
            inlet.iter_mut().zip(&flows).for_each(|(a, b)| *a += b);
        }
        let (top, bottom) =
            self.stages[i].equilibrium(self.thermo.as_ref(), &self.routing, &inlet, h)?;
        for j in 0..top.len() {
            self.top[(i, j)] = top[j];
            self.bottom[(i, j)] = bottom[j];
        }
        Ok(())
    }

    /// One outer iteration: new top flows from the equilibrium implied by `x`.
    pub(crate) fn iterate(&mut self, x: &[f64]) -> CascadeResult<Vec<f64>> {
        self.set_flow_rates(x);
        let fixed_k = self.config.partition_data.is_some();
        match (self.config.phases, fixed_k) {
            (PhasePair::Vle, false) => {
                let mut defined = vec![false; self.n_stages()];
                for (i, d) in defined.iter_mut().enumerate() {
                    let (top, bottom) = (row(&self.top, i), row(&self.bottom, i));
                    *d = self.stages[i].update_vle_kt(
                        self.thermo.as_ref(),
                        &self.routing,
                        &top,
                        &bottom,
                    )?;
                }
                self.interpolate_missing(&defined)?;
                self.update_energy_balance_phase_ratios()?;
                if self.config.inside_out && self.n_stages() >= 3 {
                    self.run_mass_balance();
                    self.solve_inside_loop()?;
                }
            }
            (PhasePair::Vle, true) => self.update_phase_ratios()?,
            (PhasePair::Lle, false) => {
                let xtol = 1e-9 * self.feed.max();
                let x0 = self.top_flat();
                let x = fixed_point(
                    |x: &[f64]| -> CascadeResult<Vec<f64>> {
                        self.set_flow_rates(x);
                        self.update_lle_k()?;
                        Ok(self.run_mass_balance())
                    },
                    x0,
                    xtol,
                    10,
                )?;
                self.set_flow_rates(&x);
                self.update_phase_ratios()?;
                self.update_energy_balance_temperatures()?;
            }
            (PhasePair::Lle, true) => {
                self.update_phase_ratios()?;
                self.update_energy_balance_temperatures()?;
            }
        }
        self.check_equilibrium()?;
        Ok(self.run_mass_balance())
    }

    fn update_lle_k(&mut self) -> CascadeResult<()> {
        let mut defined = vec![false; self.n_stages()];
        for (i, d) in defined.iter_mut().enumerate() {
            let (top, bottom) = (row(&self.top, i), row(&self.bottom, i));
            *d = self.stages[i].update_lle_k(self.thermo.as_ref(), &self.routing, &top, &bottom)?;
        }
        self.interpolate_missing(&defined)
    }

    fn update_phase_ratios(&mut self) -> CascadeResult<()> {
        for i in 0..self.n_stages() {
            let (top, bottom) = (row(&self.top, i), row(&self.bottom, i));
            self.stages[i].update_b(&self.routing, &top, &bottom)?;
        }
        Ok(())
    }

    /// Fill K and T of empty stages from their neighbours.
    fn interpolate_missing(&mut self, defined: &[bool]) -> CascadeResult<()> {
        if !defined.iter().any(|d| *d) {
            return Err(CascadeError::NoPhaseEquilibrium);
        }
        if defined.iter().all(|d| *d) {
            return Ok(());
        }
        let neighbors = get_neighbors(defined);
        let mut k: Vec<Vec<f64>> = self.stages.iter().map(|s| s.k.clone()).collect();
        let mut t: Vec<f64> = self.stages.iter().map(|s| s.t).collect();
        fill_missing_vectors(&neighbors, &mut k);
        fill_missing(&neighbors, &mut t);
        for ((stage, k), t) in self.stages.iter_mut().zip(k).zip(t) {
            stage.k = k;
            if stage.t_spec.is_none() {
                stage.t = t;
            }
        }
        Ok(())
    }

    /// Molar phase enthalpies and flows of every stage for the energy
    /// balances. Stages without flow take their neighbours' enthalpies.
    pub(crate) fn stage_enthalpies(&self) -> CascadeResult<StageEnthalpies> {
        let n = self.n_stages();
        let mut data = StageEnthalpies {
            l: vec![0.0; n],
            v: vec![0.0; n],
            hl: vec![f64::NAN; n],
            hv: vec![f64::NAN; n],
            h_in: vec![0.0; n],
        };
        for i in 0..n {
            let (top, bottom) = (row(&self.top, i), row(&self.bottom, i));
            data.l[i] = bottom.iter().sum();
            data.v[i] = top.iter().sum();
            let (hl, hv) = self.stages[i].molar_enthalpies(self.thermo.as_ref(), &top, &bottom)?;
            data.hl[i] = hl.unwrap_or(f64::NAN);
            data.hv[i] = hv.unwrap_or(f64::NAN);
            data.h_in[i] = self.feed_enthalpy[i] + self.stages[i].duty;
        }
        let defined: Vec<bool> = data.hl.iter().map(|h| h.is_finite()).collect();
        let neighbors = get_neighbors(&defined);
        fill_missing(&neighbors, &mut data.hl);
        fill_missing(&neighbors, &mut data.hv);
        for h in data.hl.iter_mut().chain(data.hv.iter_mut()) {
            if h.is_nan() {
                *h = 0.0;
            }
        }
        Ok(data)
    }

    fn update_energy_balance_phase_ratios(&mut self) -> CascadeResult<()> {
        let data = self.stage_enthalpies()?;
        let specified: Vec<bool> = self.stages.iter().map(|s| s.specified()).collect();
        let db = phase_ratio_departures(&data, &self.splits, &specified);
        for (stage, d) in self.stages.iter_mut().zip(db) {
            if stage.specified() {
                continue;
            }
            let b = stage.b + d;
            if !b.is_nan() {
                stage.b = b.max(0.0);
            }
        }
        Ok(())
    }

    fn update_energy_balance_temperatures(&mut self) -> CascadeResult<()> {
        let n = self.n_stages();
        let p = self.config.pressure;
        let (top_phase, bottom_phase) = (self.config.phases.top(), self.config.phases.bottom());
        let (mut hl, mut hv) = (vec![0.0; n], vec![0.0; n]);
        let (mut cl, mut cv) = (vec![0.0; n], vec![0.0; n]);
        let mut held = vec![false; n];
        for i in 0..n {
            let (top, bottom) = (row(&self.top, i), row(&self.bottom, i));
            let t = self.stages[i].t;
            hl[i] = self.thermo.enthalpy(&bottom, bottom_phase, t, p)?;
            hv[i] = self.thermo.enthalpy(&top, top_phase, t, p)?;
            cl[i] = self.thermo.heat_capacity(&bottom, bottom_phase, t, p)?;
            cv[i] = self.thermo.heat_capacity(&top, top_phase, t, p)?;
            held[i] = self.stages[i].t_spec.is_some() || !(cl[i] + cv[i] > 0.0);
        }
        let h_in = (0..n)
            .map(|i| self.feed_enthalpy[i] + self.stages[i].duty)
            .collect();
        let data = StageEnthalpies::from_totals(hl, hv, h_in);
        let dt = temperature_departures(&cv, &cl, &data, &self.splits, &held);
        for (stage, dt) in self.stages.iter_mut().zip(dt) {
            if stage.t_spec.is_some() {
                continue;
            }
            let t = stage.t + dt;
            if !(t > 0.0) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "stage temperature",
                    value: t,
                });
            }
            stage.t = t;
        }
        Ok(())
    }

    fn check_equilibrium(&self) -> CascadeResult<()> {
        for stage in &self.stages {
            if let Some(k) = stage.k.iter().find(|k| !(**k > 0.0 && k.is_finite())) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "partition coefficient",
                    value: *k,
                });
            }
            if !(stage.t > 0.0 && stage.t.is_finite()) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "stage temperature",
                    value: stage.t,
                });
            }
            if !(stage.b >= 0.0) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "phase ratio",
                    value: stage.b,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn k_matrix(&self) -> DMatrix<f64> {
        let na = self.routing.n_active();
        DMatrix::from_fn(self.n_stages(), na, |i, j| {
            self.stages[i].k.get(j).copied().unwrap_or(1.0)
        })
    }

    pub(crate) fn active_feed(&self) -> DMatrix<f64> {
        self.feed.select_columns(&self.routing.active)
    }

    pub(crate) fn active_top(&self) -> DMatrix<f64> {
        self.top.select_columns(&self.routing.active)
    }

    pub(crate) fn active_bottom(&self) -> DMatrix<f64> {
        self.bottom.select_columns(&self.routing.active)
    }

    /// Feed summed over stages, all chemicals.
    pub(crate) fn total_feed(&self) -> Vec<f64> {
        self.feed.row_sum().iter().copied().collect()
    }

    fn write_active(&mut self, top: &DMatrix<f64>, bottom: &DMatrix<f64>) {
        for (n, &j) in self.routing.active.iter().enumerate() {
            self.top.set_column(j, &top.column(n));
            self.bottom.set_column(j, &bottom.column(n));
        }
    }

    pub(crate) fn top_flat(&self) -> Vec<f64> {
        flatten(&self.active_top())
    }

    /// Take `x` as the active top flows, clipping negatives, and derive
    /// bottom flows from the component balances.
    pub(crate) fn set_flow_rates(&mut self, x: &[f64]) {
        let mut top = unflatten(self.n_stages(), self.routing.n_active(), x);
        top.apply(|v| *v = v.max(0.0));
        let feed = self.active_feed();
        let mut correct = vec![true; self.n_stages()];
        let bottom = mass_balance(&mut top, &feed, &self.splits, &mut correct);
        self.write_active(&top, &bottom);
    }

    /// Solve the component balances at the current K and B.
    pub(crate) fn run_mass_balance(&mut self) -> Vec<f64> {
        let b = self.phase_ratios();
        let (s, safe) = bottoms_stripping_factors(&b, &self.k_matrix());
        let feed = self.active_feed();
        let mut top = top_flow_rates(&s, &feed, &self.splits, safe);
        let mut correct = vec![true; self.n_stages()];
        let bottom = mass_balance(&mut top, &feed, &self.splits, &mut correct);
        self.write_active(&top, &bottom);
        flatten(&top)
    }

    /// Scale outlet flows per chemical so the cascade as a whole conserves
    /// every chemical exactly.
    fn correct_overall_mass_balance(&mut self) {
        let fed = self.total_feed();
        let out = outlet_totals(&self.top, &self.bottom, &self.splits);
        for (j, (f, o)) in fed.iter().zip(&out).enumerate() {
            if *o > 0.0 {
                let factor = f / o;
                self.top.column_mut(j).scale_mut(factor);
                self.bottom.column_mut(j).scale_mut(factor);
            }
        }
    }

    /// Partition coefficients (stage-major), temperatures for liquid-liquid
    /// cascades, and phase ratios.
    pub fn get_ktbs(&self) -> Vec<f64> {
        let mut x = flatten(&self.k_matrix());
        if self.config.phases == PhasePair::Lle {
            x.extend(self.stages.iter().map(|s| s.t));
        }
        x.extend(self.phase_ratios());
        x
    }

    /// Impose K, T and B from a vector laid out like [`get_ktbs`](Self::get_ktbs)
    /// and update the flows accordingly. Specified values are kept.
    pub fn set_ktbs(&mut self, x: &[f64]) -> CascadeResult<()> {
        let (n, na) = (self.n_stages(), self.routing.n_active());
        let lle = self.config.phases == PhasePair::Lle;
        let expected = n * na + n + if lle { n } else { 0 };
        if x.len() != expected {
            return Err(CascadeError::InvalidConfig {
                what: "K/T/B vector length does not match the cascade",
            });
        }
        let (k, rest) = x.split_at(n * na);
        let (t, b) = if lle { rest.split_at(n) } else { (&rest[..0], rest) };
        if let Some(v) = k.iter().find(|v| !(**v > 0.0 && v.is_finite())) {
            return Err(CascadeError::InfeasibleEquilibrium {
                what: "partition coefficient",
                value: *v,
            });
        }
        if let Some(v) = t.iter().find(|v| !(**v > 0.0 && v.is_finite())) {
            return Err(CascadeError::InfeasibleEquilibrium {
                what: "stage temperature",
                value: *v,
            });
        }
        for (stage, v) in self.stages.iter().zip(b) {
            if stage.b_spec.is_none() && !(*v > 0.0 && v.is_finite()) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "phase ratio",
                    value: *v,
                });
            }
        }
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.k = k[i * na..(i + 1) * na].to_vec();
            if lle && stage.t_spec.is_none() {
                stage.t = t[i];
            }
            if stage.b_spec.is_none() {
                stage.b = b[i];
            }
        }
        self.run_mass_balance();
        Ok(())
    }

    fn write_outlets(&self, streams: &mut StreamArena) -> CascadeResult<()> {
        let Some(ports) = &self.ports else {
            return Ok(());
        };
        let n = self.n_stages();
        let p = self.config.pressure;
        let (top_phase, bottom_phase) = (self.config.phases.top(), self.config.phases.bottom());
        let mut write = |id: StreamId, mol: Vec<f64>, t: f64, phase: Phase| -> CascadeResult<()> {
            streams.set_flows(id, &mol)?;
            let s = &mut streams[id];
            s.t = t;
            s.p = p;
            s.phase = phase;
            Ok(())
        };
        write(ports.top, self.top_product(), self.stages[0].t, top_phase)?;
        write(ports.bottom, self.bottom_product(), self.stages[n - 1].t, bottom_phase)?;
        for (stage, id) in &ports.top_side_draws {
            write(*id, self.top_side_draw(*stage), self.stages[*stage].t, top_phase)?;
        }
        for (stage, id) in &ports.bottom_side_draws {
            write(*id, self.bottom_side_draw(*stage), self.stages[*stage].t, bottom_phase)?;
        }
        Ok(())
    }

    fn run_connected(&mut self, streams: &mut StreamArena) -> CascadeResult<()> {
        if self.ports.is_none() {
            return Err(CascadeError::InvalidConfig {
                what: "cascade has no stream connections",
            });
        }
        check_streams(&self.name, streams, &self.inlets)?;
        check_streams(&self.name, streams, &self.outlets)?;
        let feeds = self
            .inlets
            .iter()
            .enumerate()
            .map(|(k, id)| {
                Ok(CascadeFeed {
                    stage: self.config.feed_stage(k)?,
                    state: streams[*id].clone(),
                })
            })
            .collect::<CascadeResult<Vec<_>>>()?;
        self.solve(&feeds)?;
        self.write_outlets(streams)
    }
}

impl Unit for MultiStageEquilibrium {
    fn name(&self) -> &str {
        &self.name
    }

    fn inlets(&self) -> &[StreamId] {
        &self.inlets
    }

    fn outlets(&self) -> &[StreamId] {
        &self.outlets
    }

    fn run(&mut self, streams: &mut StreamArena) -> UnitResult<()> {
        let name = self.name.clone();
        self.run_connected(streams)
            .map_err(|e| e.into_unit_error(&name))
    }

    fn reset_cache(&mut self) {
        MultiStageEquilibrium::reset_cache(self);
    }
}
