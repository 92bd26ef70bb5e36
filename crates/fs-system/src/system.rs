//! Recycle convergence over an ordered path of units, nested systems and
//! hooks.

use std::collections::HashSet;

use fs_core::{StreamId, UnitId, clip_infeasible, measure_error};
use fs_flowsheet::Flowsheet;
use tracing::{debug, info, warn};

use crate::config::{ConvergenceConfig, ConvergenceMethod};
use crate::context::{ConvergenceContext, ConvergenceReport};
use crate::error::{SystemError, SystemResult};
use crate::path::{PathElement, SpecificationHook};
use crate::recycle::Recycle;

/// How units are evaluated while replaying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Full,
    /// Units' cheaper steady evaluation, used by stabilized convergence.
    Steady,
}

/// A convergence node: a path replayed until its tear streams stop
/// changing.
///
/// Systems never own streams or units. Every operation takes the
/// [`Flowsheet`] holding them, and path elements refer to units by id.
pub struct System {
    id: String,
    path: Vec<PathElement>,
    recycle: Recycle,
    facilities: Vec<PathElement>,
    facility_loop: Option<Box<System>>,
    config: ConvergenceConfig,
    n_runs: Option<usize>,
    specification: Option<SpecificationHook>,
    last_report: Option<ConvergenceReport>,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("recycle", &self.recycle)
            .field("facilities", &self.facilities)
            .field("n_runs", &self.n_runs)
            .finish()
    }
}

impl System {
    pub fn new(id: impl Into<String>, path: Vec<PathElement>) -> Self {
        Self {
            id: id.into(),
            path,
            recycle: Recycle::default(),
            facilities: Vec::new(),
            facility_loop: None,
            config: ConvergenceConfig::default(),
            n_runs: None,
            specification: None,
            last_report: None,
        }
    }

    pub fn with_recycle(mut self, streams: Vec<StreamId>) -> Self {
        self.set_recycle(streams);
        self
    }

    pub fn with_config(mut self, config: ConvergenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_facilities(mut self, facilities: Vec<PathElement>) -> Self {
        self.facilities = facilities;
        self
    }

    /// System converged after the facilities, for recycles among them.
    pub fn with_facility_loop(mut self, facility_loop: System) -> Self {
        self.facility_loop = Some(Box::new(facility_loop));
        self
    }

    pub fn with_n_runs(mut self, n_runs: usize) -> Self {
        self.set_n_runs(Some(n_runs));
        self
    }

    pub fn with_specification<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut System, &mut Flowsheet) -> SystemResult<()> + Send + 'static,
    {
        self.specification = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    pub fn facilities(&self) -> &[PathElement] {
        &self.facilities
    }

    pub fn facility_loop(&self) -> Option<&System> {
        self.facility_loop.as_deref()
    }

    pub fn recycle(&self) -> &[StreamId] {
        self.recycle.streams()
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConvergenceConfig {
        &mut self.config
    }

    pub fn n_runs(&self) -> Option<usize> {
        self.n_runs
    }

    /// Report of the last converge call, if any.
    pub fn last_report(&self) -> Option<ConvergenceReport> {
        self.last_report
    }

    pub fn has_specification(&self) -> bool {
        self.specification.is_some()
    }

    /// Setting a recycle drops any fixed number of runs.
    pub fn set_recycle(&mut self, streams: Vec<StreamId>) {
        if !streams.is_empty() {
            self.n_runs = None;
        }
        self.recycle = Recycle::new(streams);
    }

    /// Replay the path `n` times instead of converging; drops the recycle.
    pub fn set_n_runs(&mut self, n_runs: Option<usize>) {
        if n_runs.is_some() {
            self.recycle = Recycle::default();
        }
        self.n_runs = n_runs;
    }

    pub fn set_specification(&mut self, hook: Option<SpecificationHook>) {
        self.specification = hook;
    }

    pub fn set_method(&mut self, method: &str) -> SystemResult<()> {
        self.config.method = method.parse::<ConvergenceMethod>()?;
        Ok(())
    }

    /// Update the given tolerances, optionally for every nested system too.
    pub fn set_tolerance(
        &mut self,
        mol: Option<f64>,
        rmol: Option<f64>,
        t: Option<f64>,
        rt: Option<f64>,
        subsystems: bool,
        maxiter: Option<usize>,
    ) {
        let c = &mut self.config;
        if let Some(v) = mol {
            c.molar_tolerance = v;
        }
        if let Some(v) = rmol {
            c.relative_molar_tolerance = v;
        }
        if let Some(v) = t {
            c.temperature_tolerance = v;
        }
        if let Some(v) = rt {
            c.relative_temperature_tolerance = v;
        }
        if let Some(v) = maxiter {
            c.maxiter = v;
        }
        if subsystems {
            for system in self.subsystems_mut() {
                system.set_tolerance(mol, rmol, t, rt, subsystems, maxiter);
            }
        }
    }

    /// Enable stabilized convergence. A system without a recycle hands the
    /// setting down to its subsystems; one with a recycle keeps it for
    /// itself and turns it off below.
    pub fn set_stabilized(&mut self, stabilized: bool) {
        let inherit = stabilized && self.recycle.is_empty();
        for system in self.subsystems_mut() {
            system.set_stabilized(inherit);
        }
        self.config.stabilized = stabilized;
    }

    /// Systems directly nested in the path.
    pub fn subsystems(&self) -> Vec<&System> {
        self.path
            .iter()
            .filter_map(|e| match e {
                PathElement::System(s) => Some(s.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn subsystems_mut(&mut self) -> impl Iterator<Item = &mut System> {
        self.path.iter_mut().filter_map(|e| match e {
            PathElement::System(s) => Some(s.as_mut()),
            _ => None,
        })
    }

    /// Every unit reached by the path (nested systems included), then the
    /// facilities, each listed once.
    pub fn units(&self) -> Vec<UnitId> {
        let mut out = Vec::new();
        self.collect_units(&mut out);
        out
    }

    fn collect_units(&self, out: &mut Vec<UnitId>) {
        for element in self.path.iter().chain(&self.facilities) {
            match element {
                PathElement::Unit(id) if !out.contains(id) => out.push(*id),
                PathElement::System(system) => system.collect_units(out),
                _ => {}
            }
        }
    }

    /// Tear streams of this system and all nested ones.
    pub fn get_all_recycles(&self) -> Vec<StreamId> {
        let mut out = self.recycle.streams().to_vec();
        for system in self.subsystems() {
            out.extend(system.get_all_recycles());
        }
        out
    }

    pub fn feeds(&self, flowsheet: &Flowsheet) -> Vec<StreamId> {
        flowsheet.feeds_of(&self.units())
    }

    pub fn products(&self, flowsheet: &Flowsheet) -> Vec<StreamId> {
        flowsheet.products_of(&self.units())
    }

    /// Per-component flow entering the system [kmol/hr].
    pub fn get_inlet_flow(&self, flowsheet: &Flowsheet) -> Vec<f64> {
        flowsheet.streams().total_flows(&self.feeds(flowsheet))
    }

    /// Per-component flow leaving the system [kmol/hr].
    pub fn get_outlet_flow(&self, flowsheet: &Flowsheet) -> Vec<f64> {
        flowsheet.streams().total_flows(&self.products(flowsheet))
    }

    /// Zero every tear stream, recursively.
    pub fn empty_recycles(&mut self, flowsheet: &mut Flowsheet) {
        self.last_report = None;
        self.recycle.empty(flowsheet.streams_mut());
        for system in self.subsystems_mut() {
            system.empty_recycles(flowsheet);
        }
    }

    /// Zero every stream written by a unit of the system.
    pub fn empty_outlet_streams(&mut self, flowsheet: &mut Flowsheet) {
        self.last_report = None;
        let outlets: Vec<StreamId> = self
            .units()
            .into_iter()
            .filter_map(|id| flowsheet.unit(id))
            .flat_map(|unit| unit.outlets().to_vec())
            .collect();
        let streams = flowsheet.streams_mut();
        for id in outlets {
            if streams.contains(id) {
                streams[id].empty();
            }
        }
    }

    pub fn reset_cache(&self, flowsheet: &mut Flowsheet) {
        for id in self.units() {
            if let Some(unit) = flowsheet.unit_mut(id) {
                unit.reset_cache();
            }
        }
    }

    /// Set up every unit, converge the path, summarize, then converge the
    /// facility loop.
    pub fn simulate(&mut self, flowsheet: &mut Flowsheet) -> SystemResult<ConvergenceReport> {
        self.check(flowsheet)?;
        for id in self.units() {
            flowsheet.setup_unit(id)?;
        }
        let report = self.converge(flowsheet)?;
        self.summary(flowsheet)?;
        if let Some(facility_loop) = self.facility_loop.as_mut() {
            facility_loop.converge(flowsheet)?;
        }
        info!(
            system = %self.id,
            iterations = report.iterations,
            converged = report.converged,
            "system simulated"
        );
        Ok(report)
    }

    fn check(&self, flowsheet: &Flowsheet) -> SystemResult<()> {
        self.config.validate()?;
        if self
            .recycle
            .streams()
            .iter()
            .any(|id| !flowsheet.streams().contains(*id))
        {
            return Err(SystemError::InvalidConfig {
                what: "recycle refers to a stream outside the flowsheet",
            });
        }
        let nested = self
            .path
            .iter()
            .chain(&self.facilities)
            .filter_map(|e| match e {
                PathElement::System(s) => Some(s.as_ref()),
                _ => None,
            })
            .chain(self.facility_loop.as_deref());
        for system in nested {
            system.check(flowsheet)?;
        }
        Ok(())
    }

    /// Converge the path: replay it `n_runs` times, iterate the recycle to
    /// tolerance, or run it once when there is neither.
    pub fn converge(&mut self, flowsheet: &mut Flowsheet) -> SystemResult<ConvergenceReport> {
        self.converge_with(flowsheet, RunMode::Full)
    }

    fn converge_with(
        &mut self,
        flowsheet: &mut Flowsheet,
        mode: RunMode,
    ) -> SystemResult<ConvergenceReport> {
        let report = if let Some(n) = self.n_runs {
            for _ in 0..n {
                self.run_path(flowsheet, mode)?;
            }
            ConvergenceReport::once(n)
        } else if !self.recycle.is_empty() {
            self.solve(flowsheet, mode)?
        } else {
            self.run_path(flowsheet, mode)?;
            ConvergenceReport::once(1)
        };
        self.last_report = Some(report);
        Ok(report)
    }

    /// Step taken when a parent path reaches this system.
    fn converge_in_path(&mut self, flowsheet: &mut Flowsheet, mode: RunMode) -> SystemResult<()> {
        match self.specification.take() {
            Some(mut hook) => {
                let result = hook(self, flowsheet);
                self.specification = Some(hook);
                result
            }
            None => self.converge_with(flowsheet, mode).map(|_| ()),
        }
    }

    fn run_path(&mut self, flowsheet: &mut Flowsheet, mode: RunMode) -> SystemResult<()> {
        for element in &mut self.path {
            match element {
                PathElement::Unit(id) => match mode {
                    RunMode::Full => flowsheet.run_unit(*id)?,
                    RunMode::Steady => flowsheet.steady_run_unit(*id)?,
                },
                PathElement::System(system) => system.converge_in_path(flowsheet, mode)?,
                PathElement::Hook(hook) => hook(flowsheet)?,
            }
        }
        Ok(())
    }

    fn has_steady_units(&self, flowsheet: &Flowsheet) -> bool {
        self.units()
            .into_iter()
            .any(|id| flowsheet.unit(id).is_some_and(|u| u.has_steady_run()))
    }

    fn solve(&mut self, flowsheet: &mut Flowsheet, mode: RunMode) -> SystemResult<ConvergenceReport> {
        let mut ctx = ConvergenceContext::new();
        let method = self.config.method;
        let x0 = self.recycle.data(flowsheet.streams());
        let stabilized =
            self.config.stabilized && mode == RunMode::Full && self.has_steady_units(flowsheet);
        if stabilized {
            method.solve(
                |mol: &[f64]| -> SystemResult<(Vec<f64>, bool)> {
                    let mut mol = mol.to_vec();
                    clip_infeasible(&mut mol, "recycle material flow rate")?;
                    self.recycle.set_data(flowsheet.streams_mut(), &mol)?;
                    let steady = method.solve(
                        |m| self.iter_run(flowsheet, &mut ctx, m, RunMode::Steady),
                        mol,
                    )?;
                    self.iter_run(flowsheet, &mut ctx, &steady, RunMode::Full)
                },
                x0,
            )?;
        } else {
            method.solve(|mol| self.iter_run(flowsheet, &mut ctx, mol, mode), x0)?;
        }
        let report = ctx.report();
        if report.converged {
            debug!(
                system = %self.id,
                method = %method,
                iterations = report.iterations,
                "recycle converged"
            );
        }
        Ok(report)
    }

    /// Run the path once at recycle flows `mol`.
    ///
    /// Returns the new recycle flows and whether iteration should go on.
    fn iter_run(
        &mut self,
        flowsheet: &mut Flowsheet,
        ctx: &mut ConvergenceContext,
        mol: &[f64],
        mode: RunMode,
    ) -> SystemResult<(Vec<f64>, bool)> {
        let mut mol = mol.to_vec();
        clip_infeasible(&mut mol, "recycle material flow rate")?;
        self.recycle.set_data(flowsheet.streams_mut(), &mol)?;
        let t = self.recycle.temperatures(flowsheet.streams());
        self.run_path(flowsheet, mode)?;
        let mol_new = self.recycle.data(flowsheet.streams());
        let t_new = self.recycle.temperatures(flowsheet.streams());

        let c = &self.config;
        let mol_error = measure_error(&mol, &mol_new);
        let t_error = measure_error(&t, &t_new);
        let converged = mol_error.within(c.molar_tolerance, c.relative_molar_tolerance)
            && t_error.within(c.temperature_tolerance, c.relative_temperature_tolerance);
        ctx.record(mol_error, t_error, converged);
        debug!(
            system = %self.id,
            iter = ctx.iter,
            steady = mode == RunMode::Steady,
            mol_error = mol_error.abs,
            rmol_error = mol_error.rel,
            t_error = t_error.abs,
            rt_error = t_error.rel,
            "recycle iteration"
        );
        if !converged && ctx.iter >= c.maxiter {
            if c.strict {
                return Err(SystemError::ConvergenceFailure {
                    system: self.id.clone(),
                    recycle: self.recycle.names(flowsheet.streams()),
                    iterations: ctx.iter,
                    mol_error: mol_error.abs,
                    rmol_error: mol_error.rel,
                    t_error: t_error.abs,
                    rt_error: t_error.rel,
                });
            }
            warn!(
                system = %self.id,
                iterations = ctx.iter,
                mol_error = mol_error.abs,
                t_error = t_error.abs,
                "recycle did not converge, accepting last iterate"
            );
            return Ok((mol_new, false));
        }
        Ok((mol_new, !converged))
    }

    /// Post-convergence step of every unit (once each) and nested system,
    /// then the facilities.
    pub fn summary(&mut self, flowsheet: &mut Flowsheet) -> SystemResult<()> {
        let mut done = HashSet::new();
        self.summarize_path(flowsheet, &mut done)?;
        for element in &mut self.facilities {
            match element {
                PathElement::Unit(id) => {
                    flowsheet.run_unit(*id)?;
                    flowsheet.summarize_unit(*id)?;
                }
                PathElement::System(system) => {
                    system.converge_in_path(flowsheet, RunMode::Full)?;
                    system.summary(flowsheet)?;
                }
                PathElement::Hook(hook) => hook(flowsheet)?,
            }
        }
        Ok(())
    }

    fn summarize_path(
        &mut self,
        flowsheet: &mut Flowsheet,
        done: &mut HashSet<UnitId>,
    ) -> SystemResult<()> {
        for element in &mut self.path {
            match element {
                PathElement::Unit(id) => {
                    if done.insert(*id) {
                        flowsheet.summarize_unit(*id)?;
                    }
                }
                PathElement::System(system) => system.summarize_path(flowsheet, done)?,
                PathElement::Hook(_) => {}
            }
        }
        Ok(())
    }
}
