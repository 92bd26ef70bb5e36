//! Heat exchanger utility with a fixed outlet temperature.

use std::sync::Arc;

use fs_core::StreamId;
use fs_thermo::{Phase, PropertyPackage, StreamArena};
use tracing::debug;

use crate::common::check_streams;
use crate::error::UnitResult;
use crate::traits::Unit;

/// Brings its inlet to `t_out` [K], optionally changing phase.
///
/// The duty [kJ/hr] is evaluated in `summary` when a property package is set.
pub struct Heater {
    name: String,
    inlets: [StreamId; 1],
    outlets: [StreamId; 1],
    pub t_out: f64,
    pub phase: Option<Phase>,
    thermo: Option<Arc<dyn PropertyPackage>>,
    duty: Option<f64>,
}

impl Heater {
    pub fn new(name: impl Into<String>, inlet: StreamId, outlet: StreamId, t_out: f64) -> Self {
        Self {
            name: name.into(),
            inlets: [inlet],
            outlets: [outlet],
            t_out,
            phase: None,
            thermo: None,
            duty: None,
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_thermo(mut self, thermo: Arc<dyn PropertyPackage>) -> Self {
        self.thermo = Some(thermo);
        self
    }

    /// Duty from the last summary, if computed.
    pub fn duty(&self) -> Option<f64> {
        self.duty
    }
}

impl Unit for Heater {
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
        check_streams(&self.name, streams, &self.inlets)?;
        check_streams(&self.name, streams, &self.outlets)?;
        let feed = streams[self.inlets[0]].clone();
        let out = &mut streams[self.outlets[0]];
        out.copy_like(&feed);
        out.t = self.t_out;
        if let Some(phase) = self.phase {
            out.phase = phase;
        }
        Ok(())
    }

    fn summary(&mut self, streams: &StreamArena) -> UnitResult<()> {
        let Some(pkg) = self.thermo.as_deref() else {
            return Ok(());
        };
        let feed = &streams[self.inlets[0]];
        let out = &streams[self.outlets[0]];
        let duty = pkg.enthalpy(&out.mol, out.phase, out.t, out.p)?
            - pkg.enthalpy(&feed.mol, feed.phase, feed.t, feed.p)?;
        debug!(unit = %self.name, duty, "heater duty");
        self.duty = Some(duty);
        Ok(())
    }
}
