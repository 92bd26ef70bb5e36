//! A single equilibrium stage as a flowsheet unit.

use std::sync::Arc;

use fs_core::StreamId;
use fs_core::units::constants::{P_ATM_PA, T_REF_K};
use fs_thermo::{Phase, PhasePair, PropertyPackage, StreamArena};
use fs_units::common::check_streams;
use fs_units::{Unit, UnitError, UnitResult, mix_streams};
use tracing::debug;

use crate::error::CascadeResult;
use crate::partition::{ChemicalRouting, PhasePartition};
use crate::specification::StageSpecification;

/// Mixes its inlets and splits them into two phases at equilibrium.
///
/// Optional side draws take a fraction of either outlet phase before it
/// leaves through the main outlet.
pub struct StageEquilibrium {
    name: String,
    inlets: Vec<StreamId>,
    outlets: Vec<StreamId>,
    top: StreamId,
    bottom: StreamId,
    top_side_draw: Option<(StreamId, f64)>,
    bottom_side_draw: Option<(StreamId, f64)>,
    partition: PhasePartition,
    routing: ChemicalRouting,
    thermo: Arc<dyn PropertyPackage>,
}

impl StageEquilibrium {
    pub fn new(
        name: impl Into<String>,
        inlets: Vec<StreamId>,
        top: StreamId,
        bottom: StreamId,
        phases: PhasePair,
        thermo: Arc<dyn PropertyPackage>,
    ) -> Self {
        Self {
            name: name.into(),
            outlets: vec![top, bottom],
            inlets,
            top,
            bottom,
            top_side_draw: None,
            bottom_side_draw: None,
            partition: PhasePartition::new(phases, P_ATM_PA, T_REF_K),
            routing: ChemicalRouting::from_chemicals(thermo.chemicals()),
            thermo,
        }
    }

    pub fn with_specification(mut self, spec: StageSpecification) -> CascadeResult<Self> {
        spec.validate(0, self.partition.phases)?;
        self.partition = self.partition.with_specification(Some(spec));
        Ok(self)
    }

    pub fn with_pressure(mut self, p: f64) -> Self {
        self.partition.p = p;
        self
    }

    /// Use constant partition coefficients instead of the property package.
    /// Every chemical takes part in the split.
    pub fn with_partition_coefficients(mut self, k: Vec<f64>) -> Self {
        self.routing = ChemicalRouting::all_active(k.len());
        self.partition = self.partition.with_fixed_k(k);
        self
    }

    pub fn with_top_side_draw(mut self, stream: StreamId, split: f64) -> Self {
        self.top_side_draw = Some((stream, split));
        self.outlets.push(stream);
        self
    }

    pub fn with_bottom_side_draw(mut self, stream: StreamId, split: f64) -> Self {
        self.bottom_side_draw = Some((stream, split));
        self.outlets.push(stream);
        self
    }

    pub fn partition(&self) -> &PhasePartition {
        &self.partition
    }

    fn invalid(&self, what: &'static str) -> UnitError {
        UnitError::InvalidConfig {
            unit: self.name.clone(),
            what,
        }
    }
}

fn write_phase(
    streams: &mut StreamArena,
    main: StreamId,
    draw: Option<(StreamId, f64)>,
    mol: &[f64],
    phase: Phase,
    t: f64,
    p: f64,
) -> UnitResult<()> {
    let split = draw.map_or(0.0, |(_, s)| s);
    let kept: Vec<f64> = mol.iter().map(|v| v * (1.0 - split)).collect();
    let mut targets = vec![(main, kept)];
    if let Some((id, s)) = draw {
        targets.push((id, mol.iter().map(|v| v * s).collect()));
    }
    for (id, flows) in targets {
        streams.set_flows(id, &flows)?;
        let out = &mut streams[id];
        out.t = t;
        out.p = p;
        out.phase = phase;
    }
    Ok(())
}

impl Unit for StageEquilibrium {
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
        check_streams(&self.name, streams, &self.outlets)?;
        for (_, split) in self.top_side_draw.iter().chain(&self.bottom_side_draw) {
            if !(0.0..=1.0).contains(split) {
                return Err(self.invalid("side-draw split must lie in [0, 1]"));
            }
        }
        let feed = mix_streams(&self.name, streams, &self.inlets, Some(self.thermo.as_ref()))?;
        let h_in = match feed.enthalpy {
            Some(h) => h,
            None => self.thermo.enthalpy(&feed.mol, feed.phase, feed.t, feed.p)?,
        };
        if self.partition.fixed_k.is_none() && self.partition.t_spec.is_none() {
            self.partition.t = feed.t;
        }
        let name = self.name.clone();
        let (top, bottom) = self
            .partition
            .equilibrium(self.thermo.as_ref(), &self.routing, &feed.mol, h_in)
            .map_err(|e| e.into_unit_error(&name))?;
        let (t, p) = (self.partition.t, self.partition.p);
        let phases = self.partition.phases;
        write_phase(streams, self.top, self.top_side_draw, &top, phases.top(), t, p)?;
        write_phase(streams, self.bottom, self.bottom_side_draw, &bottom, phases.bottom(), t, p)?;
        debug!(
            unit = %self.name,
            t,
            b = self.partition.phase_ratio(),
            "stage equilibrium"
        );
        Ok(())
    }
}
