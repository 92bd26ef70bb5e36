//! Adiabatic mixer.

use std::sync::Arc;

use fs_core::StreamId;
use fs_thermo::{PropertyPackage, StreamArena};

use crate::common::mix_streams;
use crate::error::UnitResult;
use crate::traits::Unit;

/// Combines any number of inlets into one outlet.
pub struct Mixer {
    name: String,
    inlets: Vec<StreamId>,
    outlets: [StreamId; 1],
    thermo: Option<Arc<dyn PropertyPackage>>,
}

impl Mixer {
    pub fn new(name: impl Into<String>, inlets: Vec<StreamId>, outlet: StreamId) -> Self {
        Self {
            name: name.into(),
            inlets,
            outlets: [outlet],
            thermo: None,
        }
    }

    /// Close the energy balance with a property package instead of
    /// flow-weighting temperatures.
    pub fn with_thermo(mut self, thermo: Arc<dyn PropertyPackage>) -> Self {
        self.thermo = Some(thermo);
        self
    }
}

impl Unit for Mixer {
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
        let mixed = mix_streams(&self.name, streams, &self.inlets, self.thermo.as_deref())?;
        let out = &mut streams[self.outlets[0]];
        out.mol = mixed.mol;
        out.t = mixed.t;
        out.p = mixed.p;
        out.phase = mixed.phase;
        Ok(())
    }
}
