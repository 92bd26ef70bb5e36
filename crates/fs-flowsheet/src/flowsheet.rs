//! Validated stream/unit network.

use fs_core::{StreamId, UnitId};
use fs_thermo::StreamArena;
use fs_units::Unit;

use crate::error::{FlowsheetError, FlowsheetResult};

/// Every stream and unit of a process, linked by arena ids.
///
/// The unit list and connection tables are fixed once built; stream
/// contents are mutated in place by units as they run.
pub struct Flowsheet {
    pub(crate) streams: StreamArena,
    pub(crate) units: Vec<Box<dyn Unit>>,
    pub(crate) sources: Vec<Option<UnitId>>,
    pub(crate) sinks: Vec<Option<UnitId>>,
}

impl Flowsheet {
    pub fn streams(&self) -> &StreamArena {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut StreamArena {
        &mut self.streams
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, id: UnitId) -> Option<&dyn Unit> {
        self.units.get(id.index()).map(|u| u.as_ref())
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut (dyn Unit + 'static)> {
        self.units.get_mut(id.index()).map(|u| u.as_mut())
    }

    pub fn find_unit(&self, name: &str) -> Option<UnitId> {
        self.units
            .iter()
            .position(|u| u.name() == name)
            .map(UnitId::from_index)
    }

    pub fn unit_name(&self, id: UnitId) -> &str {
        self.unit(id).map(|u| u.name()).unwrap_or("<unknown>")
    }

    /// Unit writing `stream`, if any.
    pub fn source(&self, stream: StreamId) -> Option<UnitId> {
        self.sources.get(stream.index()).copied().flatten()
    }

    /// Unit reading `stream`, if any.
    pub fn sink(&self, stream: StreamId) -> Option<UnitId> {
        self.sinks.get(stream.index()).copied().flatten()
    }

    pub fn run_unit(&mut self, id: UnitId) -> FlowsheetResult<()> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(FlowsheetError::UnknownUnit { unit: id })?;
        unit.run(&mut self.streams)
            .map_err(|source| FlowsheetError::Unit {
                unit: unit.name().to_string(),
                source,
            })
    }

    pub fn steady_run_unit(&mut self, id: UnitId) -> FlowsheetResult<()> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(FlowsheetError::UnknownUnit { unit: id })?;
        unit.steady_run(&mut self.streams)
            .map_err(|source| FlowsheetError::Unit {
                unit: unit.name().to_string(),
                source,
            })
    }

    pub fn setup_unit(&mut self, id: UnitId) -> FlowsheetResult<()> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(FlowsheetError::UnknownUnit { unit: id })?;
        unit.setup(&self.streams)
            .map_err(|source| FlowsheetError::Unit {
                unit: unit.name().to_string(),
                source,
            })
    }

    pub fn summarize_unit(&mut self, id: UnitId) -> FlowsheetResult<()> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(FlowsheetError::UnknownUnit { unit: id })?;
        unit.summary(&self.streams)
            .map_err(|source| FlowsheetError::Unit {
                unit: unit.name().to_string(),
                source,
            })
    }

    /// Streams entering `units` from outside the set, in first-seen order.
    pub fn feeds_of(&self, units: &[UnitId]) -> Vec<StreamId> {
        let mut out = Vec::new();
        for id in units {
            let Some(unit) = self.unit(*id) else { continue };
            for &s in unit.inlets() {
                let internal = self.source(s).is_some_and(|src| units.contains(&src));
                if !internal && !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        out
    }

    /// Streams leaving `units` to outside the set, in first-seen order.
    pub fn products_of(&self, units: &[UnitId]) -> Vec<StreamId> {
        let mut out = Vec::new();
        for id in units {
            let Some(unit) = self.unit(*id) else { continue };
            for &s in unit.outlets() {
                let internal = self.sink(s).is_some_and(|dst| units.contains(&dst));
                if !internal && !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        out
    }

    /// Streams with no producing unit that feed some unit.
    pub fn feeds(&self) -> Vec<StreamId> {
        self.feeds_of(&self.all_units())
    }

    /// Streams with no consuming unit that leave some unit.
    pub fn products(&self) -> Vec<StreamId> {
        self.products_of(&self.all_units())
    }

    pub fn all_units(&self) -> Vec<UnitId> {
        (0..self.units.len()).map(UnitId::from_index).collect()
    }
}

impl std::fmt::Debug for Flowsheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowsheet")
            .field("streams", &self.streams.len())
            .field(
                "units",
                &self.units.iter().map(|u| u.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
