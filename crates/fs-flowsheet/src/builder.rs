//! Incremental flowsheet builder.

use fs_core::{StreamId, UnitId};
use fs_thermo::{StreamArena, StreamState};
use fs_units::Unit;
use tracing::debug;

use crate::error::{FlowsheetError, FlowsheetResult};
use crate::flowsheet::Flowsheet;
use crate::validate;

/// Builder for constructing a flowsheet incrementally.
///
/// Register streams first so units can be created with their ids, then
/// call `build()` to validate connections and freeze the network.
#[derive(Default)]
pub struct FlowsheetBuilder {
    streams: StreamArena,
    units: Vec<Box<dyn Unit>>,
}

impl FlowsheetBuilder {
    pub fn new(n_components: usize) -> Self {
        Self {
            streams: StreamArena::new(n_components),
            units: Vec::new(),
        }
    }

    /// Add an empty stream and return its ID.
    pub fn add_stream(&mut self, name: impl Into<String>) -> StreamId {
        self.streams.add(name)
    }

    /// Add a stream with initial content (typically a feed).
    pub fn add_feed(&mut self, state: StreamState) -> FlowsheetResult<StreamId> {
        self.streams.insert(state).map_err(FlowsheetError::Stream)
    }

    pub fn add_unit(&mut self, unit: impl Unit + 'static) -> UnitId {
        self.add_boxed_unit(Box::new(unit))
    }

    pub fn add_boxed_unit(&mut self, unit: Box<dyn Unit>) -> UnitId {
        let id = UnitId::from_index(self.units.len());
        self.units.push(unit);
        id
    }

    pub fn streams_mut(&mut self) -> &mut StreamArena {
        &mut self.streams
    }

    /// Validate connections and return the immutable network.
    pub fn build(self) -> FlowsheetResult<Flowsheet> {
        let conn = validate::validate_connections(&self.streams, &self.units)?;
        debug!(
            streams = self.streams.len(),
            units = self.units.len(),
            "flowsheet built"
        );
        Ok(Flowsheet {
            streams: self.streams,
            units: self.units,
            sources: conn.sources,
            sinks: conn.sinks,
        })
    }
}
