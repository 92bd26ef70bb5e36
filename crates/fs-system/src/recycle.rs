//! Flat views of tear streams.

use fs_core::StreamId;
use fs_thermo::{StreamArena, ThermoResult};

/// Tear streams of one system, stacked in order into the vector the
/// accelerators iterate on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recycle {
    streams: Vec<StreamId>,
}

impl Recycle {
    pub fn new(streams: Vec<StreamId>) -> Self {
        Self { streams }
    }

    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn data(&self, arena: &StreamArena) -> Vec<f64> {
        arena.gather_flows(&self.streams)
    }

    pub fn set_data(&self, arena: &mut StreamArena, data: &[f64]) -> ThermoResult<()> {
        arena.scatter_flows(&self.streams, data)
    }

    /// Used for convergence checks only, never extrapolated.
    pub fn temperatures(&self, arena: &StreamArena) -> Vec<f64> {
        arena.gather_temperatures(&self.streams)
    }

    pub fn names(&self, arena: &StreamArena) -> Vec<String> {
        self.streams.iter().map(|id| arena[*id].name.clone()).collect()
    }

    pub fn empty(&self, arena: &mut StreamArena) {
        for id in &self.streams {
            arena[*id].empty();
        }
    }
}
