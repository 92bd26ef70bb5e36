//! Arena owning every stream of a flowsheet.
//!
//! Units and systems refer to streams by `StreamId` only, so recycle
//! loops never create reference cycles between owners.

use std::ops::{Index, IndexMut};

use fs_core::StreamId;

use crate::error::{ThermoError, ThermoResult};
use crate::stream::StreamState;

#[derive(Debug, Clone, Default)]
pub struct StreamArena {
    n_components: usize,
    streams: Vec<StreamState>,
}

impl StreamArena {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            streams: Vec::new(),
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Register an empty stream.
    pub fn add(&mut self, name: impl Into<String>) -> StreamId {
        let id = StreamId::from_index(self.streams.len());
        self.streams.push(StreamState::new(name, self.n_components));
        id
    }

    /// Register a stream with initial content.
    pub fn insert(&mut self, state: StreamState) -> ThermoResult<StreamId> {
        if state.mol.len() != self.n_components {
            return Err(ThermoError::ComponentCount {
                expected: self.n_components,
                got: state.mol.len(),
            });
        }
        let id = StreamId::from_index(self.streams.len());
        self.streams.push(state);
        Ok(id)
    }

    pub fn get(&self, id: StreamId) -> Option<&StreamState> {
        self.streams.get(id.index())
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut StreamState> {
        self.streams.get_mut(id.index())
    }

    pub fn contains(&self, id: StreamId) -> bool {
        id.index() < self.streams.len()
    }

    pub fn find(&self, name: &str) -> Option<StreamId> {
        self.streams
            .iter()
            .position(|s| s.name == name)
            .map(StreamId::from_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &StreamState)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(i, s)| (StreamId::from_index(i), s))
    }

    /// Overwrite the flows of `id`, checking the component count.
    pub fn set_flows(&mut self, id: StreamId, mol: &[f64]) -> ThermoResult<()> {
        let n = self.n_components;
        let stream = self.get_mut(id).ok_or(ThermoError::InvalidArg {
            what: "unknown stream id",
        })?;
        if mol.len() != n {
            return Err(ThermoError::ComponentCount {
                expected: n,
                got: mol.len(),
            });
        }
        stream.mol.copy_from_slice(mol);
        Ok(())
    }

    /// Stack the flows of several streams into one flat vector.
    pub fn gather_flows(&self, ids: &[StreamId]) -> Vec<f64> {
        let mut out = Vec::with_capacity(ids.len() * self.n_components);
        for id in ids {
            out.extend_from_slice(&self[*id].mol);
        }
        out
    }

    /// Inverse of [`gather_flows`](Self::gather_flows).
    pub fn scatter_flows(&mut self, ids: &[StreamId], flat: &[f64]) -> ThermoResult<()> {
        let n = self.n_components;
        if flat.len() != ids.len() * n {
            return Err(ThermoError::ComponentCount {
                expected: ids.len() * n,
                got: flat.len(),
            });
        }
        for (id, chunk) in ids.iter().zip(flat.chunks(n.max(1))) {
            self.set_flows(*id, chunk)?;
        }
        Ok(())
    }

    pub fn gather_temperatures(&self, ids: &[StreamId]) -> Vec<f64> {
        ids.iter().map(|id| self[*id].t).collect()
    }

    /// Sum of the flows of several streams, per component.
    pub fn total_flows(&self, ids: &[StreamId]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_components];
        for id in ids {
            for (o, m) in out.iter_mut().zip(&self[*id].mol) {
                *o += m;
            }
        }
        out
    }
}

impl Index<StreamId> for StreamArena {
    type Output = StreamState;

    fn index(&self, id: StreamId) -> &StreamState {
        &self.streams[id.index()]
    }
}

impl IndexMut<StreamId> for StreamArena {
    fn index_mut(&mut self, id: StreamId) -> &mut StreamState {
        &mut self.streams[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_scatter_round_trip() {
        let mut arena = StreamArena::new(2);
        let a = arena.add("a");
        let b = arena.add("b");
        arena.scatter_flows(&[a, b], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(arena[a].mol, vec![1.0, 2.0]);
        assert_eq!(arena[b].mol, vec![3.0, 4.0]);
        assert_eq!(arena.gather_flows(&[b, a]), vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(arena.total_flows(&[a, b]), vec![4.0, 6.0]);
    }

    #[test]
    fn rejects_wrong_lengths() {
        let mut arena = StreamArena::new(2);
        let a = arena.add("a");
        assert!(arena.scatter_flows(&[a], &[1.0]).is_err());
        assert!(arena.insert(StreamState::new("x", 3)).is_err());
    }

    #[test]
    fn find_by_name() {
        let mut arena = StreamArena::new(1);
        arena.add("feed");
        let r = arena.add("recycle");
        assert_eq!(arena.find("recycle"), Some(r));
        assert_eq!(arena.find("missing"), None);
    }
}
