//! Stream splitter.

use fs_core::StreamId;
use fs_thermo::StreamArena;

use crate::common::check_streams;
use crate::error::{UnitError, UnitResult};
use crate::traits::Unit;

/// Fraction of the inlet sent to the first outlet.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitSpec {
    /// Same fraction for every component.
    Overall(f64),
    /// One fraction per component.
    PerComponent(Vec<f64>),
}

impl SplitSpec {
    fn fraction(&self, i: usize) -> f64 {
        match self {
            SplitSpec::Overall(f) => *f,
            SplitSpec::PerComponent(v) => v[i],
        }
    }

    fn is_valid(&self) -> bool {
        let ok = |f: &f64| (0.0..=1.0).contains(f);
        match self {
            SplitSpec::Overall(f) => ok(f),
            SplitSpec::PerComponent(v) => v.iter().all(ok),
        }
    }
}

/// Divides one inlet between two outlets at the inlet's conditions.
#[derive(Debug, Clone)]
pub struct Splitter {
    name: String,
    inlets: [StreamId; 1],
    outlets: [StreamId; 2],
    split: SplitSpec,
}

impl Splitter {
    pub fn new(
        name: impl Into<String>,
        inlet: StreamId,
        outlets: [StreamId; 2],
        split: SplitSpec,
    ) -> UnitResult<Self> {
        let name = name.into();
        if !split.is_valid() {
            return Err(UnitError::InvalidConfig {
                unit: name,
                what: "split fractions must lie in [0, 1]",
            });
        }
        Ok(Self {
            name,
            inlets: [inlet],
            outlets,
            split,
        })
    }

    pub fn split(&self) -> &SplitSpec {
        &self.split
    }

    pub fn set_split(&mut self, split: SplitSpec) -> UnitResult<()> {
        if !split.is_valid() {
            return Err(UnitError::InvalidConfig {
                unit: self.name.clone(),
                what: "split fractions must lie in [0, 1]",
            });
        }
        self.split = split;
        Ok(())
    }
}

impl Unit for Splitter {
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
        if let SplitSpec::PerComponent(v) = &self.split {
            if v.len() != feed.mol.len() {
                return Err(UnitError::InvalidConfig {
                    unit: self.name.clone(),
                    what: "one split fraction per component required",
                });
            }
        }
        let first: Vec<f64> = feed
            .mol
            .iter()
            .enumerate()
            .map(|(i, m)| m * self.split.fraction(i))
            .collect();
        let second: Vec<f64> = feed.mol.iter().zip(&first).map(|(m, a)| m - a).collect();
        for (id, mol) in self.outlets.into_iter().zip([first, second]) {
            let out = &mut streams[id];
            out.mol = mol;
            out.t = feed.t;
            out.p = feed.p;
            out.phase = feed.phase;
        }
        Ok(())
    }
}
