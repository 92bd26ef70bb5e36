//! fs-units: unit-operation contract and basic units.
//!
//! Provides:
//! - `Unit`, the stage interface every flowsheet node implements
//! - Mixer, Splitter and Heater
//!
//! Units never own streams. They hold `StreamId`s into the flowsheet's
//! `StreamArena` and read inlets / write outlets through it when run.
//!
//! # Example
//!
//! ```
//! use fs_thermo::StreamArena;
//! use fs_units::{Mixer, Unit};
//!
//! let mut streams = StreamArena::new(2);
//! let a = streams.add("a");
//! let b = streams.add("b");
//! let out = streams.add("out");
//! streams.set_flows(a, &[1.0, 0.0]).unwrap();
//! streams.set_flows(b, &[0.0, 2.0]).unwrap();
//!
//! let mut mixer = Mixer::new("M1", vec![a, b], out);
//! mixer.run(&mut streams).unwrap();
//! assert_eq!(streams[out].mol, vec![1.0, 2.0]);
//! ```

pub mod common;
pub mod error;
pub mod heater;
pub mod mixer;
pub mod splitter;
pub mod traits;

pub use common::{MixedFeed, mix_streams};
pub use error::{UnitError, UnitResult};
pub use heater::Heater;
pub use mixer::Mixer;
pub use splitter::{SplitSpec, Splitter};
pub use traits::Unit;
