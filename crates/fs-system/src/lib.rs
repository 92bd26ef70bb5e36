//! fs-system: recycle convergence over flowsheet paths.
//!
//! Provides:
//! - `System`, an ordered path of units, nested systems and hooks with an
//!   optional set of tear (recycle) streams
//! - `ConvergenceConfig` / `ConvergenceMethod`, tolerances and the
//!   accelerator driving the recycle vector
//! - `ConvergenceReport`, what a converge call achieved
//!
//! A system replays its path until the stacked recycle flows and
//! temperatures stop changing. Flows are accelerated; temperatures are only
//! checked. Recycle flows slightly below zero are clipped, larger negative
//! values abort with `SystemError::InfeasibleRegion`.
//!
//! # Example
//!
//! ```
//! use fs_flowsheet::FlowsheetBuilder;
//! use fs_system::System;
//! use fs_thermo::StreamState;
//! use fs_units::{Mixer, SplitSpec, Splitter};
//!
//! let mut builder = FlowsheetBuilder::new(1);
//! let feed = builder
//!     .add_feed(StreamState::new("feed", 1).with_flows(vec![10.0]))
//!     .unwrap();
//! let recycle = builder.add_stream("recycle");
//! let mixed = builder.add_stream("mixed");
//! let product = builder.add_stream("product");
//! let m = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed));
//! let s = builder.add_unit(
//!     Splitter::new("S1", mixed, [product, recycle], SplitSpec::Overall(0.5)).unwrap(),
//! );
//! let mut flowsheet = builder.build().unwrap();
//!
//! let mut system = System::new("sys", vec![m.into(), s.into()]).with_recycle(vec![recycle]);
//! let report = system.simulate(&mut flowsheet).unwrap();
//! assert!(report.converged);
//! assert!((flowsheet.streams()[product].mol[0] - 10.0).abs() < 1.0);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod path;
pub mod recycle;
pub mod system;

pub use config::{ConvergenceConfig, ConvergenceMethod};
pub use context::{ConvergenceContext, ConvergenceReport};
pub use error::{SystemError, SystemResult};
pub use path::{Hook, PathElement, SpecificationHook};
pub use recycle::Recycle;
pub use system::System;
