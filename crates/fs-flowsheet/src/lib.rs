//! fs-flowsheet: the stream/unit network handed to convergence.
//!
//! Provides:
//! - `Flowsheet`: a stream arena plus a unit arena with source/sink lookup
//! - `FlowsheetBuilder`: incremental construction with connection validation
//!
//! # Example
//!
//! ```
//! use fs_flowsheet::FlowsheetBuilder;
//! use fs_units::Mixer;
//!
//! let mut builder = FlowsheetBuilder::new(1);
//! let a = builder.add_stream("a");
//! let b = builder.add_stream("b");
//! let out = builder.add_stream("out");
//! let m = builder.add_unit(Mixer::new("M1", vec![a, b], out));
//! let flowsheet = builder.build().unwrap();
//!
//! assert_eq!(flowsheet.source(out), Some(m));
//! assert_eq!(flowsheet.feeds(), vec![a, b]);
//! ```

pub mod builder;
pub mod error;
pub mod flowsheet;
pub(crate) mod validate;

pub use builder::FlowsheetBuilder;
pub use error::{FlowsheetError, FlowsheetResult};
pub use flowsheet::Flowsheet;
