//! fs-core: shared foundation for the flowsheet convergence crates.
//!
//! Contains:
//! - accelerate (conditional fixed-point, Wegstein and Aitken solvers)
//! - units (uom SI types + constructors)
//! - numeric (noise floors, convergence error measurement, infeasibility guard)
//! - ids (compact arena ids for streams and units)
//! - error (shared error types)

pub mod accelerate;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{CoreResult, FsError};
pub use ids::*;
pub use numeric::*;
pub use units::*;
