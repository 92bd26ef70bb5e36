//! fs-thermo: stream state and the property-package contract.
//!
//! Provides:
//! - Chemical lists with volatility classes (light/heavy keys)
//! - `StreamState` and the `StreamArena` that owns every stream of a flowsheet
//! - `PropertyPackage`, the boundary to phase-equilibrium and enthalpy models
//! - `IdealPackage`, a Raoult's-law reference implementation
//!
//! # Architecture
//!
//! Convergence code only ever talks to `dyn PropertyPackage`. Bubble/dew
//! points, flashes and temperature inversions have default implementations
//! on the trait built on top of `partition_coefficients` and `enthalpy`, so
//! a backend only has to supply those two.
//!
//! # Example
//!
//! ```
//! use fs_thermo::{Chemicals, IdealPackage, PropertyPackage};
//!
//! let chemicals = Chemicals::new(["heptane", "octane"]);
//! let pkg =
//!     IdealPackage::from_boiling_points(chemicals, &[(371.6, 31_770.0), (398.8, 34_410.0)]).unwrap();
//! let bp = pkg.bubble_point(&[0.5, 0.5], 101_325.0).unwrap();
//! assert!(bp.t > 371.6 && bp.t < 398.8);
//! ```

pub mod arena;
pub mod chemicals;
pub mod error;
pub mod flash;
pub mod ideal;
pub mod package;
pub mod stream;

pub use arena::StreamArena;
pub use chemicals::{Chemical, Chemicals, Volatility};
pub use error::{ThermoError, ThermoResult};
pub use flash::{phase_ratio_from_fraction, rachford_rice, split_flows};
pub use ideal::{Antoine, IdealComponent, IdealPackage};
pub use package::{BubblePoint, DewPoint, FlashSpec, PhaseSplit, PropertyPackage};
pub use stream::{Phase, PhasePair, StreamState};
