//! fs-cascade: countercurrent equilibrium-stage cascades.
//!
//! Provides:
//! - `MultiStageEquilibrium`, N stages with feeds, side draws and per-stage
//!   specifications, solved simultaneously on the top-phase flows
//! - `StageEquilibrium`, one stage as a standalone flowsheet unit
//! - the linear algebra behind them (bidiagonal/tridiagonal cascade solves,
//!   energy-balance departures, bounded least squares)
//!
//! # Architecture
//!
//! Stage 0 is the top of the cascade. The top phase rises from stage `i+1`
//! to stage `i` and the bottom phase falls from `i-1` to `i`. Fields over
//! stages and chemicals are `nalgebra::DMatrix` with one row per stage.
//!
//! Chemicals flagged light or heavy never partition: they leave with the
//! top or bottom phase and stay out of K, B and the component balances.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fs_cascade::{CascadeConfig, CascadeFeed, MultiStageEquilibrium, PartitionData};
//! use fs_thermo::{Chemicals, IdealPackage, PhasePair, StreamState};
//!
//! let thermo = Arc::new(
//!     IdealPackage::from_boiling_points(Chemicals::new(["solute"]), &[(400.0, 40_000.0)]).unwrap(),
//! );
//! let config = CascadeConfig::new(1)
//!     .with_phases(PhasePair::Lle)
//!     .with_partition_data(PartitionData::uniform(vec![0.5]));
//! let mut cascade = MultiStageEquilibrium::new("X1", config, thermo).unwrap();
//! let feed = StreamState::new("feed", 1).with_flows(vec![3.0]).with_conditions(300.0, 101_325.0);
//! cascade.solve(&[CascadeFeed { stage: 0, state: feed }]).unwrap();
//! let total = cascade.top_product()[0] + cascade.bottom_product()[0];
//! assert!((total - 3.0).abs() < 1e-9);
//! ```

pub mod cascade;
pub mod energy;
pub mod error;
pub mod hot_start;
pub mod inside_out;
pub mod interpolate;
pub mod mass;
pub mod optimize;
pub mod partition;
pub mod specification;
pub mod stage;
pub mod tridiagonal;

pub use cascade::{CascadeFeed, CascadePorts, CascadeReport, MultiStageEquilibrium};
pub use error::{CascadeError, CascadeResult};
pub use partition::{ChemicalRouting, PhasePartition};
pub use specification::{CascadeAlgorithm, CascadeConfig, PartitionData, StageSpecification};
pub use stage::StageEquilibrium;
