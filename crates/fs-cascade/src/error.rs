//! Error types for the stage-cascade solver.

use fs_core::FsError;
use fs_thermo::ThermoError;
use fs_units::UnitError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    /// A stage specification that cannot apply to this cascade.
    #[error("Invalid specification on stage {stage}: {what}")]
    Specification { stage: usize, what: &'static str },

    #[error("Invalid cascade configuration: {what}")]
    InvalidConfig { what: &'static str },

    /// Non-positive or non-finite K, B or T handed to the cascade.
    #[error("Infeasible equilibrium condition: {what} = {value}")]
    InfeasibleEquilibrium { what: &'static str, value: f64 },

    #[error("No stage has phase equilibrium data")]
    NoPhaseEquilibrium,

    #[error(
        "Cascade {name} did not converge after {attempts} attempts \
         (mol error {mol_error:.3e}, relative {rmol_error:.3e})"
    )]
    ConvergenceFailed {
        name: String,
        attempts: usize,
        mol_error: f64,
        rmol_error: f64,
    },

    #[error("Thermodynamic error: {0}")]
    Thermo(#[from] ThermoError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Core(#[from] FsError),
}

pub type CascadeResult<T> = Result<T, CascadeError>;

impl CascadeError {
    /// Wrap as a unit failure for the flowsheet layer.
    pub fn into_unit_error(self, unit: &str) -> UnitError {
        match self {
            CascadeError::Thermo(e) => UnitError::Thermo(e),
            CascadeError::Core(e) => UnitError::Core(e),
            CascadeError::Unit(e) => e,
            other => UnitError::Failed {
                unit: unit.to_string(),
                what: other.to_string(),
            },
        }
    }
}
