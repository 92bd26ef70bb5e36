//! Error types for recycle convergence.

use fs_core::FsError;
use fs_flowsheet::FlowsheetError;
use fs_thermo::ThermoError;
use fs_units::UnitError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// Recycle flows went negative beyond numerical noise.
    #[error("Infeasible region: {what} reached {value}")]
    InfeasibleRegion { what: &'static str, value: f64 },

    #[error(
        "System {system} could not converge recycle {recycle:?} after {iterations} loops: \
         flow rate {mol_error:.2e} kmol/hr ({rmol_pct:.2}%), temperature {t_error:.2e} K ({rt_pct:.2}%)",
        rmol_pct = .rmol_error * 100.0,
        rt_pct = .rt_error * 100.0
    )]
    ConvergenceFailure {
        system: String,
        recycle: Vec<String>,
        iterations: usize,
        mol_error: f64,
        rmol_error: f64,
        t_error: f64,
        rt_error: f64,
    },

    #[error("Invalid system configuration: {what}")]
    InvalidConfig { what: &'static str },

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Flowsheet(#[from] FlowsheetError),

    #[error("Stream error: {0}")]
    Thermo(#[from] ThermoError),

    #[error(transparent)]
    Core(FsError),
}

pub type SystemResult<T> = Result<T, SystemError>;

impl From<FsError> for SystemError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Infeasible { what, value } => SystemError::InfeasibleRegion { what, value },
            other => SystemError::Core(other),
        }
    }
}
