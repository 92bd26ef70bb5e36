//! Errors raised while building or running a benchmark.

use fs_cascade::CascadeError;
use fs_flowsheet::FlowsheetError;
use fs_system::SystemError;
use fs_thermo::ThermoError;
use fs_units::UnitError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Unknown benchmark: {id}")]
    UnknownBenchmark { id: String },

    #[error("Benchmark {id} failed: {source}")]
    Run {
        id: String,
        #[source]
        source: SystemError,
    },

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Flowsheet(#[from] FlowsheetError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Thermo(#[from] ThermoError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
