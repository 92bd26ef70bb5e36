//! Error types for unit operations.

use fs_core::{FsError, StreamId};
use fs_thermo::ThermoError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Invalid configuration for unit {unit}: {what}")]
    InvalidConfig { unit: String, what: &'static str },

    #[error("Unit {unit} references missing stream {stream}")]
    MissingStream { unit: String, stream: StreamId },

    #[error("Unit {unit} failed: {what}")]
    Failed { unit: String, what: String },

    #[error("Not supported: {what}")]
    NotSupported { what: &'static str },

    #[error("Thermodynamic error: {0}")]
    Thermo(#[from] ThermoError),

    #[error(transparent)]
    Core(#[from] FsError),
}

pub type UnitResult<T> = Result<T, UnitError>;
