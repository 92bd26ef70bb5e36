//! Property and stream errors.

use fs_core::FsError;
use thiserror::Error;

/// Result type for thermodynamic operations.
pub type ThermoResult<T> = Result<T, ThermoError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThermoError {
    /// Non-physical values (negative temperature, pressure, K-value...).
    #[error("Non-physical value for {what}")]
    NonPhysical { what: &'static str },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// The package does not implement this calculation.
    #[error("Not supported by {package}: {what}")]
    NotSupported {
        package: String,
        what: &'static str,
    },

    /// Iterative property calculation failed to converge.
    #[error("Convergence failed for {what}")]
    ConvergenceFailed { what: &'static str },

    #[error("Stream length mismatch: expected {expected} components, got {got}")]
    ComponentCount { expected: usize, got: usize },

    #[error(transparent)]
    Core(#[from] FsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ThermoError::NotSupported {
            package: "ideal".into(),
            what: "liquid-liquid equilibrium",
        };
        assert!(err.to_string().contains("ideal"));
        assert!(err.to_string().contains("liquid-liquid"));
    }

    #[test]
    fn core_error_converts() {
        let core = FsError::InvalidArg { what: "x" };
        let err: ThermoError = core.into();
        assert!(matches!(err, ThermoError::Core(_)));
    }
}
