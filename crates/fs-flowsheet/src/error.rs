//! Flowsheet construction and execution errors.

use fs_core::{StreamId, UnitId};
use fs_thermo::ThermoError;
use fs_units::UnitError;

pub type FlowsheetResult<T> = Result<T, FlowsheetError>;

#[derive(Debug, Clone, PartialEq)]
pub enum FlowsheetError {
    /// A unit refers to a stream that doesn't exist.
    UnknownStream { unit: String, stream: StreamId },

    /// A unit id that doesn't exist.
    UnknownUnit { unit: UnitId },

    /// Two outlets write the same stream.
    DuplicateSource {
        stream: StreamId,
        first: String,
        second: String,
    },

    /// Two inlets read the same stream.
    DuplicateSink {
        stream: StreamId,
        first: String,
        second: String,
    },

    /// A stream could not be registered.
    Stream(ThermoError),

    /// A unit failed while running.
    Unit { unit: String, source: UnitError },
}

impl std::fmt::Display for FlowsheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowsheetError::UnknownStream { unit, stream } => {
                write!(f, "Unit {} refers to non-existent stream {}", unit, stream)
            }
            FlowsheetError::UnknownUnit { unit } => write!(f, "Unit {} does not exist", unit),
            FlowsheetError::DuplicateSource {
                stream,
                first,
                second,
            } => write!(
                f,
                "Stream {} is an outlet of both {} and {}",
                stream, first, second
            ),
            FlowsheetError::DuplicateSink {
                stream,
                first,
                second,
            } => write!(
                f,
                "Stream {} is an inlet of both {} and {}",
                stream, first, second
            ),
            FlowsheetError::Stream(e) => write!(f, "Invalid stream: {}", e),
            FlowsheetError::Unit { unit, source } => write!(f, "Unit {} failed: {}", unit, source),
        }
    }
}

impl std::error::Error for FlowsheetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlowsheetError::Stream(e) => Some(e),
            FlowsheetError::Unit { source, .. } => Some(source),
            _ => None,
        }
    }
}
