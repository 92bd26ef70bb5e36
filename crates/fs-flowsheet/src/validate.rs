//! Connection validation.

use fs_core::{StreamId, UnitId};
use fs_thermo::StreamArena;
use fs_units::Unit;

use crate::error::{FlowsheetError, FlowsheetResult};

/// Producing and consuming unit of every stream, indexed by stream.
pub(crate) struct Connections {
    pub sources: Vec<Option<UnitId>>,
    pub sinks: Vec<Option<UnitId>>,
}

/// Check every unit port refers to an existing stream and that no stream
/// has two producers or two consumers.
pub(crate) fn validate_connections(
    streams: &StreamArena,
    units: &[Box<dyn Unit>],
) -> FlowsheetResult<Connections> {
    let mut sources: Vec<Option<UnitId>> = vec![None; streams.len()];
    let mut sinks: Vec<Option<UnitId>> = vec![None; streams.len()];

    for (i, unit) in units.iter().enumerate() {
        let id = UnitId::from_index(i);
        for &stream in unit.outlets() {
            check_exists(streams, unit.as_ref(), stream)?;
            if let Some(prev) = sources[stream.index()].replace(id) {
                return Err(FlowsheetError::DuplicateSource {
                    stream,
                    first: units[prev.index()].name().to_string(),
                    second: unit.name().to_string(),
                });
            }
        }
        for &stream in unit.inlets() {
            check_exists(streams, unit.as_ref(), stream)?;
            if let Some(prev) = sinks[stream.index()].replace(id) {
                return Err(FlowsheetError::DuplicateSink {
                    stream,
                    first: units[prev.index()].name().to_string(),
                    second: unit.name().to_string(),
                });
            }
        }
    }
    Ok(Connections { sources, sinks })
}

fn check_exists(streams: &StreamArena, unit: &dyn Unit, stream: StreamId) -> FlowsheetResult<()> {
    if streams.contains(stream) {
        Ok(())
    } else {
        Err(FlowsheetError::UnknownStream {
            unit: unit.name().to_string(),
            stream,
        })
    }
}
