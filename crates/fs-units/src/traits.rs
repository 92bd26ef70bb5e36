//! Core trait for unit operations.

use fs_core::StreamId;
use fs_thermo::StreamArena;

use crate::error::UnitResult;

/// A flowsheet node computing its outlet streams from its inlet streams.
///
/// `run` must be deterministic given the current inlet states; recycle
/// convergence replays it many times.
pub trait Unit: Send {
    /// Unit name for logging and error messages.
    fn name(&self) -> &str;

    fn inlets(&self) -> &[StreamId];

    fn outlets(&self) -> &[StreamId];

    /// Compute outlets from inlets.
    fn run(&mut self, streams: &mut StreamArena) -> UnitResult<()>;

    /// Whether [`steady_run`](Self::steady_run) differs from `run`.
    fn has_steady_run(&self) -> bool {
        false
    }

    /// Cheaper alternate evaluation used inside stabilized recycle loops.
    ///
    /// Default implementation runs the full model.
    fn steady_run(&mut self, streams: &mut StreamArena) -> UnitResult<()> {
        self.run(streams)
    }

    /// Called once before a simulation starts.
    fn setup(&mut self, _streams: &StreamArena) -> UnitResult<()> {
        Ok(())
    }

    /// Post-convergence step (design and reporting quantities).
    fn summary(&mut self, _streams: &StreamArena) -> UnitResult<()> {
        Ok(())
    }

    /// Drop warm-start data kept between runs.
    fn reset_cache(&mut self) {}
}
