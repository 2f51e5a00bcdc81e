//! Per-kind lifecycle state: started flag, in-flight bitset, generation.

use crate::error::IssueError;
use crate::provider::{OperationKind, OperationMask};
use crate::sample::PositionSample;

/// Mutable lifecycle state for one [`ProviderKind`](crate::ProviderKind).
///
/// The generation counter is bumped on every force-stop; callbacks carrying
/// an older generation are discarded instead of matched.
#[derive(Debug, Default)]
pub(crate) struct HandlerState {
    pub(crate) started: bool,
    pub(crate) in_flight: OperationMask,
    pub(crate) generation: u64,
    pub(crate) last_fix: Option<PositionSample>,
}

impl HandlerState {
    /// Marks an async operation outstanding. Refuses duplicates of the same
    /// kind and refuses issue on a stopped handler.
    pub(crate) fn begin(&mut self, operation: OperationKind) -> Result<(), IssueError> {
        if !self.started {
            return Err(IssueError::NotStarted);
        }
        if self.in_flight.contains(operation) {
            return Err(IssueError::Duplicate);
        }
        self.in_flight.insert(operation);
        Ok(())
    }

    /// Clears one operation's outstanding bit.
    pub(crate) fn finish(&mut self, operation: OperationKind) {
        self.in_flight.remove(operation);
    }

    /// Force-stop bookkeeping: clears all in-flight bits and advances the
    /// generation so late callbacks are recognizable as stale.
    pub(crate) fn force_clear(&mut self) {
        self.in_flight.clear();
        self.generation += 1;
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}
