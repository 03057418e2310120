use blueblock_types::{AnchorRecord, Principal};

use crate::error::LedgerError;
use crate::state::{AnchorLedgerState, GlobalStateView};
use crate::transition::{Transition, TransitionOutput};

/// Durable home of the current ledger snapshot.
///
/// A store only loads and saves whole snapshots; it never interprets or
/// mutates them.
pub trait StateStore: Send + Sync {
    /// The current snapshot, or `None` before the ledger is created.
    fn load(&self) -> Result<Option<AnchorLedgerState>, LedgerError>;

    /// Replace the current snapshot.
    fn save(&self, state: &AnchorLedgerState) -> Result<(), LedgerError>;

    /// Load, run `f`, and save the snapshot it returns, if any, as one
    /// read-modify-write step.
    ///
    /// The default holds no lock of its own; callers in the same process
    /// serialize around it. Stores shared between processes override it.
    fn update<R, F>(&self, f: F) -> Result<R, LedgerError>
    where
        Self: Sized,
        F: FnOnce(
            Option<&AnchorLedgerState>,
        ) -> Result<(Option<AnchorLedgerState>, R), LedgerError>,
    {
        let current = self.load()?;
        let (next, output) = f(current.as_ref())?;
        if let Some(next) = &next {
            self.save(next)?;
        }
        Ok(output)
    }
}

/// Boundary through which callers reach the ledger.
///
/// The gateway authenticates the caller, supplies the authoritative
/// timestamp, and executes transitions one at a time.
pub trait LedgerGateway: Send + Sync {
    fn execute(
        &self,
        caller: &Principal,
        transition: Transition,
    ) -> Result<TransitionOutput, LedgerError>;

    /// Unauthenticated read of the global state.
    fn read_global_state(&self) -> Result<GlobalStateView, LedgerError>;

    /// Unauthenticated read of one record.
    fn get_anchor(&self, index: u64) -> Result<AnchorRecord, LedgerError> {
        self.read_global_state()?.anchor(index).cloned()
    }

    fn anchor_count(&self) -> Result<u64, LedgerError> {
        Ok(self.read_global_state()?.anchor_count)
    }
}
