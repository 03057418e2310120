use std::sync::Mutex;

use blueblock_types::Principal;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::state::{AnchorLedgerState, GlobalStateView};
use crate::traits::{LedgerGateway, StateStore};
use crate::transition::{apply, Transition, TransitionContext, TransitionOutput};

/// Host that runs transitions against a [`StateStore`].
///
/// Each call loads the current snapshot, applies one transition with the
/// host clock as the authoritative timestamp, and saves the next snapshot.
/// Calls are serialized within the process, and the store's
/// [`StateStore::update`] extends that across processes, so two submissions
/// never observe the same `anchor_count`.
pub struct HostGateway<S, C = SystemClock> {
    store: S,
    clock: C,
    guard: Mutex<()>,
}

impl<S: StateStore> HostGateway<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: StateStore, C: Clock> HostGateway<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The full current snapshot, including local states and settings.
    pub fn state(&self) -> Result<Option<AnchorLedgerState>, LedgerError> {
        let _lock = self.lock()?;
        self.store.load()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, LedgerError> {
        self.guard
            .lock()
            .map_err(|_| LedgerError::Store("gateway lock poisoned".into()))
    }
}

impl<S: StateStore, C: Clock> LedgerGateway for HostGateway<S, C> {
    fn execute(
        &self,
        caller: &Principal,
        transition: Transition,
    ) -> Result<TransitionOutput, LedgerError> {
        let _lock = self.lock()?;
        let mut committed = None;

        let output = self.store.update(|current| {
            let ctx = TransitionContext::new(*caller, self.clock.now());
            let applied = apply(current, &ctx, &transition).inspect_err(|e| {
                warn!(
                    caller = %caller.short_id(),
                    transition = transition.name(),
                    error = %e,
                    "transition rejected"
                );
            })?;
            committed = applied
                .next
                .as_ref()
                .map(|next| (next.version(), next.anchor_count()));
            Ok((applied.next, applied.output))
        })?;

        match committed {
            Some((version, anchors)) => info!(
                caller = %caller.short_id(),
                transition = transition.name(),
                version,
                anchors,
                "transition committed"
            ),
            None => debug!(
                caller = %caller.short_id(),
                transition = transition.name(),
                "transition left state unchanged"
            ),
        }

        Ok(output)
    }

    fn read_global_state(&self) -> Result<GlobalStateView, LedgerError> {
        let _lock = self.lock()?;
        self.store
            .load()?
            .map(|state| state.view())
            .ok_or(LedgerError::NotInitialized)
    }
}
