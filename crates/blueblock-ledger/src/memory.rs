use std::sync::RwLock;

use crate::error::LedgerError;
use crate::state::AnchorLedgerState;
use crate::traits::StateStore;

/// In-memory snapshot store for tests, local demos, and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    inner: RwLock<Option<AnchorLedgerState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_state(state: AnchorLedgerState) -> Self {
        Self {
            inner: RwLock::new(Some(state)),
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<Option<AnchorLedgerState>, LedgerError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| LedgerError::Store("state read lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &AnchorLedgerState) -> Result<(), LedgerError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| LedgerError::Store("state write lock poisoned".into()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}
