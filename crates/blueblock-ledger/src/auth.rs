use blueblock_types::Principal;

use crate::error::LedgerError;
use crate::state::AnchorLedgerState;

/// Write authorization for anchor submission: the owner, or any principal
/// whose local `approved` flag is set.
pub fn authorize(caller: &Principal, state: &AnchorLedgerState) -> bool {
    *caller == state.owner || state.is_approved(caller)
}

/// Owner-only gate for administrative transitions.
pub fn is_owner(caller: &Principal, state: &AnchorLedgerState) -> bool {
    *caller == state.owner
}

pub(crate) fn require_writer(
    caller: &Principal,
    state: &AnchorLedgerState,
    operation: &'static str,
) -> Result<(), LedgerError> {
    if authorize(caller, state) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized {
            caller: *caller,
            operation,
        })
    }
}

pub(crate) fn require_owner(
    caller: &Principal,
    state: &AnchorLedgerState,
    operation: &'static str,
) -> Result<(), LedgerError> {
    if is_owner(caller, state) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized {
            caller: *caller,
            operation,
        })
    }
}
