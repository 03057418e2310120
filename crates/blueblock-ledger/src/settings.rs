use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Default upper bound on project id length in bytes.
pub const DEFAULT_MAX_PROJECT_ID_LEN: usize = 64;

/// Policy stored inside the ledger and replaceable only by the owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Reject submissions whose `window_start` is after `window_end`.
    pub enforce_window_order: bool,
    /// Project ids must be non-empty and at most this many bytes.
    pub max_project_id_len: usize,
    /// Optional global storage quota. `None` is unbounded.
    pub schema: Option<StateSchema>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            enforce_window_order: true,
            max_project_id_len: DEFAULT_MAX_PROJECT_ID_LEN,
            schema: None,
        }
    }
}

impl LedgerSettings {
    /// Settings matching the behavior of ledgers deployed before window
    /// ordering was checked: any window is accepted.
    pub fn permissive() -> Self {
        Self {
            enforce_window_order: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.max_project_id_len == 0 {
            return Err(LedgerError::invalid("max_project_id_len must be at least 1"));
        }
        Ok(())
    }
}

/// Global key/value quota, counted in uint slots and byte-slice slots.
///
/// Every ledger holds `owner` (one byte slice) and `anchor_count` (one uint).
/// Each anchor adds two byte slices (root, project) and four uints (count,
/// window start, window end, timestamp).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
    pub num_uints: u64,
    pub num_byte_slices: u64,
}

impl StateSchema {
    pub const GLOBAL_UINTS: u64 = 1;
    pub const GLOBAL_BYTE_SLICES: u64 = 1;
    pub const UINTS_PER_ANCHOR: u64 = 4;
    pub const BYTE_SLICES_PER_ANCHOR: u64 = 2;

    /// The quota the anchoring application was originally deployed with.
    pub const DEPLOYED: Self = Self {
        num_uints: 32,
        num_byte_slices: 32,
    };

    /// Slots used by a ledger holding `anchors` records, as `(uints, byte_slices)`.
    pub fn usage(anchors: u64) -> (u64, u64) {
        (
            Self::GLOBAL_UINTS + Self::UINTS_PER_ANCHOR * anchors,
            Self::GLOBAL_BYTE_SLICES + Self::BYTE_SLICES_PER_ANCHOR * anchors,
        )
    }

    /// Check that a ledger can grow to `anchors` records.
    pub fn check(&self, anchors: u64) -> Result<(), LedgerError> {
        let (uints, bytes) = Self::usage(anchors);
        if uints > self.num_uints {
            return Err(LedgerError::SchemaExhausted {
                kind: "uint",
                needed: uints,
                limit: self.num_uints,
            });
        }
        if bytes > self.num_byte_slices {
            return Err(LedgerError::SchemaExhausted {
                kind: "byte-slice",
                needed: bytes,
                limit: self.num_byte_slices,
            });
        }
        Ok(())
    }

    /// Largest number of anchors that fit.
    pub fn max_anchors(&self) -> u64 {
        let by_uints = self.num_uints.saturating_sub(Self::GLOBAL_UINTS) / Self::UINTS_PER_ANCHOR;
        let by_bytes = self.num_byte_slices.saturating_sub(Self::GLOBAL_BYTE_SLICES)
            / Self::BYTE_SLICES_PER_ANCHOR;
        by_uints.min(by_bytes)
    }
}
