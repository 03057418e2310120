use std::collections::BTreeMap;

use blueblock_crypto::{CanonicalLeaf, MerkleBuilder};
use blueblock_types::{AnchorRecord, Principal, ProjectId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::settings::LedgerSettings;

/// Per-principal state, present once a principal has opted in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub approved: bool,
}

/// The whole anchor ledger as one versioned value.
///
/// Transitions never mutate a state in place: each one reads a snapshot and
/// produces the next snapshot (see [`crate::transition`]). The host that owns
/// persistence decides when the next snapshot replaces the current one.
///
/// Invariants:
/// - `owner` is fixed at creation.
/// - `anchor_count()` equals the number of stored records and the index the
///   next record will receive; indices run `0..anchor_count()` in commit order.
/// - records are never modified or removed.
/// - `committed_at` is non-decreasing across records.
/// - `version` grows by one with every state-changing transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorLedgerState {
    pub(crate) owner: Principal,
    pub(crate) anchors: Vec<AnchorRecord>,
    pub(crate) locals: BTreeMap<Principal, LocalState>,
    pub(crate) settings: LedgerSettings,
    pub(crate) version: u64,
    pub(crate) deleted: bool,
}

impl AnchorLedgerState {
    pub(crate) fn new(owner: Principal, settings: LedgerSettings) -> Self {
        Self {
            owner,
            anchors: Vec::new(),
            locals: BTreeMap::new(),
            settings,
            version: 1,
            deleted: false,
        }
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn anchor_count(&self) -> u64 {
        self.anchors.len() as u64
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The record at `index`, if committed.
    pub fn anchor(&self, index: u64) -> Option<&AnchorRecord> {
        usize::try_from(index).ok().and_then(|i| self.anchors.get(i))
    }

    /// All records in commit order.
    pub fn anchors(&self) -> &[AnchorRecord] {
        &self.anchors
    }

    /// The most recently committed record.
    pub fn latest(&self) -> Option<&AnchorRecord> {
        self.anchors.last()
    }

    /// Records for one project, in commit order.
    pub fn anchors_for_project<'a>(
        &'a self,
        project: &'a ProjectId,
    ) -> impl Iterator<Item = &'a AnchorRecord> + 'a {
        self.anchors.iter().filter(move |r| &r.project_id == project)
    }

    pub fn latest_for_project(&self, project: &ProjectId) -> Option<&AnchorRecord> {
        self.anchors.iter().rev().find(|r| &r.project_id == project)
    }

    pub fn local(&self, principal: &Principal) -> Option<&LocalState> {
        self.locals.get(principal)
    }

    pub fn is_opted_in(&self, principal: &Principal) -> bool {
        self.locals.contains_key(principal)
    }

    pub fn is_approved(&self, principal: &Principal) -> bool {
        self.locals.get(principal).is_some_and(|l| l.approved)
    }

    /// Principals holding an approval flag, in key order.
    pub fn approved_principals(&self) -> impl Iterator<Item = &Principal> {
        self.locals
            .iter()
            .filter(|(_, local)| local.approved)
            .map(|(principal, _)| principal)
    }

    /// Recompute a batch's root and compare it with the anchor at `index`.
    pub fn verify_batch<I>(
        &self,
        index: u64,
        builder: &MerkleBuilder,
        batch: I,
    ) -> Result<bool, LedgerError>
    where
        I: IntoIterator,
        I::Item: CanonicalLeaf,
    {
        let record = self.anchor(index).ok_or(LedgerError::NotFound {
            index,
            anchor_count: self.anchor_count(),
        })?;
        Ok(builder.build_root(batch) == record.merkle_root)
    }

    /// Check the record invariants of a state loaded from outside.
    ///
    /// Record indices must be contiguous from zero and `committed_at` must
    /// never decrease.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut previous_commit = 0u64;
        for (position, record) in self.anchors.iter().enumerate() {
            let expected = position as u64;
            if record.index != expected {
                return Err(LedgerError::IntegrityViolation {
                    index: record.index,
                    reason: format!("expected index {expected}"),
                });
            }
            if record.committed_at < previous_commit {
                return Err(LedgerError::IntegrityViolation {
                    index: record.index,
                    reason: format!(
                        "committed_at {} precedes previous anchor's {previous_commit}",
                        record.committed_at
                    ),
                });
            }
            previous_commit = record.committed_at;
        }
        Ok(())
    }

    /// Read-only view handed to unauthenticated readers.
    pub fn view(&self) -> GlobalStateView {
        GlobalStateView {
            owner: self.owner,
            anchor_count: self.anchor_count(),
            anchors: self.anchors.clone(),
            version: self.version,
            deleted: self.deleted,
        }
    }
}

/// Snapshot of the global ledger state as seen by any reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStateView {
    pub owner: Principal,
    pub anchor_count: u64,
    pub anchors: Vec<AnchorRecord>,
    pub version: u64,
    pub deleted: bool,
}

impl GlobalStateView {
    pub fn anchor(&self, index: u64) -> Result<&AnchorRecord, LedgerError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.anchors.get(i))
            .ok_or(LedgerError::NotFound {
                index,
                anchor_count: self.anchor_count,
            })
    }
}
