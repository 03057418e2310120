//! Pure ledger transitions.
//!
//! [`apply`] takes the current snapshot (or `None` before creation), the
//! gateway-supplied [`TransitionContext`], and a [`Transition`], and returns
//! either the error that rejected it or an [`Applied`] carrying the next
//! snapshot. Every transition validates fully before it builds the next
//! state, so a rejection leaves nothing half-written.

use blueblock_types::{AnchorRecord, MerkleRoot, Principal, ProjectId};
use serde::{Deserialize, Serialize};

use crate::auth::{require_owner, require_writer};
use crate::error::LedgerError;
use crate::settings::LedgerSettings;
use crate::state::{AnchorLedgerState, LocalState};

/// Identity and clock supplied by the gateway, never by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionContext {
    /// Authenticated caller.
    pub caller: Principal,
    /// Authoritative ledger time in unix seconds.
    pub timestamp: u64,
}

impl TransitionContext {
    pub fn new(caller: Principal, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

/// Anchor metadata submitted for commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSubmission {
    pub project_id: ProjectId,
    pub merkle_root: MerkleRoot,
    pub record_count: u64,
    pub window_start: u64,
    pub window_end: u64,
}

impl AnchorSubmission {
    pub fn new(
        project_id: impl Into<ProjectId>,
        merkle_root: MerkleRoot,
        record_count: u64,
        window_start: u64,
        window_end: u64,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            merkle_root,
            record_count,
            window_start,
            window_end,
        }
    }

    fn validate(&self, settings: &LedgerSettings) -> Result<(), LedgerError> {
        if self.project_id.is_empty() {
            return Err(LedgerError::invalid("project_id must not be empty"));
        }
        if self.project_id.len() > settings.max_project_id_len {
            return Err(LedgerError::InvalidArgument(format!(
                "project_id is {} bytes; at most {} allowed",
                self.project_id.len(),
                settings.max_project_id_len
            )));
        }
        if settings.enforce_window_order && self.window_start > self.window_end {
            return Err(LedgerError::InvalidArgument(format!(
                "window_start {} is after window_end {}",
                self.window_start, self.window_end
            )));
        }
        Ok(())
    }
}

/// A request to change or read ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Create the ledger; the caller becomes its owner.
    Create { settings: LedgerSettings },
    /// Register the caller's local state with `approved = false`.
    OptIn,
    /// Commit a new anchor record.
    SubmitAnchor(AnchorSubmission),
    /// Read one committed record.
    GetAnchor { index: u64 },
    /// Owner grants or revokes a principal's write approval.
    SetApproved { target: Principal, approved: bool },
    /// Owner replaces the ledger settings.
    UpdateSettings { settings: LedgerSettings },
    /// Owner retires the ledger; records stay readable.
    Delete,
    /// Caller drops its own local state, and with it any approval.
    ClearState,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::OptIn => "opt_in",
            Self::SubmitAnchor(_) => "submit_anchor",
            Self::GetAnchor { .. } => "get_anchor",
            Self::SetApproved { .. } => "set_approved",
            Self::UpdateSettings { .. } => "update_settings",
            Self::Delete => "delete",
            Self::ClearState => "clear_state",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::GetAnchor { .. })
    }
}

/// What a successful transition reports back to its caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutput {
    Created { owner: Principal },
    OptedIn { already: bool },
    Anchored { index: u64, committed_at: u64 },
    Anchor(AnchorRecord),
    ApprovalSet { target: Principal, approved: bool },
    SettingsUpdated,
    Deleted,
    StateCleared { existed: bool },
}

/// Result of a successful transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// The next snapshot, or `None` if the state is unchanged.
    pub next: Option<AnchorLedgerState>,
    pub output: TransitionOutput,
}

impl Applied {
    fn changed(next: AnchorLedgerState, output: TransitionOutput) -> Self {
        Self {
            next: Some(next),
            output,
        }
    }

    fn unchanged(output: TransitionOutput) -> Self {
        Self { next: None, output }
    }
}

/// Run one transition against a snapshot.
pub fn apply(
    state: Option<&AnchorLedgerState>,
    ctx: &TransitionContext,
    transition: &Transition,
) -> Result<Applied, LedgerError> {
    let state = match (state, transition) {
        (None, Transition::Create { settings }) => {
            settings.validate()?;
            let created = AnchorLedgerState::new(ctx.caller, settings.clone());
            return Ok(Applied::changed(
                created,
                TransitionOutput::Created { owner: ctx.caller },
            ));
        }
        (Some(_), Transition::Create { .. }) => return Err(LedgerError::AlreadyInitialized),
        (None, _) => return Err(LedgerError::NotInitialized),
        (Some(state), _) => state,
    };

    // Deletion freezes writes; committed records stay readable and callers
    // can still drop their own local state.
    if state.deleted && !transition.is_read_only() && !matches!(transition, Transition::ClearState) {
        return Err(LedgerError::Deleted);
    }

    match transition {
        Transition::Create { .. } => Err(LedgerError::AlreadyInitialized),
        Transition::GetAnchor { index } => state
            .get_anchor(*index)
            .map(|record| Applied::unchanged(TransitionOutput::Anchor(record.clone()))),
        Transition::OptIn => Ok(state.opt_in(&ctx.caller)),
        Transition::SubmitAnchor(submission) => state.submit_anchor(ctx, submission),
        Transition::SetApproved { target, approved } => {
            state.set_approved(&ctx.caller, target, *approved)
        }
        Transition::UpdateSettings { settings } => state.update_settings(&ctx.caller, settings),
        Transition::Delete => state.delete(&ctx.caller),
        Transition::ClearState => Ok(state.clear_state(&ctx.caller)),
    }
}

impl AnchorLedgerState {
    /// The record at `index`, or `NotFound`.
    pub fn get_anchor(&self, index: u64) -> Result<&AnchorRecord, LedgerError> {
        self.anchor(index).ok_or(LedgerError::NotFound {
            index,
            anchor_count: self.anchor_count(),
        })
    }

    fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    fn opt_in(&self, caller: &Principal) -> Applied {
        if self.locals.contains_key(caller) {
            return Applied::unchanged(TransitionOutput::OptedIn { already: true });
        }
        let mut next = self.successor();
        next.locals.insert(*caller, LocalState::default());
        Applied::changed(next, TransitionOutput::OptedIn { already: false })
    }

    fn submit_anchor(
        &self,
        ctx: &TransitionContext,
        submission: &AnchorSubmission,
    ) -> Result<Applied, LedgerError> {
        submission.validate(&self.settings)?;
        require_writer(&ctx.caller, self, "submit anchors")?;

        let index = self.anchor_count();
        if let Some(schema) = &self.settings.schema {
            schema.check(index + 1)?;
        }

        // The ledger clock is authoritative but may step backwards between
        // hosts; stored timestamps never do.
        let committed_at = self
            .latest()
            .map_or(ctx.timestamp, |last| ctx.timestamp.max(last.committed_at));

        let mut next = self.successor();
        next.anchors.push(AnchorRecord {
            index,
            project_id: submission.project_id.clone(),
            merkle_root: submission.merkle_root,
            record_count: submission.record_count,
            window_start: submission.window_start,
            window_end: submission.window_end,
            committed_at,
        });

        Ok(Applied::changed(
            next,
            TransitionOutput::Anchored {
                index,
                committed_at,
            },
        ))
    }

    fn set_approved(
        &self,
        caller: &Principal,
        target: &Principal,
        approved: bool,
    ) -> Result<Applied, LedgerError> {
        require_owner(caller, self, "change approvals")?;
        let mut next = self.successor();
        next.locals.entry(*target).or_default().approved = approved;
        Ok(Applied::changed(
            next,
            TransitionOutput::ApprovalSet {
                target: *target,
                approved,
            },
        ))
    }

    fn update_settings(
        &self,
        caller: &Principal,
        settings: &LedgerSettings,
    ) -> Result<Applied, LedgerError> {
        require_owner(caller, self, "update the ledger")?;
        settings.validate()?;
        if let Some(schema) = &settings.schema {
            schema.check(self.anchor_count())?;
        }
        let mut next = self.successor();
        next.settings = settings.clone();
        Ok(Applied::changed(next, TransitionOutput::SettingsUpdated))
    }

    fn delete(&self, caller: &Principal) -> Result<Applied, LedgerError> {
        require_owner(caller, self, "delete the ledger")?;
        let mut next = self.successor();
        next.deleted = true;
        Ok(Applied::changed(next, TransitionOutput::Deleted))
    }

    fn clear_state(&self, caller: &Principal) -> Applied {
        if !self.locals.contains_key(caller) {
            return Applied::unchanged(TransitionOutput::StateCleared { existed: false });
        }
        let mut next = self.successor();
        next.locals.remove(caller);
        Applied::changed(next, TransitionOutput::StateCleared { existed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::StateSchema;
    use proptest::prelude::*;

    fn principal(seed: u8) -> Principal {
        Principal::from_bytes([seed; 32])
    }

    fn root(seed: u8) -> MerkleRoot {
        MerkleRoot::from_hash([seed; 32])
    }

    fn ctx(caller: u8, timestamp: u64) -> TransitionContext {
        TransitionContext::new(principal(caller), timestamp)
    }

    fn submit(project: &str, seed: u8) -> Transition {
        Transition::SubmitAnchor(AnchorSubmission::new(project, root(seed), 3, 100, 200))
    }

    /// Apply and commit, panicking on rejection.
    fn step(state: &mut Option<AnchorLedgerState>, ctx: &TransitionContext, t: Transition) -> TransitionOutput {
        let applied = apply(state.as_ref(), ctx, &t).expect("transition should succeed");
        if let Some(next) = applied.next {
            *state = Some(next);
        }
        applied.output
    }

    fn created(owner: u8) -> Option<AnchorLedgerState> {
        let mut state = None;
        step(
            &mut state,
            &ctx(owner, 0),
            Transition::Create {
                settings: LedgerSettings::default(),
            },
        );
        state
    }

    #[test]
    fn create_sets_owner_and_zero_count() {
        let state = created(1).unwrap();
        assert_eq!(state.owner(), &principal(1));
        assert_eq!(state.anchor_count(), 0);
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn create_twice_is_rejected() {
        let state = created(1);
        let err = apply(
            state.as_ref(),
            &ctx(2, 0),
            &Transition::Create {
                settings: LedgerSettings::default(),
            },
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyInitialized);
    }

    #[test]
    fn transitions_before_create_are_rejected() {
        for t in [Transition::OptIn, submit("p", 1), Transition::GetAnchor { index: 0 }] {
            assert_eq!(apply(None, &ctx(1, 0), &t).unwrap_err(), LedgerError::NotInitialized);
        }
    }

    #[test]
    fn approval_scenario() {
        let (a, b) = (1, 2);
        let mut state = created(a);

        let out = step(&mut state, &ctx(a, 1_000), submit("proj1", 0xA1));
        assert_eq!(
            out,
            TransitionOutput::Anchored {
                index: 0,
                committed_at: 1_000
            }
        );

        let record = state.as_ref().unwrap().get_anchor(0).unwrap();
        assert_eq!(record.index, 0);
        assert_eq!(record.project_id, ProjectId::from("proj1"));
        assert_eq!(record.merkle_root, root(0xA1));
        assert_eq!(record.record_count, 3);
        assert_eq!((record.window_start, record.window_end), (100, 200));

        let err = apply(state.as_ref(), &ctx(b, 1_001), &submit("proj2", 0xB2)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { caller, .. } if caller == principal(b)));
        assert_eq!(state.as_ref().unwrap().anchor_count(), 1);

        step(
            &mut state,
            &ctx(a, 1_002),
            Transition::SetApproved {
                target: principal(b),
                approved: true,
            },
        );

        let out = step(&mut state, &ctx(b, 1_003), submit("proj2", 0xB2));
        assert!(matches!(out, TransitionOutput::Anchored { index: 1, .. }));
        assert_eq!(state.unwrap().anchor_count(), 2);
    }

    #[test]
    fn get_anchor_past_end_is_not_found() {
        let mut state = created(1);
        step(&mut state, &ctx(1, 5), submit("p", 1));
        let err = apply(state.as_ref(), &ctx(9, 6), &Transition::GetAnchor { index: 1 }).unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotFound {
                index: 1,
                anchor_count: 1
            }
        );
    }

    #[test]
    fn get_anchor_is_open_and_leaves_state_untouched() {
        let mut state = created(1);
        step(&mut state, &ctx(1, 5), submit("p", 1));
        let applied = apply(state.as_ref(), &ctx(77, 6), &Transition::GetAnchor { index: 0 }).unwrap();
        assert!(applied.next.is_none());
        assert!(matches!(applied.output, TransitionOutput::Anchor(r) if r.index == 0));
    }

    #[test]
    fn only_owner_sets_approval() {
        let state = created(1);
        let err = apply(
            state.as_ref(),
            &ctx(2, 0),
            &Transition::SetApproved {
                target: principal(2),
                approved: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[test]
    fn revoked_approval_stops_writes() {
        let mut state = created(1);
        for approved in [true, false] {
            step(
                &mut state,
                &ctx(1, 0),
                Transition::SetApproved {
                    target: principal(2),
                    approved,
                },
            );
        }
        let err = apply(state.as_ref(), &ctx(2, 1), &submit("p", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[test]
    fn opt_in_is_idempotent() {
        let mut state = created(1);
        assert_eq!(
            step(&mut state, &ctx(2, 0), Transition::OptIn),
            TransitionOutput::OptedIn { already: false }
        );
        let version = state.as_ref().unwrap().version();

        let applied = apply(state.as_ref(), &ctx(2, 0), &Transition::OptIn).unwrap();
        assert_eq!(applied.output, TransitionOutput::OptedIn { already: true });
        assert!(applied.next.is_none());

        let state = state.unwrap();
        assert_eq!(state.version(), version);
        assert!(state.is_opted_in(&principal(2)));
        assert!(!state.is_approved(&principal(2)));
    }

    #[test]
    fn opt_in_keeps_existing_approval() {
        let mut state = created(1);
        step(
            &mut state,
            &ctx(1, 0),
            Transition::SetApproved {
                target: principal(2),
                approved: true,
            },
        );
        step(&mut state, &ctx(2, 0), Transition::OptIn);
        assert!(state.unwrap().is_approved(&principal(2)));
    }

    #[test]
    fn clear_state_revokes_approval() {
        let mut state = created(1);
        step(
            &mut state,
            &ctx(1, 0),
            Transition::SetApproved {
                target: principal(2),
                approved: true,
            },
        );
        assert_eq!(
            step(&mut state, &ctx(2, 0), Transition::ClearState),
            TransitionOutput::StateCleared { existed: true }
        );
        let err = apply(state.as_ref(), &ctx(2, 1), &submit("p", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[test]
    fn reversed_window_is_rejected_when_enforced() {
        let state = created(1);
        let t = Transition::SubmitAnchor(AnchorSubmission::new("p", root(1), 1, 300, 200));
        let err = apply(state.as_ref(), &ctx(1, 0), &t).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn reversed_window_is_accepted_when_permissive() {
        let mut state = None;
        step(
            &mut state,
            &ctx(1, 0),
            Transition::Create {
                settings: LedgerSettings::permissive(),
            },
        );
        let t = Transition::SubmitAnchor(AnchorSubmission::new("p", root(1), 1, 300, 200));
        assert!(matches!(
            step(&mut state, &ctx(1, 0), t),
            TransitionOutput::Anchored { index: 0, .. }
        ));
    }

    #[test]
    fn validation_precedes_authorization() {
        let state = created(1);
        let t = Transition::SubmitAnchor(AnchorSubmission::new("", root(1), 1, 0, 0));
        let err = apply(state.as_ref(), &ctx(2, 0), &t).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn oversized_project_id_is_rejected() {
        let state = created(1);
        let long = "x".repeat(65);
        let t = Transition::SubmitAnchor(AnchorSubmission::new(long.as_str(), root(1), 1, 0, 0));
        assert!(matches!(
            apply(state.as_ref(), &ctx(1, 0), &t),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn committed_at_never_goes_backwards() {
        let mut state = created(1);
        step(&mut state, &ctx(1, 500), submit("p", 1));
        let out = step(&mut state, &ctx(1, 400), submit("p", 2));
        assert_eq!(
            out,
            TransitionOutput::Anchored {
                index: 1,
                committed_at: 500
            }
        );
        state.unwrap().validate().unwrap();
    }

    #[test]
    fn schema_quota_caps_anchor_count() {
        let mut state = None;
        step(
            &mut state,
            &ctx(1, 0),
            Transition::Create {
                settings: LedgerSettings {
                    schema: Some(StateSchema::DEPLOYED),
                    ..Default::default()
                },
            },
        );
        for i in 0..7 {
            step(&mut state, &ctx(1, i), submit("p", i as u8));
        }
        let err = apply(state.as_ref(), &ctx(1, 8), &submit("p", 8)).unwrap_err();
        assert!(matches!(err, LedgerError::SchemaExhausted { .. }));
        assert_eq!(state.unwrap().anchor_count(), 7);
    }

    #[test]
    fn settings_cannot_shrink_below_existing_usage() {
        let mut state = created(1);
        for i in 0..3 {
            step(&mut state, &ctx(1, i), submit("p", i as u8));
        }
        let tight = LedgerSettings {
            schema: Some(StateSchema {
                num_uints: 5,
                num_byte_slices: 5,
            }),
            ..Default::default()
        };
        let err = apply(
            state.as_ref(),
            &ctx(1, 4),
            &Transition::UpdateSettings { settings: tight },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::SchemaExhausted { .. }));
    }

    #[test]
    fn update_settings_is_owner_only() {
        let mut state = created(1);
        let permissive = Transition::UpdateSettings {
            settings: LedgerSettings::permissive(),
        };
        assert!(matches!(
            apply(state.as_ref(), &ctx(2, 0), &permissive),
            Err(LedgerError::Unauthorized { .. })
        ));
        step(&mut state, &ctx(1, 0), permissive);
        assert!(!state.unwrap().settings().enforce_window_order);
    }

    #[test]
    fn delete_is_owner_only_and_freezes_writes() {
        let mut state = created(1);
        step(&mut state, &ctx(1, 10), submit("p", 1));

        assert!(matches!(
            apply(state.as_ref(), &ctx(2, 11), &Transition::Delete),
            Err(LedgerError::Unauthorized { .. })
        ));
        step(&mut state, &ctx(1, 12), Transition::Delete);

        for t in [submit("p", 2), Transition::OptIn, Transition::Delete] {
            assert_eq!(
                apply(state.as_ref(), &ctx(1, 13), &t).unwrap_err(),
                LedgerError::Deleted
            );
        }
        let applied = apply(state.as_ref(), &ctx(3, 14), &Transition::GetAnchor { index: 0 }).unwrap();
        assert!(matches!(applied.output, TransitionOutput::Anchor(_)));
    }

    #[test]
    fn clear_state_still_works_after_delete() {
        let mut state = created(1);
        step(&mut state, &ctx(2, 1), Transition::OptIn);
        step(&mut state, &ctx(1, 2), Transition::Delete);

        assert_eq!(
            step(&mut state, &ctx(2, 3), Transition::ClearState),
            TransitionOutput::StateCleared { existed: true }
        );
        let state = state.unwrap();
        assert!(state.is_deleted());
        assert!(!state.is_opted_in(&principal(2)));
        assert_eq!(
            apply(Some(&state), &ctx(2, 4), &Transition::OptIn).unwrap_err(),
            LedgerError::Deleted
        );
    }

    #[test]
    fn rejected_transition_produces_no_state() {
        let state = created(1).unwrap();
        let before = state.clone();
        let _ = apply(Some(&state), &ctx(2, 0), &submit("p", 1));
        assert_eq!(state, before);
    }

    #[test]
    fn every_change_bumps_version_once() {
        let mut state = created(1);
        let mut expected = 1;
        for t in [
            Transition::OptIn,
            submit("p", 1),
            Transition::SetApproved {
                target: principal(3),
                approved: true,
            },
        ] {
            step(&mut state, &ctx(1, 0), t);
            expected += 1;
            assert_eq!(state.as_ref().unwrap().version(), expected);
        }
    }

    proptest! {
        #[test]
        fn indices_are_contiguous(callers in prop::collection::vec(0u8..4, 1..60)) {
            // Principal 0 owns the ledger, 1 is approved, 2 and 3 are strangers.
            let mut state = created(0);
            step(&mut state, &ctx(0, 0), Transition::SetApproved { target: principal(1), approved: true });

            let mut accepted = 0u64;
            for (i, caller) in callers.iter().enumerate() {
                let result = apply(state.as_ref(), &ctx(*caller, i as u64), &submit("p", i as u8));
                match result {
                    Ok(applied) => {
                        prop_assert!(*caller <= 1);
                        prop_assert_eq!(applied.output.clone(), TransitionOutput::Anchored { index: accepted, committed_at: i as u64 });
                        state = applied.next;
                        accepted += 1;
                    }
                    Err(err) => {
                        prop_assert!(*caller >= 2);
                        let is_unauthorized = matches!(err, LedgerError::Unauthorized { .. });
                        prop_assert!(is_unauthorized);
                    }
                }
            }

            let state = state.unwrap();
            prop_assert_eq!(state.anchor_count(), accepted);
            for i in 0..accepted {
                prop_assert_eq!(state.get_anchor(i).unwrap().index, i);
            }
            prop_assert!(state.validate().is_ok());
        }
    }
}
