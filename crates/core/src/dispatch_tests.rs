// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::active_dispatch;
use proptest::prelude::*;

#[test]
fn legal_transitions_match_state_machine() {
    use DispatchStatus::*;
    let legal = [
        (Dispatched, Working),
        (Working, Auditing),
        (Auditing, Done),
        (Auditing, Working),
        (Dispatched, Stuck),
        (Working, Stuck),
        (Auditing, Stuck),
    ];
    for (from, to) in legal {
        assert!(from.can_transition(to), "{from} -> {to} should be legal");
    }
}

#[test]
fn terminal_statuses_have_no_outgoing_edges() {
    use DispatchStatus::*;
    for from in [Done, Failed, Stuck] {
        for to in [Dispatched, Working, Auditing, Done, Failed, Stuck] {
            assert!(!from.can_transition(to), "{from} -> {to} should be illegal");
        }
    }
}

#[test]
fn working_cannot_skip_audit() {
    assert!(!DispatchStatus::Working.can_transition(DispatchStatus::Done));
    assert!(!DispatchStatus::Dispatched.can_transition(DispatchStatus::Auditing));
}

#[test]
fn status_serializes_lowercase() {
    let json = serde_json::to_string(&DispatchStatus::Auditing).unwrap();
    assert_eq!(json, r#""auditing""#);
}

#[test]
fn legacy_running_status_migrates_to_working() {
    let status: DispatchStatus = serde_json::from_str(r#""running""#).unwrap();
    assert_eq!(status, DispatchStatus::Working);
}

#[test]
fn unknown_status_fails_deserialization() {
    let result = serde_json::from_str::<DispatchStatus>(r#""paused""#);
    assert!(result.is_err());
}

#[test]
fn active_dispatch_round_trips() {
    let dispatch = active_dispatch("CT-100");
    let json = serde_json::to_string(&dispatch).unwrap();
    let back: ActiveDispatch = serde_json::from_str(&json).unwrap();
    assert_eq!(back.issue_identifier, "CT-100");
    assert_eq!(back.status, dispatch.status);
    assert_eq!(back.attempt, dispatch.attempt);
}

#[test]
fn active_dispatch_defaults_attempt_to_zero() {
    let json = r#"{
        "issue_id": "uuid-1",
        "issue_identifier": "CT-7",
        "branch": "fix/ct-7",
        "worktree_path": "/tmp/wt",
        "tier": "junior",
        "model": "opus",
        "status": "running",
        "dispatched_at_ms": 1000
    }"#;
    let dispatch: ActiveDispatch = serde_json::from_str(json).unwrap();
    assert_eq!(dispatch.attempt, 0);
    assert_eq!(dispatch.status, DispatchStatus::Working);
    assert!(dispatch.worker_session_key.is_none());
}

#[test]
fn patch_applies_only_set_fields() {
    let mut dispatch = active_dispatch("CT-100");
    dispatch.worker_session_key = Some("linear-worker-CT-100-0".into());

    let patch = TransitionPatch::new().attempt(1u32).clear_audit_session_key();
    patch.apply(&mut dispatch);

    assert_eq!(dispatch.attempt, 1);
    assert_eq!(dispatch.worker_session_key.as_deref(), Some("linear-worker-CT-100-0"));
    assert!(dispatch.audit_session_key.is_none());
    assert!(dispatch.stuck_reason.is_none());
}

#[test]
fn patch_sets_and_clears_session_keys() {
    let mut dispatch = active_dispatch("CT-100");
    TransitionPatch::new()
        .worker_session_key("linear-worker-CT-100-0")
        .audit_session_key("linear-audit-CT-100-0")
        .apply(&mut dispatch);
    assert!(dispatch.worker_session_key.is_some());
    assert!(dispatch.audit_session_key.is_some());

    TransitionPatch::new().clear_audit_session_key().apply(&mut dispatch);
    assert!(dispatch.audit_session_key.is_none());
}

#[test]
fn transition_error_messages_name_statuses() {
    let err = TransitionError::StatusMismatch {
        identifier: "CT-1".into(),
        expected: DispatchStatus::Working,
        actual: DispatchStatus::Auditing,
        target: DispatchStatus::Stuck,
    };
    let msg = err.to_string();
    assert!(msg.contains("CT-1"));
    assert!(msg.contains("working"));
    assert!(msg.contains("auditing"));
}

proptest! {
    /// A status never transitions to itself, and terminal statuses never move.
    #[test]
    fn no_self_loops_and_terminals_stay(
        from in crate::test_support::strategies::arb_status(),
        to in crate::test_support::strategies::arb_status(),
    ) {
        if from == to {
            prop_assert!(!from.can_transition(to));
        }
        if from.is_terminal() {
            prop_assert!(!from.can_transition(to));
        }
    }
}
