// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure state transformers for the dispatch document.
//!
//! Each function mutates a `DispatchState` in place and reports contract
//! violations through `TransitionError` without partial effects: callers run
//! them inside a single locked `mutate`, which discards the document when the
//! transformer fails. Transformers must therefore validate before mutating.

use crate::state::{DispatchState, PROCESSED_EVENTS_CAP};
use claw_core::{
    ActiveDispatch, CompletedDispatch, CompletionRecord, DispatchStatus, SessionMapping,
    TransitionError, TransitionPatch,
};

/// Create a new active dispatch with registration defaults applied.
///
/// Fails if the identifier is already in flight. A lingering completed
/// record for the same identifier is evicted: re-dispatching an issue
/// starts a fresh history and the identifier may live in only one map.
pub fn register(
    state: &mut DispatchState,
    mut dispatch: ActiveDispatch,
    now_ms: u64,
) -> Result<(), TransitionError> {
    let identifier = dispatch.issue_identifier.clone();
    if state.dispatches.active.contains_key(&identifier) {
        return Err(TransitionError::AlreadyActive { identifier });
    }
    if state.dispatches.completed.remove(&identifier).is_some() {
        tracing::debug!(%identifier, "re-dispatch evicted completed record");
    }

    dispatch.status = DispatchStatus::Dispatched;
    dispatch.attempt = 0;
    dispatch.dispatched_at_ms = now_ms;
    state.dispatches.active.insert(identifier, dispatch);
    Ok(())
}

/// CAS transition: observe `expected_from`, move to `to`, apply `patch`.
pub fn transition(
    state: &mut DispatchState,
    identifier: &str,
    expected_from: DispatchStatus,
    to: DispatchStatus,
    patch: &TransitionPatch,
) -> Result<(), TransitionError> {
    let dispatch = state.dispatches.active.get_mut(identifier).ok_or_else(|| {
        TransitionError::NotFound { identifier: identifier.to_string() }
    })?;

    if dispatch.status != expected_from {
        return Err(TransitionError::StatusMismatch {
            identifier: identifier.to_string(),
            expected: expected_from,
            actual: dispatch.status,
            target: to,
        });
    }
    if !expected_from.can_transition(to) {
        return Err(TransitionError::Illegal {
            identifier: identifier.to_string(),
            from: expected_from,
            to,
        });
    }

    dispatch.status = to;
    patch.apply(dispatch);
    Ok(())
}

/// Move a dispatch from `active` to `completed`, purging its session map
/// entries in the same operation.
pub fn complete(
    state: &mut DispatchState,
    identifier: &str,
    record: CompletionRecord,
) -> Result<CompletedDispatch, TransitionError> {
    let dispatch = state.dispatches.active.remove(identifier).ok_or_else(|| {
        TransitionError::NotFound { identifier: identifier.to_string() }
    })?;

    let completed = CompletedDispatch {
        issue_identifier: dispatch.issue_identifier.clone(),
        tier: dispatch.tier,
        status: record.status,
        completed_at_ms: record.completed_at_ms,
        total_attempts: dispatch.attempt + 1,
        pr_url: record.pr_url,
        project: dispatch.project,
    };
    state.dispatches.completed.insert(identifier.to_string(), completed.clone());
    purge_sessions_for(state, identifier);
    Ok(completed)
}

/// Weak non-CAS status setter for out-of-band repair. The pipeline never
/// calls this.
pub fn update_status(
    state: &mut DispatchState,
    identifier: &str,
    status: DispatchStatus,
) -> Result<(), TransitionError> {
    let dispatch = state.dispatches.active.get_mut(identifier).ok_or_else(|| {
        TransitionError::NotFound { identifier: identifier.to_string() }
    })?;
    dispatch.status = status;
    Ok(())
}

/// Drop an active dispatch and its session mappings without completing it.
pub fn remove_active(state: &mut DispatchState, identifier: &str) -> Option<ActiveDispatch> {
    let removed = state.dispatches.active.remove(identifier);
    if removed.is_some() {
        purge_sessions_for(state, identifier);
    }
    removed
}

pub fn register_session(state: &mut DispatchState, session_key: String, mapping: SessionMapping) {
    state.session_map.insert(session_key, mapping);
}

pub fn remove_session(state: &mut DispatchState, session_key: &str) -> Option<SessionMapping> {
    state.session_map.remove(session_key)
}

/// Record an event key; returns whether it was new.
///
/// New keys append to the FIFO; beyond [`PROCESSED_EVENTS_CAP`] the oldest
/// entries are evicted.
pub fn mark_event_processed(state: &mut DispatchState, event_key: &str) -> bool {
    if state.event_processed(event_key) {
        return false;
    }
    state.processed_events.push_back(event_key.to_string());
    while state.processed_events.len() > PROCESSED_EVENTS_CAP {
        state.processed_events.pop_front();
    }
    true
}

/// Drop completed records older than the retention window; returns the count.
pub fn prune_completed(state: &mut DispatchState, retention_ms: u64, now_ms: u64) -> usize {
    let before = state.dispatches.completed.len();
    state
        .dispatches
        .completed
        .retain(|_, c| now_ms.saturating_sub(c.completed_at_ms) <= retention_ms);
    before - state.dispatches.completed.len()
}

fn purge_sessions_for(state: &mut DispatchState, dispatch_id: &str) {
    state.session_map.retain(|_, m| m.dispatch_id != dispatch_id);
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
