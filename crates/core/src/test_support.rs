// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::dispatch::{
    ActiveDispatch, CompletedDispatch, CompletionStatus, DispatchStatus, Tier,
};
use crate::session::{SessionMapping, SessionPhase};
use std::path::PathBuf;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for the dispatch state machine.
pub mod strategies {
    use crate::dispatch::{DispatchStatus, Tier};
    use proptest::prelude::*;

    pub fn arb_status() -> impl Strategy<Value = DispatchStatus> {
        prop_oneof![
            Just(DispatchStatus::Dispatched),
            Just(DispatchStatus::Working),
            Just(DispatchStatus::Auditing),
            Just(DispatchStatus::Done),
            Just(DispatchStatus::Failed),
            Just(DispatchStatus::Stuck),
        ]
    }

    pub fn arb_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![Just(Tier::Junior), Just(Tier::Medior), Just(Tier::Senior)]
    }
}

// ── Record factories ────────────────────────────────────────────────────

/// A freshly registered dispatch for the given identifier.
pub fn active_dispatch(identifier: &str) -> ActiveDispatch {
    ActiveDispatch {
        issue_id: format!("issue-uuid-{identifier}"),
        issue_identifier: identifier.to_string(),
        branch: format!("agent/{}", identifier.to_lowercase()),
        worktree_path: PathBuf::from("/tmp/worktrees").join(identifier),
        tier: Tier::Junior,
        model: "claude-opus".to_string(),
        status: DispatchStatus::Dispatched,
        attempt: 0,
        dispatched_at_ms: 1_000_000,
        stuck_reason: None,
        worker_session_key: None,
        audit_session_key: None,
        agent_session_id: None,
        project: None,
    }
}

/// An active dispatch already advanced to the given status.
pub fn dispatch_with_status(identifier: &str, status: DispatchStatus) -> ActiveDispatch {
    ActiveDispatch { status, ..active_dispatch(identifier) }
}

pub fn completed_dispatch(identifier: &str, status: CompletionStatus) -> CompletedDispatch {
    CompletedDispatch {
        issue_identifier: identifier.to_string(),
        tier: Tier::Junior,
        status,
        completed_at_ms: 2_000_000,
        total_attempts: 1,
        pr_url: None,
        project: None,
    }
}

pub fn worker_mapping(identifier: &str, attempt: u32) -> SessionMapping {
    SessionMapping::new(identifier, SessionPhase::Worker, attempt)
}

pub fn audit_mapping(identifier: &str, attempt: u32) -> SessionMapping {
    SessionMapping::new(identifier, SessionPhase::Audit, attempt)
}
