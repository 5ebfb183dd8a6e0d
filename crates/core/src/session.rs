// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session keys and the session → dispatch mapping.
//!
//! A session key identifies a single agent run. External completion signals
//! carry only the session key; the mapping joins them back to a dispatch,
//! phase, and attempt so stale or unknown signals can be rejected.

use serde::{Deserialize, Serialize};

/// Which pipeline phase an agent session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Worker,
    Audit,
}

crate::simple_display! {
    SessionPhase {
        Worker => "worker",
        Audit => "audit",
    }
}

/// Joins an agent session back to its dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMapping {
    pub dispatch_id: String,
    pub phase: SessionPhase,
    #[serde(default)]
    pub attempt: u32,
}

impl SessionMapping {
    pub fn new(dispatch_id: impl Into<String>, phase: SessionPhase, attempt: u32) -> Self {
        Self { dispatch_id: dispatch_id.into(), phase, attempt }
    }
}

/// Session key for a worker run of the given attempt.
pub fn worker_session_key(identifier: &str, attempt: u32) -> String {
    format!("linear-worker-{identifier}-{attempt}")
}

/// Session key for an audit run of the given attempt.
pub fn audit_session_key(identifier: &str, attempt: u32) -> String {
    format!("linear-audit-{identifier}-{attempt}")
}

/// Idempotency key guarding the audit trigger for one attempt.
pub fn audit_trigger_event_key(identifier: &str, attempt: u32) -> String {
    format!("audit-trigger:{identifier}:{attempt}")
}

/// Idempotency key guarding verdict processing for one attempt.
pub fn verdict_event_key(identifier: &str, attempt: u32) -> String {
    format!("verdict:{identifier}:{attempt}")
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
