// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch records and the status state machine.
//!
//! A dispatch is the unit of work per issue: one pass through the
//! worker → audit → verdict pipeline with possibly multiple attempts.
//! `DispatchStatus` encodes the legal transition graph; every mutation of a
//! record goes through a CAS transition that observes an expected source
//! status and fails without side effects on mismatch.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Externally-chosen complexity label. Carried for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Junior,
    Medior,
    Senior,
}

crate::simple_display! {
    Tier {
        Junior => "junior",
        Medior => "medior",
        Senior => "senior",
    }
}

/// Status of an active dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Dispatched,
    Working,
    Auditing,
    Done,
    Failed,
    Stuck,
}

crate::simple_display! {
    DispatchStatus {
        Dispatched => "dispatched",
        Working => "working",
        Auditing => "auditing",
        Done => "done",
        Failed => "failed",
        Stuck => "stuck",
    }
}

impl<'de> Deserialize<'de> for DispatchStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "dispatched" => Ok(DispatchStatus::Dispatched),
            // Historical status written by older releases.
            "working" | "running" => Ok(DispatchStatus::Working),
            "auditing" => Ok(DispatchStatus::Auditing),
            "done" => Ok(DispatchStatus::Done),
            "failed" => Ok(DispatchStatus::Failed),
            "stuck" => Ok(DispatchStatus::Stuck),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["dispatched", "working", "auditing", "done", "failed", "stuck"],
            )),
        }
    }
}

impl DispatchStatus {
    /// Whether `self → to` is a legal edge of the state machine.
    ///
    /// `done` moves the record to the completed map; `stuck` parks it for
    /// human escalation. Any non-terminal status may be escalated to `stuck`.
    pub fn can_transition(self, to: DispatchStatus) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, to),
            (Dispatched, Working)
                | (Working, Auditing)
                | (Auditing, Done)
                | (Auditing, Working)
                | (Dispatched, Stuck)
                | (Working, Stuck)
                | (Auditing, Stuck)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchStatus::Done | DispatchStatus::Failed | DispatchStatus::Stuck)
    }
}

/// Terminal status of a completed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Done,
    Failed,
}

crate::simple_display! {
    CompletionStatus {
        Done => "done",
        Failed => "failed",
    }
}

/// One issue currently in flight through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDispatch {
    pub issue_id: String,
    /// Human-readable issue identifier (e.g. `CT-100`); also the record key.
    pub issue_identifier: String,
    pub branch: String,
    /// Opaque workspace pointer; may encode a multi-repo mapping.
    pub worktree_path: PathBuf,
    pub tier: Tier,
    /// Display only; the engine never interprets it.
    pub model: String,
    pub status: DispatchStatus,
    /// 0-based attempt counter; bumped on rework.
    #[serde(default)]
    pub attempt: u32,
    pub dispatched_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Snapshot of a dispatch that reached a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedDispatch {
    pub issue_identifier: String,
    pub tier: Tier,
    pub status: CompletionStatus,
    pub completed_at_ms: u64,
    pub total_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Inputs for moving an active dispatch to the completed map.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub status: CompletionStatus,
    pub completed_at_ms: u64,
    pub pr_url: Option<String>,
}

impl CompletionRecord {
    pub fn new(status: CompletionStatus, completed_at_ms: u64) -> Self {
        Self { status, completed_at_ms, pr_url: None }
    }

    crate::setters! {
        option { pr_url: String }
    }
}

/// Optional field updates applied together with a CAS transition.
///
/// Session-key fields are tri-state: `None` leaves the field untouched,
/// `Some(None)` clears it, `Some(Some(k))` sets it.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub attempt: Option<u32>,
    pub stuck_reason: Option<String>,
    pub agent_session_id: Option<String>,
    pub worker_session_key: Option<Option<String>>,
    pub audit_session_key: Option<Option<String>>,
}

impl TransitionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    crate::setters! {
        option {
            attempt: u32,
            stuck_reason: String,
            agent_session_id: String,
        }
    }

    pub fn worker_session_key(mut self, key: impl Into<String>) -> Self {
        self.worker_session_key = Some(Some(key.into()));
        self
    }

    pub fn audit_session_key(mut self, key: impl Into<String>) -> Self {
        self.audit_session_key = Some(Some(key.into()));
        self
    }

    pub fn clear_audit_session_key(mut self) -> Self {
        self.audit_session_key = Some(None);
        self
    }

    /// Apply the patch to a record. Status is owned by the transition itself.
    pub fn apply(&self, dispatch: &mut ActiveDispatch) {
        if let Some(attempt) = self.attempt {
            dispatch.attempt = attempt;
        }
        if let Some(ref reason) = self.stuck_reason {
            dispatch.stuck_reason = Some(reason.clone());
        }
        if let Some(ref sid) = self.agent_session_id {
            dispatch.agent_session_id = Some(sid.clone());
        }
        if let Some(ref key) = self.worker_session_key {
            dispatch.worker_session_key = key.clone();
        }
        if let Some(ref key) = self.audit_session_key {
            dispatch.audit_session_key = key.clone();
        }
    }
}

/// A CAS transition was rejected. The state document is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no active dispatch for {identifier}")]
    NotFound { identifier: String },

    #[error("dispatch {identifier} already active")]
    AlreadyActive { identifier: String },

    #[error(
        "dispatch {identifier} is {actual}, expected {expected} (transition to {target} rejected)"
    )]
    StatusMismatch {
        identifier: String,
        expected: DispatchStatus,
        actual: DispatchStatus,
        target: DispatchStatus,
    },

    #[error("illegal transition {from} -> {to} for {identifier}")]
    Illegal { identifier: String, from: DispatchStatus, to: DispatchStatus },
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
