// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification port.
//!
//! Notifications are advisory: failures are logged by callers and never
//! affect dispatch state.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// What happened to a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Dispatch,
    Working,
    Auditing,
    AuditPass,
    AuditFail,
    Escalation,
    Stuck,
    WatchdogKill,
}

claw_core::simple_display! {
    NotifyKind {
        Dispatch => "dispatch",
        Working => "working",
        Auditing => "auditing",
        AuditPass => "audit_pass",
        AuditFail => "audit_fail",
        Escalation => "escalation",
        Stuck => "stuck",
        WatchdogKill => "watchdog_kill",
    }
}

/// Audit outcome digest carried on audit notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictSummary {
    pub pass: bool,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyPayload {
    pub identifier: String,
    pub title: String,
    pub status: String,
    pub attempt: Option<u32>,
    pub reason: Option<String>,
    pub verdict: Option<VerdictSummary>,
}

impl NotifyPayload {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), title: title.into(), ..Default::default() }
    }

    claw_core::setters! {
        into { status: String }
        option { attempt: u32, reason: String }
    }

    pub fn verdict(mut self, pass: bool, gaps: Vec<String>) -> Self {
        self.verdict = Some(VerdictSummary { pass, gaps });
        self
    }
}

/// Port to the notification channels.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, kind: NotifyKind, payload: NotifyPayload) -> Result<(), NotifyError>;
}
