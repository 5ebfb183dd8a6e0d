// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue tracker port.
//!
//! The engine is protocol-agnostic: whatever speaks GraphQL, REST, or
//! webhooks to the tracker implements this trait. Tracker failures never
//! decide a dispatch's fate; callers log and continue.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from issue tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("issue not found: {0}")]
    NotFound(String),
    #[error("tracker request failed: {0}")]
    RequestFailed(String),
}

/// An issue as the engine sees it.
#[derive(Debug, Clone, Default)]
pub struct Issue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub comments: Vec<String>,
}

/// A streamed progress entry attached to an agent session in the tracker UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueActivity {
    /// Agent reasoning excerpt.
    Thought { body: String },
    /// Tool invocation or result.
    Action { action: String, parameter: String },
}

/// Port to the issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync + 'static {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError>;

    async fn post_comment(&self, issue_id: &str, markdown: &str) -> Result<(), TrackerError>;

    /// Attach a progress entry to an agent session's activity feed.
    async fn emit_activity(
        &self,
        session_id: &str,
        activity: IssueActivity,
    ) -> Result<(), TrackerError>;
}
