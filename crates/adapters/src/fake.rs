// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake port implementations for testing.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::notify::{Notifier, NotifyError, NotifyKind, NotifyPayload};
use crate::profiles::AgentProfiles;
use crate::prompt::{PromptBuilder, PromptSection, PromptVars};
use crate::runner::{AgentRunner, RunOutput, RunRequest, RunnerError};
use crate::stream::StreamEvent;
use crate::tracker::{Issue, IssueActivity, IssueTracker, TrackerError};
use async_trait::async_trait;
use claw_core::WatchdogOverrides;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

// ── Issue tracker ───────────────────────────────────────────────────────

#[derive(Default)]
struct TrackerState {
    issues: HashMap<String, Issue>,
    comments: Vec<(String, String)>,
    activities: Vec<(String, IssueActivity)>,
    fail_comments: bool,
}

/// In-memory issue tracker that records comments and activities.
#[derive(Clone, Default)]
pub struct FakeIssueTracker {
    inner: Arc<Mutex<TrackerState>>,
}

impl FakeIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&self, issue: Issue) {
        self.inner.lock().issues.insert(issue.id.clone(), issue);
    }

    /// Make every `post_comment` fail, for error-swallowing tests.
    pub fn fail_comments(&self) {
        self.inner.lock().fail_comments = true;
    }

    /// Recorded `(issue_id, markdown)` comment pairs.
    pub fn comments(&self) -> Vec<(String, String)> {
        self.inner.lock().comments.clone()
    }

    /// Recorded `(session_id, activity)` pairs.
    pub fn activities(&self) -> Vec<(String, IssueActivity)> {
        self.inner.lock().activities.clone()
    }
}

#[async_trait]
impl IssueTracker for FakeIssueTracker {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        self.inner
            .lock()
            .issues
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(issue_id.to_string()))
    }

    async fn post_comment(&self, issue_id: &str, markdown: &str) -> Result<(), TrackerError> {
        let mut state = self.inner.lock();
        if state.fail_comments {
            return Err(TrackerError::RequestFailed("comment rejected".into()));
        }
        state.comments.push((issue_id.to_string(), markdown.to_string()));
        Ok(())
    }

    async fn emit_activity(
        &self,
        session_id: &str,
        activity: IssueActivity,
    ) -> Result<(), TrackerError> {
        self.inner.lock().activities.push((session_id.to_string(), activity));
        Ok(())
    }
}

// ── Agent runner ────────────────────────────────────────────────────────

/// One scripted agent run consumed by [`FakeAgentRunner::run`].
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Emit `stream` events, then finish with the given outcome.
    Complete { success: bool, output: String, stream: Vec<StreamEvent> },
    /// Return a runner-level error.
    Error { reason: String },
    /// Pend until `abort` is called for the session, then finish unsuccessfully.
    StallUntilAbort,
}

impl ScriptedRun {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Complete { success: true, output: output.into(), stream: Vec::new() }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self::Complete { success: false, output: output.into(), stream: Vec::new() }
    }

    pub fn success_with_stream(output: impl Into<String>, stream: Vec<StreamEvent>) -> Self {
        Self::Complete { success: true, output: output.into(), stream }
    }
}

/// A recorded `run` invocation.
#[derive(Debug, Clone)]
pub struct RunCall {
    pub agent_id: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Default)]
struct RunnerState {
    script: VecDeque<ScriptedRun>,
    calls: Vec<RunCall>,
    aborted: Vec<String>,
    stalls: HashMap<String, Arc<Notify>>,
}

/// Scripted agent runner.
///
/// Runs consume scripted outcomes in FIFO order; an empty script yields a
/// successful empty run so incidental calls don't panic.
#[derive(Clone, Default)]
pub struct FakeAgentRunner {
    inner: Arc<Mutex<RunnerState>>,
}

impl FakeAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, run: ScriptedRun) {
        self.inner.lock().script.push_back(run);
    }

    pub fn calls(&self) -> Vec<RunCall> {
        self.inner.lock().calls.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.inner.lock().aborted.clone()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutput, RunnerError> {
        let step = {
            let mut state = self.inner.lock();
            state.calls.push(RunCall {
                agent_id: request.agent_id.clone(),
                session_id: request.session_id.clone(),
                message: request.message.clone(),
            });
            state.script.pop_front()
        };

        match step {
            None => Ok(RunOutput { success: true, output: String::new() }),
            Some(ScriptedRun::Complete { success, output, stream }) => {
                if let Some(tx) = request.stream {
                    for event in stream {
                        let _ = tx.send(event).await;
                    }
                }
                Ok(RunOutput { success, output })
            }
            Some(ScriptedRun::Error { reason }) => Err(RunnerError::RunFailed(reason)),
            Some(ScriptedRun::StallUntilAbort) => {
                let notify = {
                    let mut state = self.inner.lock();
                    Arc::clone(state.stalls.entry(request.session_id.clone()).or_default())
                };
                notify.notified().await;
                Ok(RunOutput { success: false, output: "run aborted".into() })
            }
        }
    }

    async fn abort(&self, session_id: &str) {
        let notify = {
            let mut state = self.inner.lock();
            state.aborted.push(session_id.to_string());
            state.stalls.get(session_id).cloned()
        };
        if let Some(notify) = notify {
            notify.notify_one();
        }
    }
}

// ── Notifier ────────────────────────────────────────────────────────────

/// Notifier that records every call.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<Mutex<Vec<(NotifyKind, NotifyPayload)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(NotifyKind, NotifyPayload)> {
        self.calls.lock().clone()
    }

    /// Just the kinds, in emission order.
    pub fn kinds(&self) -> Vec<NotifyKind> {
        self.calls.lock().iter().map(|(k, _)| *k).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, kind: NotifyKind, payload: NotifyPayload) -> Result<(), NotifyError> {
        self.calls.lock().push((kind, payload));
        Ok(())
    }
}

// ── Prompt builder ──────────────────────────────────────────────────────

/// Deterministic prompt builder: renders section name plus key variables so
/// tests can assert on prompt content.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPromptBuilder;

impl PromptBuilder for StaticPromptBuilder {
    fn render(&self, section: PromptSection, vars: &PromptVars) -> String {
        format!(
            "[{section}] {} attempt={} title={} gaps={}",
            vars.identifier,
            vars.attempt,
            vars.title,
            vars.gaps.join("; "),
        )
    }
}

// ── Agent profiles ──────────────────────────────────────────────────────

/// Profile source backed by a static map.
#[derive(Clone, Default)]
pub struct StaticProfiles {
    overrides: Arc<Mutex<HashMap<String, WatchdogOverrides>>>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, agent_id: impl Into<String>, overrides: WatchdogOverrides) {
        self.overrides.lock().insert(agent_id.into(), overrides);
    }
}

impl AgentProfiles for StaticProfiles {
    fn watchdog_overrides(&self, agent_id: &str) -> Option<WatchdogOverrides> {
        self.overrides.lock().get(agent_id).copied()
    }
}
