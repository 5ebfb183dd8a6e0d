// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent run wrapper: watchdog envelope, activity streaming, retry-once.
//!
//! Every agent run goes through here. Streamed events feed the watchdog and
//! the tracker's activity feed; a watchdog kill aborts the runner and, once
//! per run, earns a retry. Non-watchdog failures are never retried.

use crate::engine::DispatchEngine;
use crate::watchdog::Watchdog;
use claw_adapters::{
    AgentProfiles, AgentRunner, IssueActivity, IssueTracker, Notifier, NotifyKind, NotifyPayload,
    PromptBuilder, RunOutput, RunRequest, RunnerError, StreamEvent,
};
use claw_core::Clock;
use claw_storage::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Minimum reasoning chunk length forwarded as a thought activity.
const MIN_THOUGHT_CHARS: usize = 10;
const THOUGHT_MAX_CHARS: usize = 500;
const TOOL_RESULT_MAX_CHARS: usize = 300;
const TOOL_START_MAX_CHARS: usize = 200;

/// How long an aborted runner gets to return before we stop waiting for it.
const ABORT_GRACE: Duration = Duration::from_secs(10);

/// Outcome of a wrapped agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResult {
    Success { output: String },
    Failure { reason: String, output: Option<String> },
    Killed { silence_ms: u64, output: Option<String> },
}

impl<S, T, R, N, P, F, C> DispatchEngine<S, T, R, N, P, F, C>
where
    S: StateStore,
    T: IssueTracker,
    R: AgentRunner,
    N: Notifier,
    P: PromptBuilder,
    F: AgentProfiles,
    C: Clock,
{
    /// Run an agent with up to two attempts; only a watchdog kill earns the
    /// retry.
    pub(crate) async fn run_agent(
        &self,
        agent_id: &str,
        session_key: &str,
        message: &str,
        identifier: &str,
    ) -> AgentResult {
        let first = self.run_agent_once(agent_id, session_key, message).await;
        match first {
            AgentResult::Killed { silence_ms, .. } => {
                tracing::warn!(
                    %session_key,
                    silence_ms,
                    "watchdog killed agent run, retrying once"
                );
                self.emit_activity(
                    session_key,
                    IssueActivity::Action {
                        action: "watchdog".into(),
                        parameter: "retrying after inactivity kill".into(),
                    },
                )
                .await;
                self.notify(
                    NotifyKind::WatchdogKill,
                    NotifyPayload::new(identifier, "")
                        .status("working")
                        .reason("inactivity"),
                )
                .await;
                self.run_agent_once(agent_id, session_key, message).await
            }
            other => other,
        }
    }

    async fn run_agent_once(
        &self,
        agent_id: &str,
        session_key: &str,
        message: &str,
    ) -> AgentResult {
        let config = self.watchdog_config_for(agent_id);

        let killed_signal = Arc::new(Notify::new());
        let watchdog = {
            let signal = Arc::clone(&killed_signal);
            Watchdog::new(config, self.clock.clone(), move |_reason| {
                signal.notify_one();
            })
        };
        watchdog.start();

        // Stream consumer: every event is liveness; some become tracker
        // activities. Ends when the runner drops its sender.
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
        let consumer = {
            let watchdog = watchdog.clone();
            let tracker = Arc::clone(&self.tracker);
            let session = session_key.to_string();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    watchdog.tick();
                    if let Some(activity) = translate_stream_event(&event) {
                        if let Err(e) = tracker.emit_activity(&session, activity).await {
                            tracing::debug!(session = %session, error = %e, "activity emission failed");
                        }
                    }
                }
            })
        };

        let request = RunRequest::new(agent_id, session_key, message)
            .timeout_ms(config.max_total_ms)
            .stream(tx);
        let deadline = Duration::from_millis(config.max_total_ms);

        let run_fut = self.runner.run(request);
        tokio::pin!(run_fut);

        let result = tokio::select! {
            res = &mut run_fut => {
                watchdog.stop();
                let _ = consumer.await;
                classify(res, &watchdog)
            }
            _ = killed_signal.notified() => {
                // Kill propagation: abort the backend, then collect whatever
                // the unblocked run future returns.
                self.runner.abort(session_key).await;
                let res = match tokio::time::timeout(ABORT_GRACE, &mut run_fut).await {
                    Ok(res) => res,
                    Err(_) => Err(RunnerError::RunFailed("runner did not stop after abort".into())),
                };
                watchdog.stop();
                consumer.abort();
                classify(res, &watchdog)
            }
            _ = tokio::time::sleep(deadline) => {
                watchdog.stop();
                self.runner.abort(session_key).await;
                consumer.abort();
                tracing::warn!(%session_key, deadline_ms = config.max_total_ms, "agent run hit wall-clock deadline");
                AgentResult::Failure {
                    reason: "wall-clock session deadline exceeded".into(),
                    output: None,
                }
            }
        };
        result
    }
}

fn classify<C: Clock>(
    result: Result<RunOutput, RunnerError>,
    watchdog: &Watchdog<C>,
) -> AgentResult {
    if watchdog.was_killed() {
        let output = result.ok().map(|o| o.output).filter(|o| !o.is_empty());
        return AgentResult::Killed { silence_ms: watchdog.silence_ms(), output };
    }
    match result {
        Ok(RunOutput { success: true, output }) => AgentResult::Success { output },
        Ok(RunOutput { success: false, output }) => AgentResult::Failure {
            reason: "agent reported failure".into(),
            output: Some(output),
        },
        Err(e) => AgentResult::Failure { reason: e.to_string(), output: None },
    }
}

/// Map a stream event to its tracker activity, if it warrants one.
fn translate_stream_event(event: &StreamEvent) -> Option<IssueActivity> {
    match event {
        StreamEvent::Reasoning { text } => {
            let trimmed = text.trim();
            if trimmed.chars().count() >= MIN_THOUGHT_CHARS {
                Some(IssueActivity::Thought { body: truncate_chars(trimmed, THOUGHT_MAX_CHARS) })
            } else {
                None
            }
        }
        StreamEvent::ToolResult { tool, output } => Some(IssueActivity::Action {
            action: tool.clone(),
            parameter: truncate_chars(output, TOOL_RESULT_MAX_CHARS),
        }),
        StreamEvent::ToolStart { tool, meta } => Some(IssueActivity::Action {
            action: tool.clone(),
            parameter: truncate_chars(meta, TOOL_START_MAX_CHARS),
        }),
        StreamEvent::PartialReply { .. } => None,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
#[path = "agent_run_tests.rs"]
mod tests;
