// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook adapter: external "agent finished" signals re-enter the pipeline.
//!
//! Completion signals arrive with nothing but a session key, the agent's
//! output, and a success flag, possibly long after the engine that started
//! the run died. The persisted session map routes them to the right dispatch
//! and phase; signals for unknown sessions or superseded attempts are
//! silently dropped.

use crate::engine::DispatchEngine;
use crate::error::EngineError;
use claw_adapters::{AgentProfiles, AgentRunner, IssueTracker, Notifier, PromptBuilder};
use claw_core::{Clock, SessionPhase};
use claw_storage::StateStore;

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
    /// Route an out-of-band completion signal into the pipeline.
    pub async fn handle_agent_completion(
        &self,
        session_key: &str,
        output: &str,
        success: bool,
    ) -> Result<(), EngineError> {
        let state = self.store.read()?;
        let Some(mapping) = state.lookup_session(session_key).cloned() else {
            tracing::debug!(%session_key, "completion for unknown session ignored");
            return Ok(());
        };
        let Some(dispatch) = state.active(&mapping.dispatch_id).cloned() else {
            tracing::debug!(
                %session_key,
                dispatch = %mapping.dispatch_id,
                "completion for finished dispatch ignored"
            );
            return Ok(());
        };

        // Stale event rejection: an older run finishing after a newer one
        // started must not advance the pipeline.
        if dispatch.attempt != mapping.attempt {
            tracing::info!(
                %session_key,
                session_attempt = mapping.attempt,
                current_attempt = dispatch.attempt,
                "stale completion rejected"
            );
            return Ok(());
        }

        let identifier = dispatch.issue_identifier.clone();
        let issue = self.issue_context_for(&dispatch).await;
        tracing::info!(
            %identifier,
            phase = %mapping.phase,
            attempt = mapping.attempt,
            success,
            "agent completion received"
        );

        match mapping.phase {
            SessionPhase::Worker => {
                self.save_artifact(&identifier, mapping.attempt, SessionPhase::Worker, output);
                if !success {
                    tracing::warn!(%identifier, "worker reported failure; audit decides anyway");
                }
                self.trigger_audit(&identifier, &issue, mapping.attempt).await?;
            }
            SessionPhase::Audit => {
                self.save_artifact(&identifier, mapping.attempt, SessionPhase::Audit, output);
                self.process_verdict(&identifier, &issue, mapping.attempt, output).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
