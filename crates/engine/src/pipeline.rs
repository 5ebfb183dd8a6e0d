// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The four-phase dispatch pipeline: worker, audit, verdict, rework.
//!
//! The engine decides when the audit runs and what its verdict means; the
//! worker agent has no say in either. Every phase boundary is a CAS transition in the locked
//! store plus an idempotency guard, so duplicate completion signals and
//! concurrent monitors collapse into a single execution per attempt.

use crate::agent_run::AgentResult;
use crate::engine::{DispatchEngine, IssueContext};
use crate::error::EngineError;
use crate::verdict::{parse_verdict, AuditVerdict};
use claw_adapters::{
    AgentProfiles, AgentRunner, IssueTracker, Notifier, NotifyKind, NotifyPayload, PromptBuilder,
    PromptSection, PromptVars,
};
use claw_core::{
    audit_session_key, audit_trigger_event_key, verdict_event_key, worker_session_key,
    ActiveDispatch, Clock, CompletionRecord, CompletionStatus, DispatchStatus, SessionMapping,
    SessionPhase, TransitionPatch,
};
use claw_storage::{StateStore, StoreError};

/// Agent profile executing worker runs.
pub(crate) const WORKER_AGENT_ID: &str = "worker";
/// Agent profile executing audit runs; always a distinct session.
pub(crate) const AUDITOR_AGENT_ID: &str = "auditor";

pub const STUCK_WATCHDOG_KILL: &str = "watchdog_kill_2x";
pub const STUCK_WORKER_FAILED: &str = "worker_failed";
pub const STUCK_AUDIT_MAX_ATTEMPTS: &str = "audit_failed_max_attempts";

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
    /// Register a dispatch and drive it through the pipeline.
    ///
    /// Fails fast if the issue is already in flight; an engine crash after
    /// registration is recovered by the hook adapter or the monitor.
    pub async fn register_dispatch(
        &self,
        draft: ActiveDispatch,
        issue: IssueContext,
    ) -> Result<(), EngineError> {
        let identifier = draft.issue_identifier.clone();
        let title = issue.title.clone();
        self.store.register(draft).await?;
        tracing::info!(%identifier, "dispatch registered");
        self.notify(
            NotifyKind::Dispatch,
            NotifyPayload::new(&identifier, &title).status("dispatched"),
        )
        .await;
        self.spawn_worker(&identifier, &issue).await
    }

    /// First worker attempt: CAS `dispatched → working` and run.
    async fn spawn_worker(&self, identifier: &str, issue: &IssueContext) -> Result<(), EngineError> {
        let attempt = 0;
        let session_key = worker_session_key(identifier, attempt);
        let mapping = SessionMapping::new(identifier, SessionPhase::Worker, attempt);
        // A CAS failure here aborts the whole pipeline: someone else owns
        // this dispatch.
        self.store
            .transition(
                identifier,
                DispatchStatus::Dispatched,
                DispatchStatus::Working,
                TransitionPatch::new().worker_session_key(session_key.clone()),
                Some((session_key.clone(), mapping.clone())),
            )
            .await?;
        self.registry.insert(session_key.clone(), mapping);

        self.run_worker_attempt(identifier, issue, attempt, session_key, None).await
    }

    /// Run one worker attempt to completion and hand off to the audit.
    ///
    /// The caller has already transitioned the dispatch to `working` and
    /// registered the session mapping for `session_key`.
    async fn run_worker_attempt(
        &self,
        identifier: &str,
        issue: &IssueContext,
        attempt: u32,
        session_key: String,
        gaps: Option<Vec<String>>,
    ) -> Result<(), EngineError> {
        self.notify(
            NotifyKind::Working,
            NotifyPayload::new(identifier, &issue.title).status("working").attempt(attempt),
        )
        .await;

        let section = if gaps.is_some() { PromptSection::Rework } else { PromptSection::Worker };
        let vars = match self.prompt_vars(identifier, issue, attempt, gaps.unwrap_or_default()) {
            Some(vars) => vars,
            None => return Ok(()), // dispatch vanished; nothing to drive
        };
        let prompt = self.prompts.render(section, &vars);

        tracing::info!(%identifier, attempt, session = %session_key, "worker run starting");
        let result = self.run_agent(WORKER_AGENT_ID, &session_key, &prompt, identifier).await;

        match result {
            AgentResult::Killed { silence_ms, .. } => {
                tracing::warn!(%identifier, attempt, silence_ms, "worker killed twice by watchdog");
                self.escalate(identifier, issue, DispatchStatus::Working, STUCK_WATCHDOG_KILL)
                    .await
            }
            AgentResult::Failure { reason, .. } => {
                tracing::warn!(%identifier, attempt, %reason, "worker run failed");
                self.escalate(identifier, issue, DispatchStatus::Working, STUCK_WORKER_FAILED)
                    .await
            }
            AgentResult::Success { output } => {
                self.save_artifact(identifier, attempt, SessionPhase::Worker, &output);
                // The audit is invoked by pipeline code, never by the worker.
                self.trigger_audit(identifier, issue, attempt).await.map(|_| ())
            }
        }
    }

    /// Run the audit for an attempt, once.
    ///
    /// Entry points: worker completion (in-process), the hook adapter for
    /// out-of-band completions, and the monitor's missed-audit recovery.
    /// Returns whether this call actually ran the audit.
    pub async fn trigger_audit(
        &self,
        identifier: &str,
        issue: &IssueContext,
        attempt: u32,
    ) -> Result<bool, EngineError> {
        let event_key = audit_trigger_event_key(identifier, attempt);
        if !self.store.mark_event_processed(&event_key).await? {
            tracing::debug!(%identifier, attempt, "duplicate audit trigger absorbed");
            return Ok(false);
        }

        let session_key = audit_session_key(identifier, attempt);
        let mapping = SessionMapping::new(identifier, SessionPhase::Audit, attempt);
        match self
            .store
            .transition(
                identifier,
                DispatchStatus::Working,
                DispatchStatus::Auditing,
                TransitionPatch::new().audit_session_key(session_key.clone()),
                Some((session_key.clone(), mapping.clone())),
            )
            .await
        {
            Ok(()) => {}
            // A concurrent transition already moved the dispatch; this
            // trigger loses the race and stands down.
            Err(StoreError::Transition(e)) => {
                tracing::warn!(%identifier, attempt, error = %e, "audit trigger CAS rejected");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        self.registry.insert(session_key.clone(), mapping);

        self.notify(
            NotifyKind::Auditing,
            NotifyPayload::new(identifier, &issue.title).status("auditing").attempt(attempt),
        )
        .await;

        let vars = match self.prompt_vars(identifier, issue, attempt, Vec::new()) {
            Some(vars) => vars,
            None => return Ok(false),
        };
        let prompt = self.prompts.render(PromptSection::Audit, &vars);

        tracing::info!(%identifier, attempt, session = %session_key, "audit run starting");
        let result = self.run_agent(AUDITOR_AGENT_ID, &session_key, &prompt, identifier).await;

        // A broken audit run yields output that cannot parse as a verdict,
        // which the verdict step treats as a fail: rework up to the ceiling,
        // then escalation. The auditor never gets to time out a pass.
        let output = match result {
            AgentResult::Success { output } => output,
            AgentResult::Failure { reason, output } => {
                tracing::warn!(%identifier, attempt, %reason, "audit run failed");
                output.unwrap_or_else(|| format!("audit run failed: {reason}"))
            }
            AgentResult::Killed { silence_ms, output } => {
                tracing::warn!(%identifier, attempt, silence_ms, "audit run killed by watchdog");
                output.unwrap_or_else(|| format!("audit run killed after {silence_ms} ms silence"))
            }
        };

        self.save_artifact(identifier, attempt, SessionPhase::Audit, &output);
        self.process_verdict(identifier, issue, attempt, &output).await?;
        Ok(true)
    }

    /// Decide a dispatch's fate from the auditor's output, once per attempt.
    pub async fn process_verdict(
        &self,
        identifier: &str,
        issue: &IssueContext,
        attempt: u32,
        output: &str,
    ) -> Result<(), EngineError> {
        let event_key = verdict_event_key(identifier, attempt);
        if !self.store.mark_event_processed(&event_key).await? {
            tracing::debug!(%identifier, attempt, "duplicate verdict absorbed");
            return Ok(());
        }

        let verdict = parse_verdict(output);
        tracing::info!(
            %identifier,
            attempt,
            pass = verdict.pass,
            gaps = verdict.gaps.len(),
            "verdict processed"
        );

        if verdict.pass {
            return self.finish_passed(identifier, issue, &verdict).await;
        }

        let next_attempt = attempt + 1;
        if next_attempt <= self.config.max_rework_attempts {
            self.start_rework(identifier, issue, next_attempt, verdict).await
        } else {
            tracing::warn!(%identifier, attempt, "rework attempts exhausted");
            self.escalate(identifier, issue, DispatchStatus::Auditing, STUCK_AUDIT_MAX_ATTEMPTS)
                .await
        }
    }

    async fn finish_passed(
        &self,
        identifier: &str,
        issue: &IssueContext,
        verdict: &AuditVerdict,
    ) -> Result<(), EngineError> {
        match self
            .store
            .transition(
                identifier,
                DispatchStatus::Auditing,
                DispatchStatus::Done,
                TransitionPatch::new(),
                None,
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::Transition(e)) => {
                tracing::warn!(%identifier, error = %e, "pass verdict CAS rejected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let mut record = CompletionRecord::new(CompletionStatus::Done, self.now_ms());
        if let Some(ref pr_url) = verdict.pr_url {
            record = record.pr_url(pr_url.clone());
        }
        let completed = self.store.complete(identifier, record).await?;
        self.registry.remove_for_dispatch(identifier);
        tracing::info!(%identifier, total_attempts = completed.total_attempts, "dispatch done");

        self.post_comment(&issue.issue_id, &approval_comment(verdict)).await;
        self.notify(
            NotifyKind::AuditPass,
            NotifyPayload::new(identifier, &issue.title)
                .status("done")
                .verdict(true, Vec::new()),
        )
        .await;
        Ok(())
    }

    async fn start_rework(
        &self,
        identifier: &str,
        issue: &IssueContext,
        next_attempt: u32,
        verdict: AuditVerdict,
    ) -> Result<(), EngineError> {
        let session_key = worker_session_key(identifier, next_attempt);
        let mapping = SessionMapping::new(identifier, SessionPhase::Worker, next_attempt);
        match self
            .store
            .transition(
                identifier,
                DispatchStatus::Auditing,
                DispatchStatus::Working,
                TransitionPatch::new()
                    .attempt(next_attempt)
                    .clear_audit_session_key()
                    .worker_session_key(session_key.clone()),
                Some((session_key.clone(), mapping.clone())),
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::Transition(e)) => {
                tracing::warn!(%identifier, error = %e, "rework CAS rejected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.registry.insert(session_key.clone(), mapping);

        self.notify(
            NotifyKind::AuditFail,
            NotifyPayload::new(identifier, &issue.title)
                .status("working")
                .attempt(next_attempt)
                .verdict(false, verdict.gaps.clone()),
        )
        .await;

        // Boxed: rework re-enters the worker phase, which flows back through
        // audit and verdict.
        Box::pin(self.run_worker_attempt(
            identifier,
            issue,
            next_attempt,
            session_key,
            Some(verdict.gaps),
        ))
        .await
    }

    /// Park a dispatch as `stuck` and tell the humans: one comment, one
    /// escalation notification, exactly once per terminal failure.
    pub(crate) async fn escalate(
        &self,
        identifier: &str,
        issue: &IssueContext,
        expected_from: DispatchStatus,
        reason: &str,
    ) -> Result<(), EngineError> {
        match self
            .store
            .transition(
                identifier,
                expected_from,
                DispatchStatus::Stuck,
                TransitionPatch::new().stuck_reason(reason),
                None,
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::Transition(e)) => {
                tracing::warn!(%identifier, %reason, error = %e, "escalation CAS rejected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::warn!(%identifier, %reason, "dispatch stuck");

        // Single deployment-wide policy: either stuck dispatches terminate
        // as failed, or they stay active for humans to find.
        if self.config.complete_stuck_dispatches {
            let record = CompletionRecord::new(CompletionStatus::Failed, self.now_ms());
            if let Err(e) = self.store.complete(identifier, record).await {
                tracing::warn!(%identifier, error = %e, "completing stuck dispatch failed");
            } else {
                self.registry.remove_for_dispatch(identifier);
            }
        }

        self.post_comment(&issue.issue_id, &escalation_comment(identifier, reason)).await;
        self.notify(
            NotifyKind::Escalation,
            NotifyPayload::new(identifier, &issue.title).status("stuck").reason(reason),
        )
        .await;
        Ok(())
    }

    /// Prompt variables from the live dispatch record; `None` if the
    /// dispatch is gone (cancelled underneath us).
    fn prompt_vars(
        &self,
        identifier: &str,
        issue: &IssueContext,
        attempt: u32,
        gaps: Vec<String>,
    ) -> Option<PromptVars> {
        let state = match self.store.read() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(%identifier, error = %e, "state read failed building prompt vars");
                return None;
            }
        };
        let dispatch = match state.active(identifier) {
            Some(d) => d,
            None => {
                tracing::warn!(%identifier, "dispatch no longer active, abandoning run");
                return None;
            }
        };
        Some(PromptVars {
            identifier: identifier.to_string(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            worktree_path: dispatch.worktree_path.clone(),
            tier: dispatch.tier,
            attempt,
            gaps,
        })
    }
}

fn approval_comment(verdict: &AuditVerdict) -> String {
    let mut comment = String::from("**Audit passed**: work verified against the issue.\n");
    for criterion in &verdict.criteria {
        comment.push_str(&format!("- ✅ {criterion}\n"));
    }
    if let Some(ref results) = verdict.test_results {
        comment.push_str(&format!("\nTests: {results}\n"));
    }
    comment
}

fn escalation_comment(identifier: &str, reason: &str) -> String {
    format!(
        "**Dispatch escalated**: {identifier} needs human attention (reason: `{reason}`). \
         The agent has stopped working on this issue."
    )
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
