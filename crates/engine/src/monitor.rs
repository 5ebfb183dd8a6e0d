// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background monitor: stale sweep, missed-audit recovery, pruning.
//!
//! The monitor is the last line of defense. Whatever wedged a dispatch (a
//! crashed engine, a lost completion signal, a worker that never came back),
//! a later tick classifies it stuck, resumes its audit, or prunes its
//! leftovers. Each duty runs its own locked mutations to keep lock-hold
//! times short.

use crate::engine::{DispatchEngine, IssueContext};
use crate::error::EngineError;
use claw_adapters::{
    AgentProfiles, AgentRunner, IssueTracker, Notifier, NotifyKind, NotifyPayload, PromptBuilder,
};
use claw_core::{Clock, DispatchStatus, TransitionPatch};
use claw_storage::{StateStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const STUCK_STALE: &str = "stale_no_progress";

/// What one monitor tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub stale: usize,
    pub recovered: usize,
    pub pruned: usize,
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
    /// One pass of stale detection, recovery, and pruning.
    pub async fn monitor_tick(&self) -> Result<MonitorReport, EngineError> {
        let mut report = MonitorReport::default();
        let now_ms = self.now_ms();

        // Stale detection: anything in flight past the age limit goes stuck.
        let state = self.store.read()?;
        let stale: Vec<_> = state
            .dispatches
            .active
            .values()
            .filter(|d| {
                !d.status.is_terminal()
                    && now_ms.saturating_sub(d.dispatched_at_ms) > self.config.stale_max_age_ms
            })
            .map(|d| (d.issue_identifier.clone(), d.status))
            .collect();

        for (identifier, observed_status) in stale {
            // CAS from the status we just observed; a mismatch means a
            // concurrent transition beat us and the dispatch is not wedged.
            match self
                .store
                .transition(
                    &identifier,
                    observed_status,
                    DispatchStatus::Stuck,
                    TransitionPatch::new().stuck_reason(STUCK_STALE),
                    None,
                )
                .await
            {
                Ok(()) => {
                    tracing::warn!(%identifier, status = %observed_status, "stale dispatch marked stuck");
                    report.stale += 1;
                    self.notify(
                        NotifyKind::Stuck,
                        NotifyPayload::new(&identifier, "")
                            .status("stuck")
                            .reason(STUCK_STALE),
                    )
                    .await;
                }
                Err(StoreError::Transition(e)) => {
                    tracing::debug!(%identifier, error = %e, "stale sweep skipped dispatch");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Recovery: a worker session exists but no audit session does, so
        // the audit trigger was lost. The idempotency guard absorbs the cases
        // where it was not actually lost.
        let state = self.store.read()?;
        let orphaned: Vec<_> = state
            .dispatches
            .active
            .values()
            .filter(|d| {
                d.status == DispatchStatus::Working
                    && d.worker_session_key.is_some()
                    && d.audit_session_key.is_none()
            })
            .cloned()
            .collect();

        for dispatch in orphaned {
            let identifier = dispatch.issue_identifier.clone();
            let attempt = dispatch.attempt;
            let issue: IssueContext = self.issue_context_for(&dispatch).await;
            match self.trigger_audit(&identifier, &issue, attempt).await {
                Ok(true) => {
                    tracing::info!(%identifier, attempt, "recovered missed audit trigger");
                    report.recovered += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%identifier, error = %e, "audit recovery failed");
                }
            }
        }

        // Pruning: completed records past retention are dropped.
        report.pruned =
            self.store.prune_completed(self.config.completed_retention_ms, now_ms).await?;
        if report.pruned > 0 {
            tracing::info!(pruned = report.pruned, "pruned completed dispatches");
        }

        Ok(report)
    }

    /// Start the periodic monitor as a long-lived background task.
    pub fn spawn_monitor(self: &Arc<Self>, mut shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let tick = Duration::from_millis(engine.config.monitor_tick_ms);
            tracing::info!(tick_ms = engine.config.monitor_tick_ms, "background monitor started");
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("background monitor stopped");
                        return;
                    }
                    _ = tokio::time::sleep(tick) => {
                        match engine.monitor_tick().await {
                            Ok(report) if report != MonitorReport::default() => {
                                tracing::info!(
                                    stale = report.stale,
                                    recovered = report.recovered,
                                    pruned = report.pruned,
                                    "monitor tick"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "monitor tick failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
