// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch engine facade.
//!
//! `DispatchEngine` wires the locked store, the external ports, and the
//! clock; the pipeline, monitor, hook, and run-wrapper logic live in their
//! own modules as further `impl` blocks on this type.

use crate::artifacts::ArtifactStore;
use crate::error::EngineError;
use crate::registry::SessionRegistry;
use claw_adapters::{
    AgentProfiles, AgentRunner, Issue, IssueActivity, IssueTracker, Notifier, NotifyKind,
    NotifyPayload, PromptBuilder,
};
use claw_core::{
    ActiveDispatch, Clock, DispatchConfig, SessionPhase, WatchdogConfig,
};
use claw_storage::StateStore;
use std::sync::Arc;

/// Issue fields the pipeline interpolates into prompts and comments.
#[derive(Debug, Clone, Default)]
pub struct IssueContext {
    pub issue_id: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
}

impl From<Issue> for IssueContext {
    fn from(issue: Issue) -> Self {
        Self {
            issue_id: issue.id,
            identifier: issue.identifier,
            title: issue.title,
            description: issue.description,
        }
    }
}

/// External collaborators handed to the engine at construction.
pub struct EngineDeps<T, R, N, P, F> {
    pub tracker: T,
    pub runner: R,
    pub notifier: N,
    pub prompts: P,
    pub profiles: F,
}

/// The dispatch engine: state machine, pipeline, watchdog wrapper, monitor.
pub struct DispatchEngine<S, T, R, N, P, F, C: Clock> {
    pub(crate) store: S,
    pub(crate) tracker: Arc<T>,
    pub(crate) runner: Arc<R>,
    pub(crate) notifier: N,
    pub(crate) prompts: P,
    pub(crate) profiles: F,
    pub(crate) clock: C,
    pub(crate) config: DispatchConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) artifacts: ArtifactStore,
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
    pub fn new(store: S, deps: EngineDeps<T, R, N, P, F>, clock: C, config: DispatchConfig) -> Self {
        let artifacts = ArtifactStore::for_state_path(&config.state_path);
        Self {
            store,
            tracker: Arc::new(deps.tracker),
            runner: Arc::new(deps.runner),
            notifier: deps.notifier,
            prompts: deps.prompts,
            profiles: deps.profiles,
            clock,
            config,
            registry: SessionRegistry::new(),
            artifacts,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Rebuild the in-process session registry from the persisted map.
    /// Call once at boot, before accepting completion signals.
    pub fn hydrate_registry(&self) -> Result<usize, EngineError> {
        let state = self.store.read()?;
        self.registry.hydrate_from_store(&state);
        Ok(self.registry.len())
    }

    /// Drop an in-flight dispatch without completing it. This is the only
    /// external cancellation path.
    pub async fn cancel_dispatch(
        &self,
        identifier: &str,
    ) -> Result<Option<ActiveDispatch>, EngineError> {
        let removed = self.store.remove_active(identifier).await?;
        if removed.is_some() {
            self.registry.remove_for_dispatch(identifier);
            tracing::info!(%identifier, "dispatch cancelled and removed");
        }
        Ok(removed)
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Watchdog thresholds for an agent: profile override over engine config.
    pub(crate) fn watchdog_config_for(&self, agent_id: &str) -> WatchdogConfig {
        match self.profiles.watchdog_overrides(agent_id) {
            Some(overrides) => self.config.watchdog.with_overrides(&overrides),
            None => self.config.watchdog,
        }
    }

    /// Notifications are advisory; failures are logged, never propagated.
    pub(crate) async fn notify(&self, kind: NotifyKind, payload: NotifyPayload) {
        if let Err(e) = self.notifier.notify(kind, payload).await {
            tracing::warn!(kind = %kind, error = %e, "notification failed");
        }
    }

    /// Comments are best-effort; a verdict stands whether or not the tracker
    /// accepted the comment.
    pub(crate) async fn post_comment(&self, issue_id: &str, markdown: &str) {
        if let Err(e) = self.tracker.post_comment(issue_id, markdown).await {
            tracing::warn!(%issue_id, error = %e, "comment post failed");
        }
    }

    pub(crate) async fn emit_activity(&self, session_id: &str, activity: IssueActivity) {
        if let Err(e) = self.tracker.emit_activity(session_id, activity).await {
            tracing::debug!(%session_id, error = %e, "activity emission failed");
        }
    }

    pub(crate) fn save_artifact(
        &self,
        identifier: &str,
        attempt: u32,
        phase: SessionPhase,
        output: &str,
    ) {
        if let Err(e) = self.artifacts.save(identifier, attempt, phase, output) {
            tracing::warn!(%identifier, attempt, phase = %phase, error = %e, "artifact write failed");
        }
    }

    /// Issue context for prompts and comments. A tracker outage degrades to
    /// identifier-only context rather than stalling the pipeline.
    pub(crate) async fn issue_context_for(&self, dispatch: &ActiveDispatch) -> IssueContext {
        match self.tracker.fetch_issue(&dispatch.issue_id).await {
            Ok(issue) => issue.into(),
            Err(e) => {
                tracing::warn!(
                    identifier = %dispatch.issue_identifier,
                    error = %e,
                    "issue fetch failed, continuing with minimal context"
                );
                IssueContext {
                    issue_id: dispatch.issue_id.clone(),
                    identifier: dispatch.issue_identifier.clone(),
                    title: dispatch.issue_identifier.clone(),
                    description: String::new(),
                }
            }
        }
    }
}
