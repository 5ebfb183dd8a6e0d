// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner port.
//!
//! One implementation per coding-CLI backend plus the in-process runner; the
//! engine drives them all through this trait. A runner that supports
//! streaming sends [`StreamEvent`]s through the channel in the request; one
//! that only has a subprocess entry point ignores the channel and returns the
//! aggregated output when the process exits.

use crate::stream::StreamEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from agent runner operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("agent spawn failed: {0}")]
    SpawnFailed(String),
    #[error("agent run failed: {0}")]
    RunFailed(String),
}

/// A single agent invocation.
#[derive(Debug)]
pub struct RunRequest {
    /// Which agent profile to run (e.g. `worker`, `auditor`).
    pub agent_id: String,
    /// Session key for this run; resuming and aborting key off it.
    pub session_id: String,
    /// Fully rendered prompt.
    pub message: String,
    /// Wall-clock cap in milliseconds, enforced by the caller's deadline.
    pub timeout_ms: Option<u64>,
    /// Streaming channel; runners without streaming drop it unused.
    pub stream: Option<mpsc::Sender<StreamEvent>>,
}

impl RunRequest {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            message: message.into(),
            timeout_ms: None,
            stream: None,
        }
    }

    claw_core::setters! {
        option { timeout_ms: u64 }
    }

    pub fn stream(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.stream = Some(tx);
        self
    }
}

/// Aggregated result of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub success: bool,
    pub output: String,
}

/// Port to the agent execution backends.
#[async_trait]
pub trait AgentRunner: Send + Sync + 'static {
    /// Execute an agent run to completion.
    async fn run(&self, request: RunRequest) -> Result<RunOutput, RunnerError>;

    /// Tear down a run by session key. Used by the watchdog kill path; a
    /// session that already ended is not an error.
    async fn abort(&self, session_id: &str);
}
