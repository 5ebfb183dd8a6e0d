// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-adapters: ports the dispatch engine consumes.
//!
//! The engine never speaks a tracker protocol, spawns a coding CLI, or posts
//! to a chat system itself; those collaborators are surfaced here as traits.
//! Concrete backends live with the transports that implement them; this crate
//! carries the contracts plus fakes for testing.

pub mod notify;
pub mod profiles;
pub mod prompt;
pub mod runner;
pub mod stream;
pub mod tracker;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use notify::{Notifier, NotifyError, NotifyKind, NotifyPayload, VerdictSummary};
pub use profiles::{AgentProfiles, NoProfiles};
pub use prompt::{PromptBuilder, PromptSection, PromptVars};
pub use runner::{AgentRunner, RunOutput, RunRequest, RunnerError};
pub use stream::StreamEvent;
pub use tracker::{Issue, IssueActivity, IssueTracker, TrackerError};
