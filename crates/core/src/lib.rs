// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-core: domain types for the OpenClaw dispatch engine

pub mod macros;

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    default_state_path, ConfigError, DispatchConfig, WatchdogConfig, WatchdogOverrides,
};
pub use dispatch::{
    ActiveDispatch, CompletedDispatch, CompletionRecord, CompletionStatus, DispatchStatus, Tier,
    TransitionError, TransitionPatch,
};
pub use session::{
    audit_session_key, audit_trigger_event_key, verdict_event_key, worker_session_key,
    SessionMapping, SessionPhase,
};
