// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted dispatch state document.

use claw_core::{ActiveDispatch, CompletedDispatch, SessionMapping};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum retained processed-event keys; oldest evicted first.
pub const PROCESSED_EVENTS_CAP: usize = 200;

/// Top-level document serialized to the state file.
///
/// An issue identifier appears in at most one of `active` or `completed` at
/// any instant; every session key stored on an active dispatch has a matching
/// `session_map` entry. Mutations preserving these invariants live in
/// [`crate::ops`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DispatchState {
    #[serde(default)]
    pub dispatches: Dispatches,
    #[serde(default)]
    pub session_map: HashMap<String, SessionMapping>,
    /// FIFO of processed event keys for at-least-once delivery dedup.
    #[serde(default)]
    pub processed_events: VecDeque<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Dispatches {
    #[serde(default)]
    pub active: HashMap<String, ActiveDispatch>,
    #[serde(default)]
    pub completed: HashMap<String, CompletedDispatch>,
}

impl DispatchState {
    pub fn active(&self, identifier: &str) -> Option<&ActiveDispatch> {
        self.dispatches.active.get(identifier)
    }

    pub fn completed(&self, identifier: &str) -> Option<&CompletedDispatch> {
        self.dispatches.completed.get(identifier)
    }

    pub fn lookup_session(&self, session_key: &str) -> Option<&SessionMapping> {
        self.session_map.get(session_key)
    }

    pub fn event_processed(&self, event_key: &str) -> bool {
        self.processed_events.iter().any(|k| k == event_key)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
