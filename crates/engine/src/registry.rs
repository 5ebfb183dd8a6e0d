// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process registry of live agent sessions.
//!
//! Tool handlers need synchronous lookups of in-flight sessions without
//! touching the store. The registry mirrors the persisted session map: the
//! engine updates it alongside every session registration and purge, and
//! [`SessionRegistry::hydrate_from_store`] rebuilds it at boot. Process-local
//! only; never a source of truth.

use claw_core::SessionMapping;
use claw_storage::DispatchState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionMapping>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_key: impl Into<String>, mapping: SessionMapping) {
        self.inner.lock().insert(session_key.into(), mapping);
    }

    pub fn get(&self, session_key: &str) -> Option<SessionMapping> {
        self.inner.lock().get(session_key).cloned()
    }

    pub fn remove(&self, session_key: &str) -> Option<SessionMapping> {
        self.inner.lock().remove(session_key)
    }

    /// Drop every session belonging to a dispatch; returns how many.
    pub fn remove_for_dispatch(&self, dispatch_id: &str) -> usize {
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|_, m| m.dispatch_id != dispatch_id);
        before - map.len()
    }

    /// Replace the registry content with the persisted session map.
    pub fn hydrate_from_store(&self, state: &DispatchState) {
        let mut map = self.inner.lock();
        map.clear();
        map.extend(state.session_map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
