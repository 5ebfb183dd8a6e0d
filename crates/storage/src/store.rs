// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The locked file store and the `StateStore` interface the engine consumes.

use crate::error::StoreError;
use crate::fs_atomic::atomic_write_file;
use crate::lock::{self, LockConfig};
use crate::ops;
use crate::state::DispatchState;
use async_trait::async_trait;
use claw_core::{
    ActiveDispatch, Clock, CompletedDispatch, CompletionRecord, DispatchStatus, SessionMapping,
    SystemClock, TransitionPatch,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Store operations the dispatch pipeline depends on.
///
/// Every method is one atomic locked mutation (or an unlocked snapshot read;
/// readers accept the read-skew bounded by the atomic-rename protocol).
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Snapshot of the current document; empty document if the file is absent.
    fn read(&self) -> Result<DispatchState, StoreError>;

    /// Register a new dispatch with `status = dispatched`, `attempt = 0` and
    /// a fresh `dispatched_at`.
    async fn register(&self, dispatch: ActiveDispatch) -> Result<(), StoreError>;

    /// CAS transition, optionally registering a session mapping in the same
    /// locked operation so the session map never lags the dispatch record.
    async fn transition(
        &self,
        identifier: &str,
        expected_from: DispatchStatus,
        to: DispatchStatus,
        patch: TransitionPatch,
        session: Option<(String, SessionMapping)>,
    ) -> Result<(), StoreError>;

    /// Move a dispatch to the completed map, purging its session mappings.
    async fn complete(
        &self,
        identifier: &str,
        record: CompletionRecord,
    ) -> Result<CompletedDispatch, StoreError>;

    /// Weak status setter for out-of-band repair only.
    async fn update_status(
        &self,
        identifier: &str,
        status: DispatchStatus,
    ) -> Result<(), StoreError>;

    /// Drop a dispatch and its session mappings without completing it.
    async fn remove_active(&self, identifier: &str)
        -> Result<Option<ActiveDispatch>, StoreError>;

    /// Record an event key; true when first seen.
    async fn mark_event_processed(&self, event_key: &str) -> Result<bool, StoreError>;

    /// Prune completed records older than the retention window.
    async fn prune_completed(&self, retention_ms: u64, now_ms: u64)
        -> Result<usize, StoreError>;
}

/// Locked single-file JSON store.
#[derive(Debug, Clone)]
pub struct FileStore<C: Clock = SystemClock> {
    path: PathBuf,
    lock_config: LockConfig,
    clock: C,
}

impl FileStore<SystemClock> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, SystemClock)
    }
}

impl<C: Clock> FileStore<C> {
    pub fn with_clock(path: impl Into<PathBuf>, clock: C) -> Self {
        Self { path: path.into(), lock_config: LockConfig::default(), clock }
    }

    pub fn lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, read, apply `f`, write atomically, release.
    ///
    /// `f` returning `Err` aborts the mutation: the file is untouched and the
    /// lock is still released.
    pub async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut DispatchState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = lock::acquire(&self.path, &self.clock, &self.lock_config).await?;
        let mut state = self.read_document()?;
        let value = f(&mut state)?;
        let json = serde_json::to_vec_pretty(&state)
            .map_err(|e| StoreError::io(&self.path, std::io::Error::other(e)))?;
        atomic_write_file(&self.path, &json).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(value)
    }

    fn read_document(&self) -> Result<DispatchState, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DispatchState::default());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl<C: Clock> StateStore for FileStore<C> {
    fn read(&self) -> Result<DispatchState, StoreError> {
        self.read_document()
    }

    async fn register(&self, dispatch: ActiveDispatch) -> Result<(), StoreError> {
        let now_ms = self.clock.epoch_ms();
        self.mutate(|state| Ok(ops::register(state, dispatch, now_ms)?)).await
    }

    async fn transition(
        &self,
        identifier: &str,
        expected_from: DispatchStatus,
        to: DispatchStatus,
        patch: TransitionPatch,
        session: Option<(String, SessionMapping)>,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            ops::transition(state, identifier, expected_from, to, &patch)?;
            if let Some((key, mapping)) = session {
                ops::register_session(state, key, mapping);
            }
            Ok(())
        })
        .await
    }

    async fn complete(
        &self,
        identifier: &str,
        record: CompletionRecord,
    ) -> Result<CompletedDispatch, StoreError> {
        self.mutate(|state| Ok(ops::complete(state, identifier, record)?)).await
    }

    async fn update_status(
        &self,
        identifier: &str,
        status: DispatchStatus,
    ) -> Result<(), StoreError> {
        self.mutate(|state| Ok(ops::update_status(state, identifier, status)?)).await
    }

    async fn remove_active(
        &self,
        identifier: &str,
    ) -> Result<Option<ActiveDispatch>, StoreError> {
        self.mutate(|state| Ok(ops::remove_active(state, identifier))).await
    }

    async fn mark_event_processed(&self, event_key: &str) -> Result<bool, StoreError> {
        self.mutate(|state| Ok(ops::mark_event_processed(state, event_key))).await
    }

    async fn prune_completed(
        &self,
        retention_ms: u64,
        now_ms: u64,
    ) -> Result<usize, StoreError> {
        self.mutate(|state| Ok(ops::prune_completed(state, retention_ms, now_ms))).await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
