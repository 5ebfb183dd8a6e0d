// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory file lock guarding the state document.
//!
//! The lock is a sibling `<statePath>.lock` file created with
//! exclusive-create semantics; its content is the epoch-ms timestamp of
//! acquisition. Waiters poll, remove locks older than the stale threshold,
//! and after the acquisition deadline force-remove whatever is there and
//! write their own. Release is a best-effort unlink: a missing lock file is
//! not an error, which covers a holder that crashed between write and unlink.

use crate::error::StoreError;
use claw_core::Clock;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lock protocol tunables. Defaults are the production constants; tests
/// shrink them to keep wall-clock time down.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// Poll interval while the lock is held by someone else.
    pub retry_interval: Duration,
    /// Total time a waiter polls before forcing acquisition.
    pub acquire_deadline: Duration,
    /// Age beyond which a lock is presumed abandoned.
    pub stale_after_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(50),
            acquire_deadline: Duration::from_secs(10),
            stale_after_ms: 30_000,
        }
    }
}

/// Held lock; unlinks the lock file on drop.
pub(crate) struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Missing file is fine: a forced takeover may already have removed it.
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the lock for `state_path`, polling until the deadline.
pub(crate) async fn acquire<C: Clock>(
    state_path: &Path,
    clock: &C,
    config: &LockConfig,
) -> Result<LockGuard, StoreError> {
    let lock_path = lock_path_for(state_path);
    let started = clock.now();

    loop {
        match try_create(&lock_path, clock.epoch_ms()) {
            Ok(()) => return Ok(LockGuard { path: lock_path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Parent directory does not exist yet.
                fs::create_dir_all(lock_path.parent().unwrap_or(Path::new(".")))
                    .map_err(|e| StoreError::io(&lock_path, e))?;
                continue;
            }
            Err(e) => return Err(StoreError::io(&lock_path, e)),
        }

        if lock_is_stale(&lock_path, clock.epoch_ms(), config.stale_after_ms) {
            tracing::warn!(lock = %lock_path.display(), "removing stale state lock");
            let _ = fs::remove_file(&lock_path);
            continue;
        }

        let waited = clock.now().saturating_duration_since(started);
        if waited >= config.acquire_deadline {
            tracing::warn!(
                lock = %lock_path.display(),
                waited_ms = waited.as_millis() as u64,
                "lock acquisition deadline elapsed, forcing takeover"
            );
            let _ = fs::remove_file(&lock_path);
            return match try_create(&lock_path, clock.epoch_ms()) {
                Ok(()) => Ok(LockGuard { path: lock_path }),
                Err(_) => Err(StoreError::Lock {
                    path: lock_path,
                    waited_ms: waited.as_millis() as u64,
                }),
            };
        }

        tokio::time::sleep(config.retry_interval).await;
    }
}

pub(crate) fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut os = state_path.as_os_str().to_os_string();
    os.push(".lock");
    os.into()
}

fn try_create(lock_path: &Path, now_ms: u64) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().create_new(true).write(true).open(lock_path)?;
    file.write_all(now_ms.to_string().as_bytes())
}

/// A lock whose recorded timestamp is older than the threshold is presumed
/// abandoned. An unreadable or unparsable lock file counts as stale too.
fn lock_is_stale(lock_path: &Path, now_ms: u64, stale_after_ms: u64) -> bool {
    match fs::read_to_string(lock_path) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(acquired_ms) => now_ms.saturating_sub(acquired_ms) > stale_after_ms,
            Err(_) => true,
        },
        // Racing holder may have released between our create attempt and this
        // read; treat as gone and retry the create.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
