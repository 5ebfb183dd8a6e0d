// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use claw_core::TransitionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The lock could not be acquired within the deadline, even after the
    /// forced recovery attempt.
    #[error("could not acquire state lock {path} within {waited_ms} ms")]
    Lock { path: PathBuf, waited_ms: u64 },

    /// The state file exists but cannot be parsed. Never silently overwritten.
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
