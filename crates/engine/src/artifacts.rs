// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque per-attempt output artifacts.
//!
//! Worker and audit outputs are kept on disk next to the state file, one
//! file per (dispatch, attempt, phase). The engine never reads them back;
//! they exist for humans and downstream tooling digging into a dispatch.

use claw_core::SessionPhase;
use claw_storage::atomic_write_file;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Artifacts live in an `artifacts/` directory beside the state file.
    pub fn for_state_path(state_path: &Path) -> Self {
        let parent = state_path.parent().unwrap_or(Path::new("."));
        Self::new(parent.join("artifacts"))
    }

    pub fn path_for(&self, identifier: &str, attempt: u32, phase: SessionPhase) -> PathBuf {
        self.dir.join(format!("{identifier}-{phase}-{attempt}.log"))
    }

    pub fn save(
        &self,
        identifier: &str,
        attempt: u32,
        phase: SessionPhase,
        output: &str,
    ) -> std::io::Result<PathBuf> {
        let path = self.path_for(identifier, attempt, phase);
        atomic_write_file(&path, output.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
