// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe file replacement: write a sibling temp file, fsync, rename.

use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `content`.
///
/// The temp file is the fixed sibling `<path>.tmp`; callers hold the state
/// lock while writing, so the name cannot collide with another writer. The
/// parent directory is created if missing and synced after the rename so the
/// new directory entry is durable.
pub fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("state path has no parent directory"))?;
    fs::create_dir_all(parent)?;

    let tmp_path = tmp_path_for(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    sync_dir(parent)
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    os.into()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "fs_atomic_tests.rs"]
mod tests;
