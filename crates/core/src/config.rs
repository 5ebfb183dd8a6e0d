// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! User-facing durations are written in seconds; everything inside the engine
//! is integer milliseconds, converted once at load time.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_MAX_REWORK_ATTEMPTS: u32 = 2;
pub const DEFAULT_STALE_MAX_AGE_MS: u64 = 7_200_000;
pub const DEFAULT_COMPLETED_RETENTION_MS: u64 = 604_800_000;
pub const DEFAULT_MONITOR_TICK_MS: u64 = 300_000;

pub const DEFAULT_WATCHDOG_INACTIVITY_MS: u64 = 120_000;
pub const DEFAULT_WATCHDOG_MAX_TOTAL_MS: u64 = 7_200_000;
pub const DEFAULT_WATCHDOG_TOOL_TIMEOUT_MS: u64 = 600_000;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Watchdog thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Silence threshold after which a run is killed.
    pub inactivity_ms: u64,
    /// Wall-clock cap for one agent session, enforced by the run wrapper.
    pub max_total_ms: u64,
    /// Per-tool-call cap, consumed by tool runners rather than the watchdog.
    pub tool_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            inactivity_ms: DEFAULT_WATCHDOG_INACTIVITY_MS,
            max_total_ms: DEFAULT_WATCHDOG_MAX_TOTAL_MS,
            tool_timeout_ms: DEFAULT_WATCHDOG_TOOL_TIMEOUT_MS,
        }
    }
}

/// Partial watchdog settings from a per-agent profile, in seconds.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WatchdogOverrides {
    pub inactivity_sec: Option<u64>,
    pub max_total_sec: Option<u64>,
    pub tool_timeout_sec: Option<u64>,
}

impl WatchdogConfig {
    /// Layer a per-agent profile over this (caller-resolved) config.
    ///
    /// Resolution order: profile override, then `self`, which already merged
    /// file config over the hardcoded defaults.
    pub fn with_overrides(self, overrides: &WatchdogOverrides) -> Self {
        Self {
            inactivity_ms: overrides
                .inactivity_sec
                .map(|s| s * 1_000)
                .unwrap_or(self.inactivity_ms),
            max_total_ms: overrides.max_total_sec.map(|s| s * 1_000).unwrap_or(self.max_total_ms),
            tool_timeout_ms: overrides
                .tool_timeout_sec
                .map(|s| s * 1_000)
                .unwrap_or(self.tool_timeout_ms),
        }
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Location of the persisted dispatch state document.
    pub state_path: PathBuf,
    /// How many times a failed audit may send the dispatch back to work.
    pub max_rework_attempts: u32,
    /// Age at which the monitor classifies an active dispatch as stale.
    pub stale_max_age_ms: u64,
    /// Retention window for completed records before pruning.
    pub completed_retention_ms: u64,
    /// Background monitor tick interval.
    pub monitor_tick_ms: u64,
    /// Whether a stuck dispatch is also completed as `failed`. When false the
    /// record stays active as `stuck` for humans to find.
    pub complete_stuck_dispatches: bool,
    pub watchdog: WatchdogConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            max_rework_attempts: DEFAULT_MAX_REWORK_ATTEMPTS,
            stale_max_age_ms: DEFAULT_STALE_MAX_AGE_MS,
            completed_retention_ms: DEFAULT_COMPLETED_RETENTION_MS,
            monitor_tick_ms: DEFAULT_MONITOR_TICK_MS,
            complete_stuck_dispatches: false,
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw)?;
        Ok(file.resolve())
    }
}

/// Default state document location: `~/.openclaw/linear-dispatch-state.json`.
pub fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openclaw")
        .join("linear-dispatch-state.json")
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Raw on-disk form. Durations under `[watchdog]` are seconds.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    dispatch_state_path: Option<String>,
    max_rework_attempts: Option<u32>,
    stale_max_age_ms: Option<u64>,
    completed_retention_ms: Option<u64>,
    monitor_tick_ms: Option<u64>,
    complete_stuck_dispatches: Option<bool>,
    #[serde(default)]
    watchdog: WatchdogOverrides,
}

impl ConfigFile {
    fn resolve(self) -> DispatchConfig {
        let defaults = DispatchConfig::default();
        DispatchConfig {
            state_path: self
                .dispatch_state_path
                .map(|p| expand_home(&p))
                .unwrap_or(defaults.state_path),
            max_rework_attempts: self.max_rework_attempts.unwrap_or(defaults.max_rework_attempts),
            stale_max_age_ms: self.stale_max_age_ms.unwrap_or(defaults.stale_max_age_ms),
            completed_retention_ms: self
                .completed_retention_ms
                .unwrap_or(defaults.completed_retention_ms),
            monitor_tick_ms: self.monitor_tick_ms.unwrap_or(defaults.monitor_tick_ms),
            complete_stuck_dispatches: self.complete_stuck_dispatches.unwrap_or(false),
            watchdog: defaults.watchdog.with_overrides(&self.watchdog),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
