// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt rendering port.
//!
//! Template contents and rendering live outside the engine; the engine only
//! names a section and supplies variables.

use claw_core::Tier;
use std::path::PathBuf;

/// Which template the engine wants rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSection {
    Worker,
    Audit,
    Rework,
}

claw_core::simple_display! {
    PromptSection {
        Worker => "worker",
        Audit => "audit",
        Rework => "rework",
    }
}

/// Variables available to every section.
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub worktree_path: PathBuf,
    pub tier: Tier,
    pub attempt: u32,
    /// Gaps from the failed audit; rework sections interpolate these.
    pub gaps: Vec<String>,
}

/// Port to the prompt template system.
pub trait PromptBuilder: Send + Sync + 'static {
    fn render(&self, section: PromptSection, vars: &PromptVars) -> String;
}
