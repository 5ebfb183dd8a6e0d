// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use claw_storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the dispatch engine.
///
/// Agent failures and tracker/notifier hiccups are handled inside the
/// pipeline (escalation, logging); what escapes to callers is state-store
/// trouble: contract violations and persistence failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
