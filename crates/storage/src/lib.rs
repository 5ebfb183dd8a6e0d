// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-storage: the locked persistent dispatch state.
//!
//! A single JSON document holds every in-flight and recently completed
//! dispatch, the session map, and the processed-event set. All mutation goes
//! through an advisory file lock so concurrent engine processes on the same
//! host serialize their read-modify-write cycles.

mod fs_atomic;
mod lock;
pub mod ops;
mod state;
mod store;

mod error;

pub use error::StoreError;
pub use fs_atomic::atomic_write_file;
pub use lock::LockConfig;
pub use state::{DispatchState, Dispatches, PROCESSED_EVENTS_CAP};
pub use store::{FileStore, StateStore};
