// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inactivity watchdog around a single agent run.
//!
//! The watchdog fires when an agent goes silent: every streamed activity
//! resets the silence measurement via [`Watchdog::tick`], and a deferred
//! check task wakes at the inactivity threshold. A wake that finds recent
//! activity reschedules itself for the remaining silence budget; one that
//! finds the threshold elapsed invokes the kill callback exactly once.

use claw_core::{Clock, WatchdogConfig};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Floor for rescheduled checks so a nearly-elapsed budget does not spin.
const MIN_RECHECK_MS: u64 = 1_000;

/// Why the watchdog killed a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Inactivity,
}

claw_core::simple_display! {
    KillReason {
        Inactivity => "inactivity",
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CheckOutcome {
    /// Watchdog stopped or already fired; the check task exits.
    Stopped,
    /// Threshold elapsed; the kill callback ran.
    Fired,
    /// Activity seen recently; check again in this many milliseconds.
    Reschedule(u64),
}

struct WatchState {
    last_activity: Instant,
    armed: bool,
    stopped: bool,
    killed: bool,
    task: Option<JoinHandle<()>>,
}

struct Inner<C> {
    config: WatchdogConfig,
    clock: C,
    on_kill: Box<dyn Fn(KillReason) + Send + Sync>,
    state: Mutex<WatchState>,
}

/// Per-run inactivity timer. Cheap to clone; clones share state.
pub struct Watchdog<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for Watchdog<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> Watchdog<C> {
    /// The callback is invoked at most once per watchdog instance, from the
    /// check task. It must not block; kick async teardown onto its own task.
    pub fn new(
        config: WatchdogConfig,
        clock: C,
        on_kill: impl Fn(KillReason) + Send + Sync + 'static,
    ) -> Self {
        let last_activity = clock.now();
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                on_kill: Box::new(on_kill),
                state: Mutex::new(WatchState {
                    last_activity,
                    armed: false,
                    stopped: false,
                    killed: false,
                    task: None,
                }),
            }),
        }
    }

    /// Arm the watchdog and schedule the first check. Idempotent; a stopped
    /// watchdog stays stopped.
    pub fn start(&self) {
        let mut st = self.inner.state.lock();
        if st.armed || st.stopped || st.killed {
            return;
        }
        st.armed = true;
        st.last_activity = self.inner.clock.now();

        // The task holds only a weak reference, so dropped watchdogs do not
        // keep a timer alive behind them.
        let weak = Arc::downgrade(&self.inner);
        let first_delay = self.inner.config.inactivity_ms;
        st.task = Some(tokio::spawn(check_loop(weak, first_delay)));
    }

    /// Record activity. Never touches the timer; the next check computes the
    /// silence window from here.
    pub fn tick(&self) {
        let mut st = self.inner.state.lock();
        if st.armed && !st.stopped && !st.killed {
            st.last_activity = self.inner.clock.now();
        }
    }

    /// Cancel the pending check. Later `tick()` and `start()` calls no-op.
    pub fn stop(&self) {
        let task = {
            let mut st = self.inner.state.lock();
            st.stopped = true;
            st.armed = false;
            st.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
    }

    pub fn was_killed(&self) -> bool {
        self.inner.state.lock().killed
    }

    /// Milliseconds since the last observed activity.
    pub fn silence_ms(&self) -> u64 {
        let last = self.inner.state.lock().last_activity;
        ms_between(last, self.inner.clock.now())
    }

    pub(crate) fn run_check(&self) -> CheckOutcome {
        check(&self.inner)
    }
}

async fn check_loop<C: Clock>(inner: Weak<Inner<C>>, first_delay_ms: u64) {
    let mut delay_ms = first_delay_ms;
    loop {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let Some(inner) = inner.upgrade() else { return };
        match check(&inner) {
            CheckOutcome::Reschedule(ms) => delay_ms = ms,
            CheckOutcome::Stopped | CheckOutcome::Fired => return,
        }
    }
}

fn check<C: Clock>(inner: &Inner<C>) -> CheckOutcome {
    let silence_ms;
    {
        let mut st = inner.state.lock();
        if st.killed || st.stopped || !st.armed {
            return CheckOutcome::Stopped;
        }
        silence_ms = ms_between(st.last_activity, inner.clock.now());
        if silence_ms < inner.config.inactivity_ms {
            let remaining = inner.config.inactivity_ms - silence_ms;
            return CheckOutcome::Reschedule(remaining.max(MIN_RECHECK_MS));
        }
        // Monotonic: set before invoking the callback so a racing check
        // observes the kill and cannot fire twice.
        st.killed = true;
    }

    tracing::warn!(silence_ms, "watchdog killing silent agent run");
    (inner.on_kill)(KillReason::Inactivity);
    CheckOutcome::Fired
}

fn ms_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_millis() as u64
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
