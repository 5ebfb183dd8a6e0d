// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use claw_core::{FakeClock, SystemClock, WatchdogConfig};
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_watchdog(
    inactivity_ms: u64,
    clock: FakeClock,
) -> (Watchdog<FakeClock>, Arc<AtomicUsize>) {
    let kills = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&kills);
    let config = WatchdogConfig { inactivity_ms, ..WatchdogConfig::default() };
    let watchdog = Watchdog::new(config, clock, move |reason| {
        assert_eq!(reason, KillReason::Inactivity);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (watchdog, kills)
}

#[tokio::test]
async fn tick_just_before_threshold_prevents_fire() {
    let clock = FakeClock::new();
    let (watchdog, kills) = counting_watchdog(120_000, clock.clone());
    watchdog.start();

    clock.advance_ms(119_999);
    watchdog.tick();
    clock.advance_ms(119_999);

    // Silence is 119 999 ms, one short of the threshold.
    assert_eq!(watchdog.run_check(), CheckOutcome::Reschedule(MIN_RECHECK_MS));
    assert_eq!(kills.load(Ordering::SeqCst), 0);
    assert!(!watchdog.was_killed());
    watchdog.stop();
}

#[tokio::test]
async fn fires_exactly_once_at_threshold() {
    let clock = FakeClock::new();
    let (watchdog, kills) = counting_watchdog(120_000, clock.clone());
    watchdog.start();

    clock.advance_ms(120_000);
    assert_eq!(watchdog.run_check(), CheckOutcome::Fired);
    assert!(watchdog.was_killed());
    assert_eq!(kills.load(Ordering::SeqCst), 1);

    // A second check after the kill is a no-op.
    assert_eq!(watchdog.run_check(), CheckOutcome::Stopped);
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reschedule_uses_remaining_silence_budget() {
    let clock = FakeClock::new();
    let (watchdog, _kills) = counting_watchdog(120_000, clock.clone());
    watchdog.start();

    clock.advance_ms(50_000);
    assert_eq!(watchdog.run_check(), CheckOutcome::Reschedule(70_000));
    watchdog.stop();
}

#[tokio::test]
async fn check_after_stop_is_noop() {
    let clock = FakeClock::new();
    let (watchdog, kills) = counting_watchdog(1_000, clock.clone());
    watchdog.start();
    watchdog.stop();

    clock.advance_ms(10_000);
    assert_eq!(watchdog.run_check(), CheckOutcome::Stopped);
    assert_eq!(kills.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tick_and_start_after_stop_are_noops() {
    let clock = FakeClock::new();
    let (watchdog, kills) = counting_watchdog(1_000, clock.clone());
    watchdog.start();
    watchdog.stop();

    watchdog.tick();
    watchdog.start();
    clock.advance_ms(10_000);
    assert_eq!(watchdog.run_check(), CheckOutcome::Stopped);
    assert_eq!(kills.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_is_idempotent() {
    let clock = FakeClock::new();
    let (watchdog, kills) = counting_watchdog(120_000, clock.clone());
    watchdog.start();
    clock.advance_ms(60_000);
    // Re-start while armed must not reset the deadline task or state.
    watchdog.start();
    clock.advance_ms(60_000);
    assert_eq!(watchdog.run_check(), CheckOutcome::Fired);
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silence_tracks_clock() {
    let clock = FakeClock::new();
    let (watchdog, _kills) = counting_watchdog(120_000, clock.clone());
    watchdog.start();
    clock.advance_ms(5_500);
    assert_eq!(watchdog.silence_ms(), 5_500);
    watchdog.tick();
    assert_eq!(watchdog.silence_ms(), 0);
    watchdog.stop();
}

#[tokio::test]
async fn timer_fires_without_manual_checks() {
    // End-to-end against the real timer with a tiny threshold.
    let kills = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&kills);
    let config = WatchdogConfig { inactivity_ms: 20, ..WatchdogConfig::default() };
    let watchdog = Watchdog::new(config, SystemClock, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    watchdog.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(watchdog.was_killed());
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}
