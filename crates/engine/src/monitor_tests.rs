// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::harness;
use claw_adapters::fake::ScriptedRun;
use claw_core::test_support::active_dispatch;
use claw_core::{
    CompletionRecord, CompletionStatus, FakeClock, SessionMapping, SessionPhase, TransitionPatch,
};
use std::time::Duration as StdDuration;

const PASS_VERDICT: &str = r#"{"pass":true,"criteria":[],"gaps":[]}"#;

#[tokio::test]
async fn stale_dispatch_is_marked_stuck() {
    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();

    // Three hours pass with no progress; the limit is two.
    h.clock.advance(StdDuration::from_secs(3 * 3600));
    let report = h.engine.monitor_tick().await.unwrap();

    assert_eq!(report.stale, 1);
    let state = h.engine.store().read().unwrap();
    let dispatch = state.active("CT-100").unwrap();
    assert_eq!(dispatch.status, DispatchStatus::Stuck);
    assert_eq!(dispatch.stuck_reason.as_deref(), Some(STUCK_STALE));

    let kinds = h.notifier.kinds();
    assert_eq!(kinds, vec![claw_adapters::NotifyKind::Stuck]);
}

#[tokio::test]
async fn fresh_dispatch_survives_the_sweep() {
    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();

    h.clock.advance(StdDuration::from_secs(3600));
    let report = h.engine.monitor_tick().await.unwrap();

    assert_eq!(report.stale, 0);
    let state = h.engine.store().read().unwrap();
    assert_eq!(state.active("CT-100").unwrap().status, DispatchStatus::Dispatched);
    assert!(h.notifier.kinds().is_empty());
}

#[tokio::test]
async fn already_stuck_dispatch_is_not_reswept() {
    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();
    h.clock.advance(StdDuration::from_secs(3 * 3600));

    let first = h.engine.monitor_tick().await.unwrap();
    let second = h.engine.monitor_tick().await.unwrap();

    assert_eq!(first.stale, 1);
    assert_eq!(second.stale, 0, "stuck is terminal; no repeat sweep");
    assert_eq!(h.notifier.kinds().len(), 1, "exactly one stuck notification");
}

#[tokio::test]
async fn recovery_triggers_missed_audit() {
    let h = harness(FakeClock::new());
    // Worker finished out-of-process, audit never started: working with a
    // worker session key and no audit session key.
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();
    let key = claw_core::worker_session_key("CT-100", 0);
    h.engine
        .store()
        .transition(
            "CT-100",
            DispatchStatus::Dispatched,
            DispatchStatus::Working,
            TransitionPatch::new().worker_session_key(key.clone()),
            Some((key, SessionMapping::new("CT-100", SessionPhase::Worker, 0))),
        )
        .await
        .unwrap();
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    // The fake tracker has no such issue; recovery degrades to minimal
    // context rather than skipping the dispatch.
    let report = h.engine.monitor_tick().await.unwrap();

    assert_eq!(report.recovered, 1);
    let state = h.engine.store().read().unwrap();
    assert_eq!(state.completed("CT-100").unwrap().status, CompletionStatus::Done);

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].agent_id, "auditor");
    assert_eq!(calls[0].session_id, "linear-audit-CT-100-0");
}

#[tokio::test]
async fn recovery_skips_dispatches_already_auditing() {
    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();
    let worker_key = claw_core::worker_session_key("CT-100", 0);
    h.engine
        .store()
        .transition(
            "CT-100",
            DispatchStatus::Dispatched,
            DispatchStatus::Working,
            TransitionPatch::new().worker_session_key(worker_key.clone()),
            Some((worker_key, SessionMapping::new("CT-100", SessionPhase::Worker, 0))),
        )
        .await
        .unwrap();
    let audit_key = claw_core::audit_session_key("CT-100", 0);
    h.engine
        .store()
        .transition(
            "CT-100",
            DispatchStatus::Working,
            DispatchStatus::Auditing,
            TransitionPatch::new().audit_session_key(audit_key.clone()),
            Some((audit_key, SessionMapping::new("CT-100", SessionPhase::Audit, 0))),
        )
        .await
        .unwrap();

    let report = h.engine.monitor_tick().await.unwrap();

    assert_eq!(report.recovered, 0);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn pruning_drops_only_expired_completed_records() {
    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-OLD")).await.unwrap();
    h.engine
        .store()
        .complete("CT-OLD", CompletionRecord::new(CompletionStatus::Done, h.clock.epoch_ms()))
        .await
        .unwrap();

    // Eight days later a fresh dispatch completes too.
    h.clock.advance(StdDuration::from_secs(8 * 24 * 3600));
    h.engine.store().register(active_dispatch("CT-NEW")).await.unwrap();
    h.engine
        .store()
        .complete("CT-NEW", CompletionRecord::new(CompletionStatus::Failed, h.clock.epoch_ms()))
        .await
        .unwrap();

    let report = h.engine.monitor_tick().await.unwrap();

    assert_eq!(report.pruned, 1);
    let state = h.engine.store().read().unwrap();
    assert!(state.completed("CT-OLD").is_none());
    assert!(state.completed("CT-NEW").is_some());
}

#[tokio::test]
async fn idle_tick_reports_nothing() {
    let h = harness(FakeClock::new());
    let report = h.engine.monitor_tick().await.unwrap();
    assert_eq!(report, MonitorReport::default());
}

#[tokio::test]
async fn spawn_monitor_stops_on_shutdown() {
    let h = harness(FakeClock::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = h.engine.spawn_monitor(shutdown_rx);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
