// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{harness, harness_with};
use claw_adapters::fake::ScriptedRun;
use claw_adapters::{IssueActivity, NotifyKind, StreamEvent};
use claw_core::test_support::active_dispatch;
use claw_core::{FakeClock, SystemClock};

const PASS_VERDICT: &str = r#"{"pass":true,"criteria":["meets issue"],"gaps":[]}"#;
const FAIL_NO_TESTS: &str = r#"{"pass":false,"criteria":[],"gaps":["no tests"]}"#;

#[tokio::test]
async fn happy_path_completes_dispatch() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("implemented the fix"));
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert!(state.active("CT-100").is_none(), "dispatch must leave the active map");
    let completed = state.completed("CT-100").unwrap();
    assert_eq!(completed.status, claw_core::CompletionStatus::Done);
    assert_eq!(completed.total_attempts, 1);
    assert!(state.session_map.is_empty(), "session mappings purged on completion");

    assert_eq!(
        h.notifier.kinds(),
        vec![
            NotifyKind::Dispatch,
            NotifyKind::Working,
            NotifyKind::Auditing,
            NotifyKind::AuditPass,
        ]
    );

    // Worker and auditor ran as distinct sessions, in order.
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].agent_id, "worker");
    assert_eq!(calls[0].session_id, "linear-worker-CT-100-0");
    assert_eq!(calls[1].agent_id, "auditor");
    assert_eq!(calls[1].session_id, "linear-audit-CT-100-0");

    // One approval comment.
    let comments = h.tracker.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("Audit passed"));
}

#[tokio::test]
async fn single_rework_then_pass() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("first attempt"));
    h.runner.push(ScriptedRun::success(FAIL_NO_TESTS));
    h.runner.push(ScriptedRun::success("second attempt with tests"));
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    let completed = state.completed("CT-100").unwrap();
    assert_eq!(completed.status, claw_core::CompletionStatus::Done);
    assert_eq!(completed.total_attempts, 2);

    assert_eq!(
        h.notifier.kinds(),
        vec![
            NotifyKind::Dispatch,
            NotifyKind::Working,
            NotifyKind::Auditing,
            NotifyKind::AuditFail,
            NotifyKind::Working,
            NotifyKind::Auditing,
            NotifyKind::AuditPass,
        ]
    );

    // The rework prompt carries the audit gaps.
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[2].session_id, "linear-worker-CT-100-1");
    assert!(calls[2].message.starts_with("[rework]"), "got: {}", calls[2].message);
    assert!(calls[2].message.contains("no tests"));
    // Fresh audit session for the second attempt.
    assert_eq!(calls[3].session_id, "linear-audit-CT-100-1");
}

#[tokio::test]
async fn exhausted_rework_attempts_escalate() {
    let h = harness_with(FakeClock::new(), |config| config.max_rework_attempts = 1);
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("attempt 0"));
    h.runner.push(ScriptedRun::success(FAIL_NO_TESTS));
    h.runner.push(ScriptedRun::success("attempt 1"));
    h.runner.push(ScriptedRun::success(FAIL_NO_TESTS));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    // Default policy: stuck dispatches stay active for humans to find.
    let state = h.engine.store().read().unwrap();
    let dispatch = state.active("CT-100").unwrap();
    assert_eq!(dispatch.status, claw_core::DispatchStatus::Stuck);
    assert_eq!(dispatch.stuck_reason.as_deref(), Some(STUCK_AUDIT_MAX_ATTEMPTS));
    assert!(state.completed("CT-100").is_none());

    // No third worker attempt.
    assert_eq!(h.runner.calls().len(), 4);

    // Exactly one escalation notification and one escalation comment.
    let kinds = h.notifier.kinds();
    assert_eq!(kinds.iter().filter(|k| **k == NotifyKind::Escalation).count(), 1);
    let comments = h.tracker.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("escalated"));
    assert!(comments[0].1.contains(STUCK_AUDIT_MAX_ATTEMPTS));
}

#[tokio::test]
async fn complete_stuck_policy_terminates_dispatch() {
    let h = harness_with(FakeClock::new(), |config| {
        config.max_rework_attempts = 0;
        config.complete_stuck_dispatches = true;
    });
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("attempt 0"));
    h.runner.push(ScriptedRun::success(FAIL_NO_TESTS));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert!(state.active("CT-100").is_none());
    assert_eq!(state.completed("CT-100").unwrap().status, claw_core::CompletionStatus::Failed);
}

#[tokio::test]
async fn worker_failure_escalates_without_retry() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::failure("compile error"));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    let dispatch = state.active("CT-100").unwrap();
    assert_eq!(dispatch.status, claw_core::DispatchStatus::Stuck);
    assert_eq!(dispatch.stuck_reason.as_deref(), Some(STUCK_WORKER_FAILED));

    // Non-watchdog failures are not retried; no audit ran.
    assert_eq!(h.runner.calls().len(), 1);
    assert!(h.notifier.kinds().contains(&NotifyKind::Escalation));
}

#[tokio::test]
async fn runner_error_escalates_like_failure() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::Error { reason: "backend unavailable".into() });

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert_eq!(state.active("CT-100").unwrap().status, claw_core::DispatchStatus::Stuck);
    assert_eq!(h.runner.calls().len(), 1);
}

#[tokio::test]
async fn unparsable_audit_output_counts_as_fail() {
    let h = harness_with(FakeClock::new(), |config| config.max_rework_attempts = 0);
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("did work"));
    h.runner.push(ScriptedRun::success("looks good to me!")); // no JSON verdict

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert_eq!(state.active("CT-100").unwrap().status, claw_core::DispatchStatus::Stuck);
    let (_, payload) = h
        .notifier
        .calls()
        .into_iter()
        .find(|(k, _)| *k == NotifyKind::Escalation)
        .expect("escalation notification");
    assert_eq!(payload.reason.as_deref(), Some(STUCK_AUDIT_MAX_ATTEMPTS));
}

#[tokio::test]
async fn duplicate_dispatch_registration_fails() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::success("work"));
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue.clone()).await.unwrap();

    // Re-registering right away: the completed record is evicted and a new
    // dispatch starts. But a dispatch still in flight must be rejected.
    use claw_storage::StateStore;
    h.engine.store().register(active_dispatch("CT-200")).await.unwrap();
    let err = h.engine.register_dispatch(active_dispatch("CT-200"), issue).await;
    assert!(err.is_err(), "second registration while active must fail");
}

#[tokio::test]
async fn duplicate_audit_trigger_is_absorbed() {
    use claw_core::{DispatchStatus, SessionMapping, SessionPhase, TransitionPatch};
    use claw_storage::StateStore;

    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");

    // Dispatch whose worker ran out-of-band: status working, no audit yet.
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

    let first = h.engine.trigger_audit("CT-100", &issue, 0).await.unwrap();
    let second = h.engine.trigger_audit("CT-100", &issue, 0).await.unwrap();

    assert!(first, "first trigger runs the audit");
    assert!(!second, "second trigger is absorbed by the idempotency guard");
    assert_eq!(h.runner.calls().len(), 1);
    let kinds = h.notifier.kinds();
    assert_eq!(kinds.iter().filter(|k| **k == NotifyKind::Auditing).count(), 1);
}

#[tokio::test]
async fn watchdog_kill_retries_once_then_succeeds() {
    // Real clock, tiny inactivity threshold: the first worker run stalls
    // until the watchdog aborts it, the retry streams activity and passes.
    let h = harness_with(SystemClock, |config| config.watchdog.inactivity_ms = 40);
    let issue = h.add_issue("CT-100");

    h.runner.push(ScriptedRun::StallUntilAbort);
    h.runner.push(ScriptedRun::success_with_stream(
        "done on retry",
        vec![
            StreamEvent::Reasoning { text: "let me look at the issue first".into() },
            StreamEvent::ToolResult { tool: "tests".into(), output: "all green".into() },
        ],
    ));
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert_eq!(state.completed("CT-100").unwrap().status, claw_core::CompletionStatus::Done);

    // The stalled session was aborted, and both worker runs share a session.
    assert_eq!(h.runner.aborted(), vec!["linear-worker-CT-100-0".to_string()]);
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].session_id, calls[1].session_id);

    // Tracker activity carries the retrying notice plus streamed activity.
    let activities = h.tracker.activities();
    assert!(activities.iter().any(|(_, a)| matches!(
        a,
        IssueActivity::Action { parameter, .. } if parameter.contains("retrying")
    )));
    assert!(activities.iter().any(|(_, a)| matches!(
        a,
        IssueActivity::Thought { body } if body.contains("look at the issue")
    )));

    // One watchdog-kill notification, and the pipeline still ended in done.
    let kinds = h.notifier.kinds();
    assert_eq!(kinds.iter().filter(|k| **k == NotifyKind::WatchdogKill).count(), 1);
    assert_eq!(kinds.last(), Some(&NotifyKind::AuditPass));
}

#[tokio::test]
async fn watchdog_kill_twice_escalates() {
    let h = harness_with(SystemClock, |config| config.watchdog.inactivity_ms = 40);
    let issue = h.add_issue("CT-100");
    h.runner.push(ScriptedRun::StallUntilAbort);
    h.runner.push(ScriptedRun::StallUntilAbort);

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    let dispatch = state.active("CT-100").unwrap();
    assert_eq!(dispatch.status, claw_core::DispatchStatus::Stuck);
    assert_eq!(dispatch.stuck_reason.as_deref(), Some(STUCK_WATCHDOG_KILL));
    assert_eq!(h.runner.aborted().len(), 2);
    assert!(h.notifier.kinds().contains(&NotifyKind::Escalation));
}

#[tokio::test]
async fn tracker_comment_failure_does_not_unpersist_verdict() {
    let h = harness(FakeClock::new());
    let issue = h.add_issue("CT-100");
    h.tracker.fail_comments();
    h.runner.push(ScriptedRun::success("work"));
    h.runner.push(ScriptedRun::success(PASS_VERDICT));

    h.engine.register_dispatch(active_dispatch("CT-100"), issue).await.unwrap();

    let state = h.engine.store().read().unwrap();
    assert_eq!(state.completed("CT-100").unwrap().status, claw_core::CompletionStatus::Done);
    assert!(h.notifier.kinds().contains(&NotifyKind::AuditPass));
}

#[tokio::test]
async fn cancel_dispatch_removes_record_and_sessions() {
    use claw_storage::StateStore;

    let h = harness(FakeClock::new());
    h.engine.store().register(active_dispatch("CT-100")).await.unwrap();
    h.engine.hydrate_registry().unwrap();

    let removed = h.engine.cancel_dispatch("CT-100").await.unwrap();
    assert!(removed.is_some());

    let state = h.engine.store().read().unwrap();
    assert!(state.active("CT-100").is_none());
    assert!(state.completed("CT-100").is_none());

    assert!(h.engine.cancel_dispatch("CT-100").await.unwrap().is_none());
}
