// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for engine tests: a real file store in a temp dir wired to
//! fake ports.

use crate::engine::{DispatchEngine, EngineDeps, IssueContext};
use claw_adapters::fake::{
    FakeAgentRunner, FakeIssueTracker, RecordingNotifier, StaticProfiles, StaticPromptBuilder,
};
use claw_adapters::Issue;
use claw_core::{Clock, DispatchConfig};
use claw_storage::FileStore;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) type TestEngine<C> = DispatchEngine<
    FileStore<C>,
    FakeIssueTracker,
    FakeAgentRunner,
    RecordingNotifier,
    StaticPromptBuilder,
    StaticProfiles,
    C,
>;

pub(crate) struct Harness<C: Clock> {
    pub engine: Arc<TestEngine<C>>,
    pub tracker: FakeIssueTracker,
    pub runner: FakeAgentRunner,
    pub notifier: RecordingNotifier,
    pub profiles: StaticProfiles,
    pub clock: C,
    // Keeps the state directory alive for the test's duration.
    #[allow(dead_code)]
    pub dir: TempDir,
}

pub(crate) fn harness<C: Clock>(clock: C) -> Harness<C> {
    harness_with(clock, |_| {})
}

pub(crate) fn harness_with<C: Clock>(
    clock: C,
    adjust: impl FnOnce(&mut DispatchConfig),
) -> Harness<C> {
    let dir = TempDir::new().expect("temp dir");
    let mut config = DispatchConfig {
        state_path: dir.path().join("state.json"),
        ..DispatchConfig::default()
    };
    adjust(&mut config);

    let store = FileStore::with_clock(config.state_path.clone(), clock.clone());
    let tracker = FakeIssueTracker::new();
    let runner = FakeAgentRunner::new();
    let notifier = RecordingNotifier::new();
    let profiles = StaticProfiles::new();

    let engine = Arc::new(DispatchEngine::new(
        store,
        EngineDeps {
            tracker: tracker.clone(),
            runner: runner.clone(),
            notifier: notifier.clone(),
            prompts: StaticPromptBuilder,
            profiles: profiles.clone(),
        },
        clock.clone(),
        config,
    ));

    Harness { engine, tracker, runner, notifier, profiles, clock, dir }
}

impl<C: Clock> Harness<C> {
    /// Seed the fake tracker with an issue and return its context.
    pub fn add_issue(&self, identifier: &str) -> IssueContext {
        let issue = Issue {
            id: format!("issue-uuid-{identifier}"),
            identifier: identifier.to_string(),
            title: format!("Fix {identifier}"),
            description: format!("Description of {identifier}"),
            comments: Vec::new(),
        };
        self.tracker.add_issue(issue.clone());
        issue.into()
    }
}
