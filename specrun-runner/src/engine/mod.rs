// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine: runs one [`SuiteTree`] to completion.
//!
//! The engine walks the tree depth-first in declaration order and streams a [`SpecEvent`] for
//! every suite and spec through a callback. Each spec runs its `before-each` hooks from the
//! outermost suite inwards, then its body, then its `after-each` hooks from the innermost suite
//! outwards. Every body is a future, raced against a timeout; panics are caught and recorded as
//! failures.

mod filter;

pub use filter::NameFilter;

use crate::{
    errors::{FilterBuildError, SpecError},
    helpers::panic_message,
    suite::{Body, Child, Hook, SpecContext, SpecNode, SuiteNode, SuiteTree},
    time::stopwatch,
};
use debug_ignore::DebugIgnore;
use filter::Selection;
use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use specrun_metadata::{
    FailureKind, FailureOrigin, FailureRecord, HookKind, PrematureExitSummary, ResultStatus,
    RunCounts, RunDoneSummary, RunStartedSummary, SpecEvent, SpecResult, SuiteResult,
};
use std::{panic::AssertUnwindSafe, time::Duration};
use tracing::debug;

/// Settings shared by every engine in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// The timeout for specs and hooks that don't set their own.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Only specs whose full name matches this regular expression run.
    pub filter: Option<String>,

    /// Whether the run is split across worker processes.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            filter: None,
            parallel: false,
        }
    }
}

/// How an engine run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The whole tree was traversed.
    Completed(RunDoneSummary),

    /// A spec or hook requested an early exit.
    Exited(PrematureExitSummary),
}

/// Runs suite trees.
#[derive(Clone, Debug)]
pub struct ExecutionEngine {
    default_timeout: Duration,
    filter: Option<NameFilter>,
}

impl ExecutionEngine {
    /// Creates a new engine, compiling the filter if there is one.
    pub fn new(config: &EngineConfig) -> Result<Self, FilterBuildError> {
        let filter = config.filter.as_deref().map(NameFilter::new).transpose()?;
        Ok(Self {
            default_timeout: config.default_timeout,
            filter,
        })
    }

    /// Runs `tree`, calling `callback` with every event in order.
    ///
    /// The last event is always [`SpecEvent::RunDone`] or [`SpecEvent::PrematureExit`], matching
    /// the returned outcome.
    pub async fn run<F>(&self, tree: &SuiteTree, callback: F) -> EngineOutcome
    where
        F: FnMut(SpecEvent) + Send,
    {
        let stopwatch = stopwatch();
        let mut state = RunState {
            engine: self,
            callback: DebugIgnore(callback),
            counts: RunCounts::default(),
        };

        (state.callback)(SpecEvent::RunStarted(RunStartedSummary {
            total_specs_defined: tree.spec_count(),
        }));

        let selection = Selection::new(self.filter.as_ref(), tree.has_focus());
        let root = tree.root();
        match state.run_suite_contents(root, Vec::new(), selection, None).await {
            Ok(root_failures) => {
                let mut failures = tree.global_failures().to_vec();
                failures.extend(root_failures);
                let summary = RunDoneSummary {
                    counts: state.counts,
                    failures,
                    duration: stopwatch.elapsed(),
                };
                debug!(
                    "engine finished: {} specs, {} failed",
                    summary.counts.total, summary.counts.failures
                );
                (state.callback)(SpecEvent::RunDone(summary.clone()));
                EngineOutcome::Completed(summary)
            }
            Err(exit) => {
                debug!("engine stopped early with code {}", exit.code);
                (state.callback)(SpecEvent::PrematureExit(exit.clone()));
                EngineOutcome::Exited(exit)
            }
        }
    }
}

#[derive(Debug)]
struct RunState<'e, F> {
    engine: &'e ExecutionEngine,
    callback: DebugIgnore<F>,
    counts: RunCounts,
}

/// Everything that happened while running one body.
#[derive(Debug, Default)]
struct BodyOutcome {
    failures: Vec<FailureRecord>,
    pending: Option<Option<String>>,
    exit: Option<i32>,
}

type Flow<T> = Result<T, PrematureExitSummary>;

impl<'e, F> RunState<'e, F>
where
    F: FnMut(SpecEvent) + Send,
{
    fn run_suite<'a>(
        &'a mut self,
        suite: &'a SuiteNode,
        scope: Vec<&'a SuiteNode>,
        selection: Selection<'a>,
        inherited_failures: Option<&'a [FailureRecord]>,
    ) -> BoxFuture<'a, Flow<()>>
    where
        'e: 'a,
    {
        async move {
            let stopwatch = stopwatch();
            (self.callback)(SpecEvent::SuiteStarted(suite.info()));

            let failures = self
                .run_suite_contents(suite, scope, selection, inherited_failures)
                .await?;

            let status = if !failures.is_empty() {
                ResultStatus::Failed
            } else if selection.enter(suite).selects_any(suite) {
                ResultStatus::Passed
            } else {
                ResultStatus::Excluded
            };
            (self.callback)(SpecEvent::SuiteDone(SuiteResult {
                suite: suite.info(),
                status,
                failures,
                duration: stopwatch.elapsed(),
            }));
            Ok(())
        }
        .boxed()
    }

    /// Runs `before-all` hooks, children and `after-all` hooks of `suite`, returning failures
    /// attributed to the suite itself.
    ///
    /// `selection` is the selection for the suite's children. Hooks run even if no child is
    /// selected. If `inherited_failures` is set, an enclosing `before-all` failed: hooks are
    /// skipped and every selected spec fails with those failures.
    async fn run_suite_contents<'a>(
        &'a mut self,
        suite: &'a SuiteNode,
        mut scope: Vec<&'a SuiteNode>,
        selection: Selection<'a>,
        inherited_failures: Option<&'a [FailureRecord]>,
    ) -> Flow<Vec<FailureRecord>>
    where
        'e: 'a,
    {
        let selection = selection.enter(suite);
        let runs_hooks = inherited_failures.is_none();
        scope.push(suite);

        let mut before_all_failures = Vec::new();
        if runs_hooks {
            for hook in suite.hooks.list(HookKind::BeforeAll) {
                let outcome = Self::run_hook(self.engine, hook, suite, SpecContext::new()).await;
                before_all_failures.extend(outcome.failures);
                if let Some(code) = outcome.exit {
                    return Err(PrematureExitSummary { code, spec: None });
                }
                if !before_all_failures.is_empty() {
                    break;
                }
            }
        }
        let blocked = match inherited_failures {
            Some(failures) => Some(failures),
            None if !before_all_failures.is_empty() => Some(before_all_failures.as_slice()),
            None => None,
        };

        for child in &suite.children {
            match child {
                Child::Suite(nested) => {
                    self.run_suite(nested, scope.clone(), selection, blocked)
                        .await?;
                }
                Child::Spec(spec) => {
                    self.run_spec(spec, &scope, selection.selects(spec), blocked)
                        .await?;
                }
            }
        }

        let mut failures = Vec::new();
        if runs_hooks {
            for hook in suite.hooks.list(HookKind::AfterAll) {
                let outcome = Self::run_hook(self.engine, hook, suite, SpecContext::new()).await;
                failures.extend(outcome.failures);
                if let Some(code) = outcome.exit {
                    return Err(PrematureExitSummary { code, spec: None });
                }
            }
        }
        Ok(failures)
    }

    async fn run_spec(
        &mut self,
        spec: &SpecNode,
        scope: &[&SuiteNode],
        selected: bool,
        blocked: Option<&[FailureRecord]>,
    ) -> Flow<()> {
        let stopwatch = stopwatch();
        (self.callback)(SpecEvent::SpecStarted(spec.info()));

        let mut failures = Vec::new();
        let mut pending_reason = None;
        let status = if !selected {
            ResultStatus::Excluded
        } else if let Some(blocked) = blocked {
            failures.extend_from_slice(blocked);
            ResultStatus::Failed
        } else if spec.is_statically_pending() {
            pending_reason = spec.pending_reason.clone();
            ResultStatus::Pending
        } else {
            let ctx = SpecContext::new();
            let mut pending = None;
            let exit = self
                .run_spec_with_hooks(spec, scope, &ctx, &mut failures, &mut pending)
                .await;
            if let Some(code) = exit {
                return Err(PrematureExitSummary {
                    code,
                    spec: Some(spec.full_name.clone()),
                });
            }
            if !failures.is_empty() {
                ResultStatus::Failed
            } else if let Some(reason) = pending {
                pending_reason = reason;
                ResultStatus::Pending
            } else {
                ResultStatus::Passed
            }
        };

        self.counts.record(status);
        (self.callback)(SpecEvent::SpecDone(SpecResult {
            spec: spec.info(),
            status,
            failures,
            pending_reason,
            duration: stopwatch.elapsed(),
        }));
        Ok(())
    }

    /// Runs a spec's body surrounded by its `each` hooks. Returns an exit code if one was
    /// requested.
    async fn run_spec_with_hooks(
        &mut self,
        spec: &SpecNode,
        scope: &[&SuiteNode],
        ctx: &SpecContext,
        failures: &mut Vec<FailureRecord>,
        pending: &mut Option<Option<String>>,
    ) -> Option<i32> {
        let mut skip_body = false;
        'before: for suite in scope {
            for hook in suite.hooks.list(HookKind::BeforeEach) {
                let outcome = Self::run_hook(self.engine, hook, suite, ctx.clone()).await;
                if outcome.exit.is_some() {
                    return outcome.exit;
                }
                if !outcome.failures.is_empty() {
                    failures.extend(outcome.failures);
                    skip_body = true;
                    break 'before;
                }
            }
        }

        if !skip_body {
            // The body was declared with a body; statically pending specs never get here.
            if let Some(body) = &spec.body {
                let timeout = spec.timeout.unwrap_or(self.engine.default_timeout);
                let outcome = run_body(
                    body,
                    ctx.clone(),
                    timeout,
                    "spec",
                    FailureOrigin::SpecBody,
                    spec.location.as_deref(),
                )
                .await;
                if outcome.exit.is_some() {
                    return outcome.exit;
                }
                failures.extend(outcome.failures);
                *pending = outcome.pending;
            }
        }

        for suite in scope.iter().rev() {
            for hook in suite.hooks.list(HookKind::AfterEach).iter().rev() {
                let outcome = Self::run_hook(self.engine, hook, suite, ctx.clone()).await;
                if outcome.exit.is_some() {
                    return outcome.exit;
                }
                failures.extend(outcome.failures);
            }
        }
        None
    }

    /// Runs a hook declared on `suite`.
    ///
    /// Takes the engine instead of `&self` so that suite futures stay `Send`.
    async fn run_hook(
        engine: &ExecutionEngine,
        hook: &Hook,
        suite: &SuiteNode,
        ctx: SpecContext,
    ) -> BodyOutcome {
        let timeout = hook.timeout.unwrap_or(engine.default_timeout);
        let what = format!("{} hook", hook.kind);
        let location = hook.location.as_deref().or(suite.location.as_deref());
        let mut outcome = run_body(
            &hook.body,
            ctx,
            timeout,
            &what,
            FailureOrigin::Hook(hook.kind),
            location,
        )
        .await;
        // Hooks can't be pending.
        outcome.pending = None;
        outcome
    }
}

/// Runs a single body against a timeout, catching panics.
///
/// Panics and timeouts carry no stack of their own, so they are attributed to `location`.
async fn run_body(
    body: &Body,
    ctx: SpecContext,
    timeout: Duration,
    what: &str,
    origin: FailureOrigin,
    location: Option<&str>,
) -> BodyOutcome {
    let result = tokio::time::timeout(
        timeout,
        AssertUnwindSafe(body.invoke(ctx.clone())).catch_unwind(),
    )
    .await;

    let mut outcome = BodyOutcome {
        failures: ctx
            .take_failures()
            .into_iter()
            .map(|failure| failure.into_record(origin))
            .collect(),
        ..Default::default()
    };

    match result {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(SpecError::Thrown { message, location }))) => {
            outcome.failures.push(FailureRecord {
                message,
                stack: location,
                origin,
                kind: FailureKind::Error,
            });
        }
        Ok(Ok(Err(SpecError::Pending { reason }))) => outcome.pending = Some(reason),
        Ok(Ok(Err(SpecError::Exit { code }))) => outcome.exit = Some(code),
        Ok(Err(payload)) => {
            outcome.failures.push(FailureRecord {
                message: panic_message(&*payload),
                stack: location.map(ToOwned::to_owned),
                origin,
                kind: FailureKind::Error,
            });
        }
        Err(_elapsed) => {
            outcome.failures.push(FailureRecord {
                message: format!(
                    "Timeout - {what} did not complete within {}ms",
                    timeout.as_millis()
                ),
                stack: location.map(ToOwned::to_owned),
                origin,
                kind: FailureKind::Timeout,
            });
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{SpecDecl, SuiteBuilder, SuiteDecl};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn pass() -> Body {
        Body::from_fn(|_| Ok(()))
    }

    fn fail(message: &'static str) -> Body {
        Body::from_fn(move |ctx| {
            ctx.fail(message);
            Ok(())
        })
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Body {
        let counter = counter.clone();
        Body::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    async fn run(builder: SuiteBuilder, config: EngineConfig) -> (Vec<SpecEvent>, EngineOutcome) {
        let engine = ExecutionEngine::new(&config).unwrap();
        let tree = builder.finish();
        let mut events = Vec::new();
        let outcome = engine.run(&tree, |event| events.push(event)).await;
        (events, outcome)
    }

    fn spec_results(events: &[SpecEvent]) -> Vec<(String, ResultStatus)> {
        events
            .iter()
            .filter_map(|event| match event {
                SpecEvent::SpecDone(result) => {
                    Some((result.spec.full_name.clone(), result.status))
                }
                _ => None,
            })
            .collect()
    }

    fn completed(outcome: EngineOutcome) -> RunDoneSummary {
        match outcome {
            EngineOutcome::Completed(summary) => summary,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn statuses_and_counts() {
        let mut builder = SuiteBuilder::new(false);
        builder.describe("suite", |b| {
            b.it("passes", pass());
            b.it("fails", fail("Expected 1 to be 2."));
            b.it_pending("is pending");
            b.it(
                "pends itself",
                Body::from_fn(|_| Err(SpecError::Pending { reason: None })),
            );
            b.xit("is excluded", pass());
        });

        let (events, outcome) = run(builder, EngineConfig::default()).await;
        assert!(matches!(
            events.first(),
            Some(SpecEvent::RunStarted(RunStartedSummary {
                total_specs_defined: 5
            }))
        ));
        assert_eq!(
            spec_results(&events),
            vec![
                ("suite passes".to_owned(), ResultStatus::Passed),
                ("suite fails".to_owned(), ResultStatus::Failed),
                ("suite is pending".to_owned(), ResultStatus::Pending),
                ("suite pends itself".to_owned(), ResultStatus::Pending),
                ("suite is excluded".to_owned(), ResultStatus::Excluded),
            ]
        );

        let summary = completed(outcome);
        assert_eq!(
            summary.counts,
            RunCounts {
                total: 5,
                failures: 1,
                pending: 2,
                excluded: 1,
            }
        );
        assert!(matches!(events.last(), Some(SpecEvent::RunDone(_))));
    }

    #[tokio::test]
    async fn hook_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let entry = |name: &'static str| {
            let log = log.clone();
            Body::from_fn(move |_| {
                log.lock().unwrap().push(name);
                Ok(())
            })
        };

        let mut builder = SuiteBuilder::new(false);
        builder.before_each(entry("root before-each"));
        builder.after_each(entry("root after-each"));
        builder.describe("outer", |b| {
            b.before_all(entry("outer before-all"));
            b.before_each(entry("outer before-each"));
            b.after_each(entry("outer after-each"));
            b.after_all(entry("outer after-all"));
            b.it("spec", entry("body"));
        });
        run(builder, EngineConfig::default()).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "outer before-all",
                "root before-each",
                "outer before-each",
                "body",
                "outer after-each",
                "root after-each",
                "outer after-all",
            ]
        );
    }

    #[tokio::test]
    async fn before_each_failure_skips_body_but_not_after_each() {
        let body_runs = Arc::new(AtomicUsize::new(0));
        let after_runs = Arc::new(AtomicUsize::new(0));

        let mut builder = SuiteBuilder::new(false);
        builder.describe("suite", |b| {
            b.before_each(Body::from_fn(|_| Err(SpecError::thrown("before failed"))));
            b.after_each(counting(&after_runs));
            b.it("spec", counting(&body_runs));
        });

        let (events, _) = run(builder, EngineConfig::default()).await;
        assert_eq!(body_runs.load(Ordering::SeqCst), 0);
        assert_eq!(after_runs.load(Ordering::SeqCst), 1);

        let SpecEvent::SpecDone(result) = &events[3] else {
            panic!("expected spec-done, got {:?}", events[3]);
        };
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.failures[0].message, "before failed");
        assert_eq!(
            result.failures[0].origin,
            FailureOrigin::Hook(HookKind::BeforeEach)
        );
    }

    #[tokio::test]
    async fn before_all_failure_fails_every_spec_in_scope() {
        let body_runs = Arc::new(AtomicUsize::new(0));
        let nested_hook_runs = Arc::new(AtomicUsize::new(0));

        let mut builder = SuiteBuilder::new(false);
        builder.describe("suite", |b| {
            b.before_all(fail("setup failed"));
            b.it("first", counting(&body_runs));
            b.describe("nested", |b| {
                b.before_all(counting(&nested_hook_runs));
                b.it("second", counting(&body_runs));
            });
        });
        builder.it("outside", pass());

        let (events, outcome) = run(builder, EngineConfig::default()).await;
        assert_eq!(body_runs.load(Ordering::SeqCst), 0);
        assert_eq!(nested_hook_runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            spec_results(&events),
            vec![
                ("suite first".to_owned(), ResultStatus::Failed),
                ("suite nested second".to_owned(), ResultStatus::Failed),
                ("outside".to_owned(), ResultStatus::Passed),
            ]
        );
        assert_eq!(completed(outcome).counts.failures, 2);
    }

    #[tokio::test]
    async fn after_all_failures() {
        let mut builder = SuiteBuilder::new(false);
        builder.describe("suite", |b| {
            b.after_all(fail("suite teardown failed"));
            b.it("passes", pass());
        });
        builder.after_all(fail("top-level teardown failed"));

        let (events, outcome) = run(builder, EngineConfig::default()).await;
        let suite_done = events
            .iter()
            .find_map(|event| match event {
                SpecEvent::SuiteDone(result) => Some(result),
                _ => None,
            })
            .unwrap();
        assert_eq!(suite_done.status, ResultStatus::Failed);
        assert_eq!(suite_done.failures[0].message, "suite teardown failed");

        let summary = completed(outcome);
        assert_eq!(summary.counts.failures, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].message, "top-level teardown failed");
    }

    #[tokio::test]
    async fn timeouts_and_panics_are_failures() {
        let mut builder = SuiteBuilder::new(false);
        builder.it(
            "hangs",
            Body::from_async(|_| futures::future::pending::<Result<(), SpecError>>()),
        );
        builder.it("panics", Body::from_fn(|_| panic!("kaboom")));

        let config = EngineConfig {
            default_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let (events, _) = run(builder, config).await;

        let failures: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                SpecEvent::SpecDone(result) => Some(result.failures[0].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            failures[0].message,
            "Timeout - spec did not complete within 20ms"
        );
        assert_eq!(failures[0].kind, FailureKind::Timeout);
        assert_eq!(failures[1].message, "kaboom");
        assert_eq!(failures[1].kind, FailureKind::Error);
    }

    #[tokio::test]
    async fn exit_stops_the_run() {
        let later = Arc::new(AtomicUsize::new(0));
        let mut builder = SuiteBuilder::new(false);
        builder.describe("outer", |b| {
            b.it("exits", Body::from_fn(|_| Err(SpecError::Exit { code: 4 })));
            b.it("never runs", counting(&later));
        });

        let (events, outcome) = run(builder, EngineConfig::default()).await;
        let expected = PrematureExitSummary {
            code: 4,
            spec: Some("outer exits".to_owned()),
        };
        assert_eq!(outcome, EngineOutcome::Exited(expected.clone()));
        assert_eq!(events.last(), Some(&SpecEvent::PrematureExit(expected)));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn focus_and_filter_select_specs() {
        let mut builder = SuiteBuilder::new(false);
        builder.describe("a", |b| {
            b.fit("focused", pass());
            b.it("unfocused", pass());
        });
        builder.fdescribe("b", |b| {
            b.it("inherits focus", pass());
        });
        let (events, outcome) = run(builder, EngineConfig::default()).await;
        assert_eq!(
            spec_results(&events),
            vec![
                ("a focused".to_owned(), ResultStatus::Passed),
                ("a unfocused".to_owned(), ResultStatus::Excluded),
                ("b inherits focus".to_owned(), ResultStatus::Passed),
            ]
        );
        assert_eq!(completed(outcome).counts.executed(), 2);

        let mut builder = SuiteBuilder::new(false);
        builder.describe("math", |b| {
            b.it("adds", pass());
            b.it("subtracts", pass());
        });
        let config = EngineConfig {
            filter: Some("adds$".to_owned()),
            ..Default::default()
        };
        let (events, _) = run(builder, config).await;
        assert_eq!(
            spec_results(&events),
            vec![
                ("math adds".to_owned(), ResultStatus::Passed),
                ("math subtracts".to_owned(), ResultStatus::Excluded),
            ]
        );
    }

    #[tokio::test]
    async fn all_hooks_run_when_nothing_in_the_suite_is_selected() {
        let before_runs = Arc::new(AtomicUsize::new(0));
        let after_runs = Arc::new(AtomicUsize::new(0));
        let mut builder = SuiteBuilder::new(false);
        builder.describe("filtered", |b| {
            b.before_all(counting(&before_runs));
            b.after_all(counting(&after_runs));
            b.it("spec", pass());
        });
        builder.it("kept", pass());

        let config = EngineConfig {
            filter: Some("^kept$".to_owned()),
            ..Default::default()
        };
        let (events, _) = run(builder, config).await;
        assert_eq!(before_runs.load(Ordering::SeqCst), 1);
        assert_eq!(after_runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            spec_results(&events),
            vec![
                ("filtered spec".to_owned(), ResultStatus::Excluded),
                ("kept".to_owned(), ResultStatus::Passed),
            ]
        );
    }

    #[tokio::test]
    async fn timeouts_and_panics_point_at_their_declaration() {
        let mut builder = SuiteBuilder::new(false);
        builder.open_suite(SuiteDecl {
            description: "suite".to_owned(),
            location: Some("at spec/suite.toml:1".to_owned()),
            ..Default::default()
        });
        builder.add_spec(SpecDecl {
            description: "hangs".to_owned(),
            body: Some(Body::from_async(|_| {
                futures::future::pending::<Result<(), SpecError>>()
            })),
            location: Some("at spec/suite.toml:2".to_owned()),
            ..Default::default()
        });
        // No location of its own: falls back to the suite's.
        builder.add_hook(Hook::new(
            HookKind::AfterAll,
            Body::from_fn(|_| panic!("teardown exploded")),
        ));
        builder.close_suite();

        let config = EngineConfig {
            default_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let (events, _) = run(builder, config).await;

        let spec_failure = events
            .iter()
            .find_map(|event| match event {
                SpecEvent::SpecDone(result) => Some(result.failures[0].clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(spec_failure.kind, FailureKind::Timeout);
        assert_eq!(spec_failure.stack.as_deref(), Some("at spec/suite.toml:2"));

        let suite_failure = events
            .iter()
            .find_map(|event| match event {
                SpecEvent::SuiteDone(result) => Some(result.failures[0].clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(suite_failure.message, "teardown exploded");
        assert_eq!(suite_failure.stack.as_deref(), Some("at spec/suite.toml:1"));
    }

    #[test]
    fn run_future_is_send_with_a_non_sync_callback() {
        fn assert_send<T: Send>(_: &T) {}

        let engine = ExecutionEngine::new(&EngineConfig::default()).unwrap();
        let mut builder = SuiteBuilder::new(false);
        builder.describe("suite", |b| {
            b.before_all(pass());
            b.before_each(pass());
            b.it("spec", pass());
        });
        let tree = builder.finish();
        let seen = Cell::new(0);
        let future = engine.run(&tree, move |_| seen.set(seen.get() + 1));
        assert_send(&future);
    }
}
