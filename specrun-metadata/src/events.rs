// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// A single unit of progress streamed out of an execution engine.
///
/// Within one source, events are totally ordered: `run-started` comes first, and exactly one of
/// `run-done`, `fatal-error` or `premature-exit` comes last. Across sources there is no ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SpecEvent {
    /// The engine is about to start traversing its suite tree.
    RunStarted(RunStartedSummary),

    /// A suite is about to run its `before-all` hooks.
    SuiteStarted(SuiteInfo),

    /// A spec is about to run.
    SpecStarted(SpecInfo),

    /// A spec finished.
    SpecDone(SpecResult),

    /// A suite finished, including its `after-all` hooks.
    SuiteDone(SuiteResult),

    /// The engine finished traversing its tree.
    RunDone(RunDoneSummary),

    /// An error occurred that terminates the source.
    FatalError(FatalErrorSummary),

    /// A spec requested an early exit. Nothing follows this event.
    PrematureExit(PrematureExitSummary),
}

impl SpecEvent {
    /// Returns true if no further events can follow this one from the same source.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SpecEvent::RunDone(_) | SpecEvent::FatalError(_) | SpecEvent::PrematureExit(_)
        )
    }
}

/// A [`SpecEvent`] tagged with the worker it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourcedEvent {
    /// The worker index, or `None` for a non-parallel run.
    pub source: Option<usize>,

    /// The event.
    pub event: SpecEvent,
}

/// Payload of [`SpecEvent::RunStarted`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStartedSummary {
    /// The number of specs registered in the tree, including excluded ones.
    pub total_specs_defined: usize,
}

/// Identifies a suite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteInfo {
    /// An identifier unique within one source, e.g. `suite3`.
    pub id: String,

    /// The suite's own description.
    pub description: String,

    /// Descriptions of all enclosing suites and this one, joined by spaces.
    pub full_name: String,

    /// The file the suite was declared in.
    pub file: Option<Utf8PathBuf>,
}

/// Identifies a spec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpecInfo {
    /// An identifier unique within one source, e.g. `spec7`.
    pub id: String,

    /// The spec's own description.
    pub description: String,

    /// Descriptions of all enclosing suites and this spec, joined by spaces.
    pub full_name: String,

    /// The file the spec was declared in.
    pub file: Option<Utf8PathBuf>,
}

/// Payload of [`SpecEvent::SpecDone`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpecResult {
    /// The spec this result is for.
    pub spec: SpecInfo,

    /// The final status.
    pub status: ResultStatus,

    /// Failures in the order they were recorded.
    pub failures: Vec<FailureRecord>,

    /// Why the spec is pending, if it is.
    pub pending_reason: Option<String>,

    /// Time spent running the spec and its `each` hooks.
    pub duration: Duration,
}

/// Payload of [`SpecEvent::SuiteDone`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteResult {
    /// The suite this result is for.
    pub suite: SuiteInfo,

    /// The final status. A suite only fails on its own `after-all` failures.
    pub status: ResultStatus,

    /// Failures attributed to the suite itself.
    pub failures: Vec<FailureRecord>,

    /// Time spent running the suite.
    pub duration: Duration,
}

/// Payload of [`SpecEvent::RunDone`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunDoneSummary {
    /// Totals for the tree that was run.
    pub counts: RunCounts,

    /// Failures that are not attributed to any spec or suite: spec files that failed to load, and
    /// top-level `after-all` failures.
    pub failures: Vec<FailureRecord>,

    /// Time spent running the tree.
    pub duration: Duration,
}

/// Payload of [`SpecEvent::FatalError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FatalErrorSummary {
    /// A string identifying the underlying error.
    ///
    /// Two fatal errors with the same identity are the same error observed twice (for example, a
    /// broken helper file loaded by every worker), and are only reported once.
    pub identity: String,

    /// The kind of fatal error.
    pub kind: FatalErrorKind,

    /// A human-readable message.
    pub message: String,

    /// A location, if one is known.
    pub location: Option<String>,
}

/// The kind of a [`FatalErrorSummary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FatalErrorKind {
    /// A require or helper file failed to load.
    LoadFailure,

    /// A worker exited without reporting a terminal event.
    WorkerCrash,

    /// A worker was handed a configuration it could not use.
    Configuration,

    /// Global setup reported a failure.
    GlobalSetup,

    /// Global teardown reported a failure.
    GlobalTeardown,

    /// Global setup panicked.
    UnhandledGlobalSetup,

    /// Global teardown panicked.
    UnhandledGlobalTeardown,
}

/// Payload of [`SpecEvent::PrematureExit`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrematureExitSummary {
    /// The exit code the spec asked for.
    pub code: i32,

    /// The full name of the spec that requested the exit, if any.
    pub spec: Option<String>,
}

/// The status of a spec or suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    /// Ran without failures.
    Passed,

    /// Ran, and at least one failure was recorded.
    Failed,

    /// Marked pending, either statically or from inside its body.
    Pending,

    /// Not selected to run.
    Excluded,
}

impl ResultStatus {
    /// Returns the progress glyph for this status, if any.
    pub fn glyph(self) -> Option<char> {
        match self {
            ResultStatus::Passed => Some('.'),
            ResultStatus::Failed => Some('F'),
            ResultStatus::Pending => Some('*'),
            ResultStatus::Excluded => None,
        }
    }
}

/// A single recorded failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureRecord {
    /// The failure message, e.g. `Expected 1 to be 2.`
    pub message: String,

    /// Where the failure came from, as a stack-like location (`at spec/one.toml:4`).
    pub stack: Option<String>,

    /// What was running when the failure was recorded.
    pub origin: FailureOrigin,

    /// What sort of failure this is.
    pub kind: FailureKind,
}

/// What was running when a failure was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureOrigin {
    /// A spec body.
    SpecBody,

    /// A hook.
    Hook(HookKind),

    /// Loading a spec file.
    Load,

    /// Outside of any suite.
    Global,
}

/// What sort of failure a [`FailureRecord`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// An expectation did not hold.
    Expectation,

    /// An error was thrown, or a panic occurred.
    Error,

    /// The spec or hook did not complete in time.
    Timeout,

    /// A file failed to load.
    Load,

    /// A file registered something it isn't allowed to.
    Configuration,
}

/// The kind of a hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    /// Runs once before all specs in a suite.
    BeforeAll,

    /// Runs once after all specs in a suite.
    AfterAll,

    /// Runs before every spec in scope.
    BeforeEach,

    /// Runs after every spec in scope.
    AfterEach,
}

impl HookKind {
    /// Returns true for `before-each` and `after-each`.
    pub fn is_each(self) -> bool {
        matches!(self, HookKind::BeforeEach | HookKind::AfterEach)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::BeforeAll => write!(f, "beforeAll"),
            HookKind::AfterAll => write!(f, "afterAll"),
            HookKind::BeforeEach => write!(f, "beforeEach"),
            HookKind::AfterEach => write!(f, "afterEach"),
        }
    }
}

/// Spec counts for a run or a portion of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunCounts {
    /// Every spec that reported a result, excluded ones included.
    pub total: usize,

    /// Specs that failed.
    pub failures: usize,

    /// Specs that are pending.
    pub pending: usize,

    /// Specs that were not selected to run.
    pub excluded: usize,
}

impl RunCounts {
    /// Records a single spec result.
    pub fn record(&mut self, status: ResultStatus) {
        self.total += 1;
        match status {
            ResultStatus::Passed => {}
            ResultStatus::Failed => self.failures += 1,
            ResultStatus::Pending => self.pending += 1,
            ResultStatus::Excluded => self.excluded += 1,
        }
    }

    /// Adds another set of counts to this one.
    pub fn add(&mut self, other: &RunCounts) {
        self.total += other.total;
        self.failures += other.failures;
        self.pending += other.pending;
        self.excluded += other.excluded;
    }

    /// The number of specs that actually ran (or were marked pending).
    pub fn executed(&self) -> usize {
        self.total - self.excluded
    }
}
