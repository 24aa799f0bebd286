// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced by the multiplexer, and the final report of a run.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use specrun_metadata::{
    FailureRecord, FatalErrorSummary, PrematureExitSummary, RunCounts, SpecResult,
    SpecrunExitCode, SuiteResult,
};
use std::time::Duration;

/// A single step in the narrative of a run, as seen by reporters.
///
/// Narrative events are produced by the [`ReporterMultiplexer`](super::ReporterMultiplexer) and
/// the coordinator from the unordered union of every worker's events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum NarrativeEvent {
    /// The run started.
    RunStarted {
        /// The number of workers, or `None` for a non-parallel run.
        worker_count: Option<usize>,
    },

    /// A spec finished on some worker.
    SpecProgress {
        /// The worker the spec ran on.
        source: Option<usize>,

        /// The spec's result.
        result: SpecResult,
    },

    /// A line printed by a worker that isn't an event.
    Output {
        /// The worker that printed the line.
        source: Option<usize>,

        /// The line.
        line: String,
    },

    /// A fatal error, reported for the first time.
    FatalError {
        /// The worker the error came from, if any.
        source: Option<usize>,

        /// The error.
        error: FatalErrorSummary,
    },

    /// A spec requested an early exit.
    PrematureExit {
        /// The worker the request came from.
        source: Option<usize>,

        /// Details about the exit.
        exit: PrematureExitSummary,
    },

    /// Every worker has finished. Not produced for runs that ended with a fatal error.
    RunFinished {
        /// The final report.
        report: AggregateReport,
    },
}

/// The merged result of every source in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AggregateReport {
    /// Counts summed across sources.
    pub counts: RunCounts,

    /// The number of specs defined across sources, including excluded ones.
    pub total_specs_defined: usize,

    /// Failed specs, grouped by source in worker index order.
    pub spec_failures: Vec<SpecResult>,

    /// Failed suites, grouped by source in worker index order.
    pub suite_failures: Vec<SuiteResult>,

    /// Failures outside of any suite, such as spec files that failed to load.
    pub global_failures: Vec<FailureRecord>,

    /// Pending specs, grouped by source in worker index order.
    pub pending: Vec<SpecResult>,

    /// Distinct fatal errors, in the order they were first seen.
    pub fatal_errors: Vec<FatalErrorSummary>,

    /// The first early-exit request, if any.
    pub premature_exit: Option<PrematureExitSummary>,

    /// The number of workers, or `None` for a non-parallel run.
    pub worker_count: Option<usize>,

    /// When the run started.
    pub started_at: DateTime<FixedOffset>,

    /// How long the run took.
    pub duration: Duration,
}

impl AggregateReport {
    /// The number of failures shown in the summary line: failed specs, failed suites and failures
    /// outside of any suite.
    pub fn failure_count(&self) -> usize {
        self.counts.failures + self.suite_failures.len() + self.global_failures.len()
    }

    /// The overall status of the run.
    pub fn status(&self) -> OverallStatus {
        if !self.fatal_errors.is_empty() {
            OverallStatus::Fatal
        } else if self.premature_exit.is_some() {
            OverallStatus::Exited
        } else if self.failure_count() > 0 {
            OverallStatus::Failed
        } else if self.counts.executed() == 0 {
            OverallStatus::Incomplete
        } else {
            OverallStatus::Passed
        }
    }

    /// The process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }
}

/// The overall status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    /// Specs ran and none failed.
    Passed,

    /// At least one spec, suite or spec file failed.
    Failed,

    /// Nothing failed, but no specs ran.
    Incomplete,

    /// A spec requested an early exit.
    Exited,

    /// A fatal error occurred.
    Fatal,
}

impl OverallStatus {
    /// Returns the process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            OverallStatus::Passed => SpecrunExitCode::OK,
            OverallStatus::Failed => SpecrunExitCode::FAILED,
            OverallStatus::Incomplete => SpecrunExitCode::INCOMPLETE,
            OverallStatus::Exited => SpecrunExitCode::PREMATURE_EXIT,
            OverallStatus::Fatal => SpecrunExitCode::FATAL,
        }
    }
}
