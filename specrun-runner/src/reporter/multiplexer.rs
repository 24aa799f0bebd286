// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::events::{AggregateReport, NarrativeEvent};
use crate::{
    ipc::{ChannelClosed, ChannelMessage, SourcedMessage},
    time::StopwatchSnapshot,
};
use specrun_metadata::{
    FailureRecord, FatalErrorKind, FatalErrorSummary, PrematureExitSummary, ResultStatus,
    RunCounts, SpecEvent, SpecResult, SuiteResult,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Merges the event streams of every worker in a run into a single narrative.
///
/// Messages from different sources may arrive in any order. Progress is passed on as soon as it
/// arrives, while failure details are kept per source and reported in worker index order once the
/// run is over.
#[derive(Debug)]
pub struct ReporterMultiplexer {
    worker_count: Option<usize>,
    sources: BTreeMap<Option<usize>, SourceState>,
    seen_identities: HashSet<String>,
    counts: RunCounts,
    total_specs_defined: usize,
    fatal_errors: Vec<FatalErrorSummary>,
    premature_exit: Option<PrematureExitSummary>,
    cancelling: bool,
}

impl ReporterMultiplexer {
    /// Creates a multiplexer for `worker_count` workers, or for a single in-process source if
    /// `worker_count` is `None`.
    pub fn new(worker_count: Option<usize>) -> Self {
        let sources = match worker_count {
            Some(count) => (0..count)
                .map(|index| (Some(index), SourceState::default()))
                .collect(),
            None => [(None, SourceState::default())].into_iter().collect(),
        };
        Self {
            worker_count,
            sources,
            seen_identities: HashSet::new(),
            counts: RunCounts::default(),
            total_specs_defined: 0,
            fatal_errors: Vec::new(),
            premature_exit: None,
            cancelling: false,
        }
    }

    /// Handles a message from a worker, returning the narrative events it produces.
    pub fn handle(&mut self, message: SourcedMessage) -> Vec<NarrativeEvent> {
        let SourcedMessage { source, message } = message;
        match message {
            ChannelMessage::Event(event) => self.handle_event(source, event),
            ChannelMessage::Output { line } => vec![NarrativeEvent::Output { source, line }],
            ChannelMessage::Closed(closed) => self.handle_closed(source, closed),
        }
    }

    fn handle_event(&mut self, source: Option<usize>, event: SpecEvent) -> Vec<NarrativeEvent> {
        let Some(state) = self.sources.get_mut(&source) else {
            warn!("ignoring event from unknown source {source:?}");
            return Vec::new();
        };
        if state.status != SourceStatus::Running {
            warn!("ignoring event from source {source:?} after it finished: {event:?}");
            return Vec::new();
        }

        match event {
            SpecEvent::RunStarted(summary) => {
                self.total_specs_defined += summary.total_specs_defined;
                Vec::new()
            }
            SpecEvent::SuiteStarted(_) | SpecEvent::SpecStarted(_) => Vec::new(),
            SpecEvent::SpecDone(result) => {
                self.counts.record(result.status);
                match result.status {
                    ResultStatus::Failed => state.failed_specs.push(result.clone()),
                    ResultStatus::Pending => state.pending.push(result.clone()),
                    ResultStatus::Passed | ResultStatus::Excluded => {}
                }
                vec![NarrativeEvent::SpecProgress { source, result }]
            }
            SpecEvent::SuiteDone(result) => {
                if result.status == ResultStatus::Failed {
                    state.failed_suites.push(result);
                }
                Vec::new()
            }
            SpecEvent::RunDone(summary) => {
                debug!(
                    "source {source:?} done: {} specs, {} failures",
                    summary.counts.total, summary.counts.failures,
                );
                state.status = SourceStatus::Done;
                state.global_failures.extend(summary.failures);
                Vec::new()
            }
            SpecEvent::FatalError(error) => {
                state.status = SourceStatus::Fatal;
                self.record_fatal(source, error).into_iter().collect()
            }
            SpecEvent::PrematureExit(exit) => {
                state.status = SourceStatus::Exited;
                if self.premature_exit.is_none() {
                    self.premature_exit = Some(exit.clone());
                }
                vec![NarrativeEvent::PrematureExit { source, exit }]
            }
        }
    }

    fn handle_closed(&mut self, source: Option<usize>, closed: ChannelClosed) -> Vec<NarrativeEvent> {
        let cancelling = self.cancelling;
        let Some(state) = self.sources.get_mut(&source) else {
            warn!("ignoring close from unknown source {source:?}");
            return Vec::new();
        };
        state.closed = true;
        if state.status != SourceStatus::Running {
            return Vec::new();
        }

        if cancelling {
            debug!("source {source:?} cancelled: {}", closed.description);
            state.status = SourceStatus::Cancelled;
            return Vec::new();
        }

        state.status = SourceStatus::Crashed;
        let name = source_name(source);
        let error = FatalErrorSummary {
            identity: format!("worker-crash:{name}"),
            kind: FatalErrorKind::WorkerCrash,
            message: format!(
                "{name} exited before finishing its specs ({})",
                closed.description
            ),
            location: None,
        };
        self.record_fatal(source, error).into_iter().collect()
    }

    /// Records a fatal error that didn't arrive through a worker's channel, such as a global setup
    /// failure.
    ///
    /// Returns a narrative event unless an error with the same identity has already been recorded.
    pub fn record_fatal(
        &mut self,
        source: Option<usize>,
        error: FatalErrorSummary,
    ) -> Option<NarrativeEvent> {
        if !self.seen_identities.insert(error.identity.clone()) {
            debug!("suppressing duplicate fatal error `{}`", error.identity);
            return None;
        }
        self.fatal_errors.push(error.clone());
        Some(NarrativeEvent::FatalError { source, error })
    }

    /// Marks a worker that could not be started as finished, recording `error`.
    pub fn source_failed_to_start(
        &mut self,
        source: Option<usize>,
        error: FatalErrorSummary,
    ) -> Option<NarrativeEvent> {
        if let Some(state) = self.sources.get_mut(&source) {
            state.status = SourceStatus::Fatal;
            state.closed = true;
        }
        self.record_fatal(source, error)
    }

    /// Returns true if remaining workers should be stopped and cancellation hasn't started yet.
    pub fn needs_cancel(&self) -> bool {
        !self.cancelling && (!self.fatal_errors.is_empty() || self.premature_exit.is_some())
    }

    /// Records that remaining workers are being stopped. Sources that close from now on without a
    /// terminal event are considered cancelled rather than crashed.
    pub fn begin_cancel(&mut self) {
        self.cancelling = true;
    }

    /// Records an early exit requested from outside of any worker, e.g. by a signal.
    pub fn record_premature_exit(&mut self, exit: PrematureExitSummary) -> Option<NarrativeEvent> {
        if self.premature_exit.is_some() {
            return None;
        }
        self.premature_exit = Some(exit.clone());
        Some(NarrativeEvent::PrematureExit { source: None, exit })
    }

    /// Returns true once every source's channel has closed.
    pub fn is_finished(&self) -> bool {
        self.sources.values().all(|state| state.closed)
    }

    /// Closes every source that is still open, e.g. because the channel they send to went away.
    pub fn finish_sources(&mut self) -> Vec<NarrativeEvent> {
        let open: Vec<_> = self
            .sources
            .iter()
            .filter(|(_, state)| !state.closed)
            .map(|(source, _)| *source)
            .collect();
        open.into_iter()
            .flat_map(|source| {
                self.handle_closed(
                    source,
                    ChannelClosed {
                        exit_code: None,
                        description: "channel closed unexpectedly".to_owned(),
                    },
                )
            })
            .collect()
    }

    /// Returns true if a fatal error has been recorded.
    pub fn is_fatal(&self) -> bool {
        !self.fatal_errors.is_empty()
    }

    /// Builds the final report.
    pub(crate) fn report(&self, snapshot: StopwatchSnapshot) -> AggregateReport {
        let mut report = AggregateReport {
            counts: self.counts,
            total_specs_defined: self.total_specs_defined,
            spec_failures: Vec::new(),
            suite_failures: Vec::new(),
            global_failures: Vec::new(),
            pending: Vec::new(),
            fatal_errors: self.fatal_errors.clone(),
            premature_exit: self.premature_exit.clone(),
            worker_count: self.worker_count,
            started_at: snapshot.start_time,
            duration: snapshot.duration,
        };
        // BTreeMap iteration is in worker index order.
        for state in self.sources.values() {
            report.spec_failures.extend(state.failed_specs.iter().cloned());
            report.suite_failures.extend(state.failed_suites.iter().cloned());
            report.global_failures.extend(state.global_failures.iter().cloned());
            report.pending.extend(state.pending.iter().cloned());
        }
        report
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SourceStatus {
    #[default]
    Running,
    Done,
    Fatal,
    Exited,
    Crashed,
    Cancelled,
}

#[derive(Debug, Default)]
struct SourceState {
    status: SourceStatus,
    closed: bool,
    failed_specs: Vec<SpecResult>,
    failed_suites: Vec<SuiteResult>,
    global_failures: Vec<FailureRecord>,
    pending: Vec<SpecResult>,
}

fn source_name(source: Option<usize>) -> String {
    match source {
        Some(index) => format!("worker {index}"),
        None => "worker".to_owned(),
    }
}
