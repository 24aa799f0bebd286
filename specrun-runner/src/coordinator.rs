// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The coordinator: runs global hooks, starts workers and merges their results.
//!
//! The main structure in this module is [`Coordinator`], which is built with a
//! [`CoordinatorBuilder`].

use crate::{
    engine::{EngineConfig, NameFilter},
    errors::{CoordinatorBuildError, WriteEventError},
    global_hooks::GlobalHook,
    helpers::{error_chain, panic_message},
    ipc::SourcedMessage,
    launcher::WorkerLauncher,
    loader::LoaderKind,
    partition::{Parallelism, PartitionPlan},
    reporter::{AggregateReport, NarrativeEvent, ReporterMultiplexer, ReporterSink},
    time::stopwatch,
    worker::WorkerAssignment,
};
use camino::Utf8PathBuf;
use specrun_metadata::{FatalErrorKind, FatalErrorSummary, PrematureExitSummary, SpecrunExitCode};
use std::sync::Arc;
use tokio::{
    runtime::Runtime,
    sync::{mpsc, watch},
};
use tracing::{debug, warn};

// Workers block once this many messages are waiting to be handled.
const CHANNEL_CAPACITY: usize = 256;

/// Everything that's known about a run before it starts.
#[derive(Clone, Debug)]
pub struct RunPlan {
    /// The directory all paths are relative to.
    pub root_dir: Utf8PathBuf,

    /// Spec files to run, sorted and deduplicated.
    pub spec_files: Vec<Utf8PathBuf>,

    /// Helper files, loaded by every worker.
    pub helper_files: Vec<Utf8PathBuf>,

    /// Files loaded before helpers by every worker.
    pub require_files: Vec<Utf8PathBuf>,

    /// How files are loaded.
    pub loader: LoaderKind,

    /// Engine settings shared by every worker.
    pub engine: EngineConfig,
}

/// Coordinator options.
#[derive(Debug, Default)]
pub struct CoordinatorBuilder {
    parallelism: Option<Parallelism>,
    global_setup: Option<Arc<dyn GlobalHook>>,
    global_teardown: Option<Arc<dyn GlobalHook>>,
    handle_signals: bool,
}

impl CoordinatorBuilder {
    /// Splits the run across this many workers. Without this, a single worker runs every spec
    /// file.
    pub fn set_parallelism(&mut self, parallelism: Parallelism) -> &mut Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Sets the hook that runs before any worker starts.
    pub fn set_global_setup(&mut self, hook: Arc<dyn GlobalHook>) -> &mut Self {
        self.global_setup = Some(hook);
        self
    }

    /// Sets the hook that runs after every worker has finished.
    pub fn set_global_teardown(&mut self, hook: Arc<dyn GlobalHook>) -> &mut Self {
        self.global_teardown = Some(hook);
        self
    }

    /// If true, Ctrl-C stops the run early.
    pub fn set_handle_signals(&mut self, handle_signals: bool) -> &mut Self {
        self.handle_signals = handle_signals;
        self
    }

    /// Creates a new coordinator for `plan`, starting workers with `launcher`.
    pub fn build(
        &self,
        mut plan: RunPlan,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Coordinator, CoordinatorBuildError> {
        // Reject a bad filter up front rather than in every worker.
        if let Some(filter) = &plan.engine.filter {
            NameFilter::new(filter)?;
        }

        let worker_count = self
            .parallelism
            .map(|parallelism| parallelism.compute().get());
        plan.engine.parallel = worker_count.is_some();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("specrun-coordinator")
            .build()
            .map_err(CoordinatorBuildError::TokioRuntimeCreate)?;

        Ok(Coordinator {
            inner: CoordinatorInner {
                plan,
                worker_count,
                global_setup: self.global_setup.clone(),
                global_teardown: self.global_teardown.clone(),
                handle_signals: self.handle_signals,
                launcher,
            },
            runtime,
        })
    }
}

/// Runs a whole spec suite.
///
/// Created using [`CoordinatorBuilder::build`].
#[derive(Debug)]
pub struct Coordinator {
    inner: CoordinatorInner,
    runtime: Runtime,
}

impl Coordinator {
    /// Runs global setup, every worker and global teardown, reporting the narrative to
    /// `reporter`.
    ///
    /// Returns an error if the reporter fails to write an event.
    pub fn execute(self, reporter: &mut dyn ReporterSink) -> Result<RunOutcome, WriteEventError> {
        let res = self.runtime.block_on(self.inner.execute(reporter));
        // Don't wait for workers that are still being killed.
        self.runtime.shutdown_background();
        res
    }
}

/// The result of a run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The final report.
    pub report: AggregateReport,

    /// The process exit code.
    pub exit_code: i32,
}

impl RunOutcome {
    fn new(report: AggregateReport) -> Self {
        let exit_code = report.exit_code();
        Self { report, exit_code }
    }
}

#[derive(Debug)]
struct CoordinatorInner {
    plan: RunPlan,
    worker_count: Option<usize>,
    global_setup: Option<Arc<dyn GlobalHook>>,
    global_teardown: Option<Arc<dyn GlobalHook>>,
    handle_signals: bool,
    launcher: Arc<dyn WorkerLauncher>,
}

impl CoordinatorInner {
    async fn execute(&self, reporter: &mut dyn ReporterSink) -> Result<RunOutcome, WriteEventError> {
        let stopwatch = stopwatch();
        let mut multiplexer = ReporterMultiplexer::new(self.worker_count);
        reporter.report(&NarrativeEvent::RunStarted {
            worker_count: self.worker_count,
        })?;

        if let Some(setup) = &self.global_setup {
            debug!("running global setup");
            if let Some(error) = run_global_hook(setup, GlobalPhase::Setup).await {
                // Nothing was set up, so there is nothing to tear down either.
                if let Some(event) = multiplexer.record_fatal(None, error) {
                    reporter.report(&event)?;
                }
                return Ok(RunOutcome::new(multiplexer.report(stopwatch.snapshot())));
            }
        }

        self.run_workers(&mut multiplexer, reporter).await?;

        if !multiplexer.is_fatal() {
            reporter.report(&NarrativeEvent::RunFinished {
                report: multiplexer.report(stopwatch.snapshot()),
            })?;
        }

        if let Some(teardown) = &self.global_teardown {
            debug!("running global teardown");
            if let Some(error) = run_global_hook(teardown, GlobalPhase::Teardown).await
                && let Some(event) = multiplexer.record_fatal(None, error)
            {
                reporter.report(&event)?;
            }
        }

        let outcome = RunOutcome::new(multiplexer.report(stopwatch.snapshot()));
        debug!("run finished with exit code {}", outcome.exit_code);
        Ok(outcome)
    }

    fn assignments(&self) -> Vec<WorkerAssignment> {
        let assignment = |worker_index, worker_count, spec_files| WorkerAssignment {
            worker_index,
            worker_count,
            root_dir: self.plan.root_dir.clone(),
            spec_files,
            helper_files: self.plan.helper_files.clone(),
            require_files: self.plan.require_files.clone(),
            loader: self.plan.loader,
            config: self.plan.engine.clone(),
        };

        match self.worker_count.and_then(std::num::NonZeroUsize::new) {
            Some(count) => PartitionPlan::round_robin(&self.plan.spec_files, count)
                .into_workers()
                .into_iter()
                .enumerate()
                .map(|(index, files)| assignment(Some(index), count.get(), files))
                .collect(),
            None => vec![assignment(None, 1, self.plan.spec_files.clone())],
        }
    }

    async fn run_workers(
        &self,
        multiplexer: &mut ReporterMultiplexer,
        reporter: &mut dyn ReporterSink,
    ) -> Result<(), WriteEventError> {
        let (sender, mut receiver) = mpsc::channel::<SourcedMessage>(CHANNEL_CAPACITY);
        let (cancel_sender, cancel_receiver) = watch::channel(false);

        let mut handles = Vec::new();
        for assignment in self.assignments() {
            let source = assignment.worker_index;
            match self
                .launcher
                .launch(assignment, sender.clone(), cancel_receiver.clone())
            {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    warn!("failed to start worker {source:?}: {error}");
                    let error = FatalErrorSummary {
                        identity: format!("spawn:{}", source.unwrap_or_default()),
                        kind: FatalErrorKind::WorkerCrash,
                        message: error_chain(&error),
                        location: None,
                    };
                    if let Some(event) = multiplexer.source_failed_to_start(source, error) {
                        reporter.report(&event)?;
                    }
                }
            }
        }
        // Only the launched workers hold senders now, so the channel closes once they're done.
        drop(sender);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut signal_received = false;

        loop {
            if multiplexer.needs_cancel() {
                debug!("cancelling remaining workers");
                multiplexer.begin_cancel();
                let _ = cancel_sender.send(true);
            }

            let message = tokio::select! {
                message = receiver.recv() => message,
                res = &mut ctrl_c, if self.handle_signals && !signal_received => {
                    signal_received = true;
                    if let Err(error) = res {
                        warn!("error waiting for Ctrl-C: {error}");
                        continue;
                    }
                    debug!("received Ctrl-C");
                    let exit = PrematureExitSummary {
                        code: SpecrunExitCode::PREMATURE_EXIT,
                        spec: None,
                    };
                    if let Some(event) = multiplexer.record_premature_exit(exit) {
                        reporter.report(&event)?;
                    }
                    continue;
                }
            };
            let Some(message) = message else {
                break;
            };
            for event in multiplexer.handle(message) {
                reporter.report(&event)?;
            }
        }

        for event in multiplexer.finish_sources() {
            reporter.report(&event)?;
        }
        for handle in handles {
            if let Err(error) = handle.await {
                warn!("worker task failed: {error}");
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum GlobalPhase {
    Setup,
    Teardown,
}

impl GlobalPhase {
    fn identity(self) -> &'static str {
        match self {
            GlobalPhase::Setup => "global-setup",
            GlobalPhase::Teardown => "global-teardown",
        }
    }
}

/// Runs a global hook on its own task, returning the fatal error to report if it failed.
async fn run_global_hook(hook: &Arc<dyn GlobalHook>, phase: GlobalPhase) -> Option<FatalErrorSummary> {
    let (kind, message, location) = match tokio::spawn(hook.run()).await {
        Ok(Ok(())) => return None,
        Ok(Err(error)) => {
            let kind = match phase {
                GlobalPhase::Setup => FatalErrorKind::GlobalSetup,
                GlobalPhase::Teardown => FatalErrorKind::GlobalTeardown,
            };
            (
                kind,
                error.message().to_owned(),
                error.location().map(str::to_owned),
            )
        }
        Err(join_error) => {
            let kind = match phase {
                GlobalPhase::Setup => FatalErrorKind::UnhandledGlobalSetup,
                GlobalPhase::Teardown => FatalErrorKind::UnhandledGlobalTeardown,
            };
            let message = match join_error.try_into_panic() {
                Ok(payload) => panic_message(&*payload),
                Err(join_error) => join_error.to_string(),
            };
            (kind, message, None)
        }
    };
    Some(FatalErrorSummary {
        identity: phase.identity().to_owned(),
        kind,
        message,
        location,
    })
}
