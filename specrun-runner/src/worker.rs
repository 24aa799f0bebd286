// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker runtime: loads a set of files and runs them with an execution engine.
//!
//! In a parallel run, each worker is a child process started as `<current exe> __worker`. It reads
//! a [`WorkerAssignment`] as JSON from standard input and streams events to standard output
//! through an [`EventWriter`]. In a non-parallel run, the same [`WorkerRuntime`] runs in-process.

use crate::{
    engine::{EngineConfig, EngineOutcome, ExecutionEngine},
    errors::{LoadError, WorkerProcessError},
    helpers::error_chain,
    ipc::EventWriter,
    loader::{LoaderKind, SpecRegistry, load_and_register},
    suite::{ModuleKind, SuiteBuilder},
};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use specrun_metadata::{
    FailureKind, FailureOrigin, FailureRecord, FatalErrorKind, FatalErrorSummary, SpecEvent,
};
use std::{io::Read, sync::Arc};
use tracing::debug;

/// The name of the hidden subcommand that runs a worker process.
pub const WORKER_SUBCOMMAND_NAME: &str = "__worker";

/// Everything a worker needs to know to do its share of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerAssignment {
    /// The worker's index, or `None` for a non-parallel run.
    pub worker_index: Option<usize>,

    /// The total number of workers in the run.
    pub worker_count: usize,

    /// The directory all paths are relative to.
    pub root_dir: Utf8PathBuf,

    /// The spec files assigned to this worker.
    pub spec_files: Vec<Utf8PathBuf>,

    /// Helper files. Every worker loads all of them.
    pub helper_files: Vec<Utf8PathBuf>,

    /// Files loaded before helpers. Every worker loads all of them.
    pub require_files: Vec<Utf8PathBuf>,

    /// How files are loaded.
    pub loader: LoaderKind,

    /// Engine settings.
    pub config: EngineConfig,
}

/// How a worker finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker ran its whole suite tree.
    Completed,

    /// The worker reported a fatal error.
    Fatal,

    /// A spec requested an early exit with this code.
    PrematureExit(i32),
}

impl WorkerExit {
    /// The exit code for a worker process that finished this way.
    pub fn process_exit_code(self) -> i32 {
        match self {
            WorkerExit::Completed => 0,
            WorkerExit::Fatal => 1,
            WorkerExit::PrematureExit(code) => code,
        }
    }
}

/// Loads and runs a worker's share of a run.
#[derive(Clone, Debug)]
pub struct WorkerRuntime {
    registry: Arc<SpecRegistry>,
}

impl WorkerRuntime {
    /// Creates a new runtime that looks up compiled-in modules in `registry`.
    pub fn new(registry: Arc<SpecRegistry>) -> Self {
        Self { registry }
    }

    /// Runs `assignment`, calling `callback` with every event.
    ///
    /// Requires and helpers are loaded first, in order; if any of them fails to load, the worker
    /// reports a fatal error and stops. A spec file that fails to load is recorded as a failure
    /// outside of any suite, and the rest of the files still run.
    pub async fn run<F>(&self, assignment: &WorkerAssignment, mut callback: F) -> WorkerExit
    where
        F: FnMut(SpecEvent) + Send,
    {
        let engine = match ExecutionEngine::new(&assignment.config) {
            Ok(engine) => engine,
            Err(error) => {
                let message = error_chain(&error);
                callback(SpecEvent::FatalError(FatalErrorSummary {
                    identity: format!("configuration:{message}"),
                    kind: FatalErrorKind::Configuration,
                    message,
                    location: None,
                }));
                return WorkerExit::Fatal;
            }
        };

        let loader = assignment
            .loader
            .build(&assignment.root_dir, self.registry.clone());
        let mut builder = SuiteBuilder::new(assignment.config.parallel);

        for (kind, files) in [
            (ModuleKind::Require, &assignment.require_files),
            (ModuleKind::Helper, &assignment.helper_files),
        ] {
            for path in files {
                if let Err(error) = load_and_register(&*loader, &mut builder, path, kind) {
                    debug!("{kind:?} file {path} failed to load: {error}");
                    callback(SpecEvent::FatalError(load_fatal_error(&error)));
                    return WorkerExit::Fatal;
                }
            }
        }

        for path in &assignment.spec_files {
            if let Err(error) = load_and_register(&*loader, &mut builder, path, ModuleKind::Spec) {
                debug!("spec file {path} failed to load: {error}");
                builder.add_global_failure(FailureRecord {
                    message: error.to_string(),
                    stack: error.location(),
                    origin: FailureOrigin::Load,
                    kind: if error.is_configuration() {
                        FailureKind::Configuration
                    } else {
                        FailureKind::Load
                    },
                });
            }
        }

        let tree = builder.finish();
        match engine.run(&tree, callback).await {
            EngineOutcome::Completed(_) => WorkerExit::Completed,
            EngineOutcome::Exited(exit) => WorkerExit::PrematureExit(exit.code),
        }
    }
}

/// The fatal error reported for a require or helper file that failed to load.
///
/// Every worker loads the same helpers, so the identity only depends on the file and the cause.
fn load_fatal_error(error: &LoadError) -> FatalErrorSummary {
    let message = error.kind().to_string();
    FatalErrorSummary {
        identity: format!("load:{}:{message}", error.path()),
        kind: FatalErrorKind::LoadFailure,
        location: Some(
            error
                .location()
                .unwrap_or_else(|| format!("at {}", error.path())),
        ),
        message,
    }
}

/// The entry point of a worker process.
///
/// Reads the assignment from standard input, runs it, and returns the exit code for the process.
pub fn run_process(registry: SpecRegistry) -> Result<i32, WorkerProcessError> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(WorkerProcessError::ReadAssignment)?;
    let assignment: WorkerAssignment =
        serde_json::from_str(&input).map_err(WorkerProcessError::DecodeAssignment)?;
    debug!(
        "worker {:?} of {} starting with {} spec files",
        assignment.worker_index,
        assignment.worker_count,
        assignment.spec_files.len(),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(WorkerProcessError::TokioRuntimeCreate)?;

    let worker = WorkerRuntime::new(Arc::new(registry));
    let mut writer = EventWriter::new(std::io::stdout());
    let mut write_error = None;
    let exit = runtime.block_on(worker.run(&assignment, |event| {
        if write_error.is_none()
            && let Err(error) = writer.write_event(&event)
        {
            write_error = Some(error);
        }
    }));

    match write_error {
        Some(error) => Err(WorkerProcessError::WriteEvent(error)),
        None => Ok(exit.process_exit_code()),
    }
}
