// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starting workers.
//!
//! A [`WorkerLauncher`] starts a worker for an assignment and forwards everything it produces to
//! the coordinator as [`SourcedMessage`]s, ending with exactly one [`ChannelMessage::Closed`].
//! Workers stop early when the cancellation flag is set.

use crate::{
    errors::WorkerSpawnError,
    ipc::{ChannelClosed, ChannelMessage, SourcedMessage, decode_line},
    loader::SpecRegistry,
    worker::{WORKER_SUBCOMMAND_NAME, WorkerAssignment, WorkerExit, WorkerRuntime},
};
use camino::Utf8PathBuf;
use std::{fmt, process::Stdio, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Starts workers.
pub trait WorkerLauncher: fmt::Debug + Send + Sync {
    /// Starts a worker for `assignment`.
    ///
    /// Messages are sent to `sender`, tagged with the assignment's worker index. The worker is
    /// stopped once `cancel` becomes `true`. The returned task finishes after the last message has
    /// been sent.
    fn launch(
        &self,
        assignment: WorkerAssignment,
        sender: mpsc::Sender<SourcedMessage>,
        cancel: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, WorkerSpawnError>;
}

/// Runs each worker as a child process: `<program> __worker`.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: Utf8PathBuf,
}

impl ProcessLauncher {
    /// Creates a launcher that runs `program` as the worker executable.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        assignment: WorkerAssignment,
        sender: mpsc::Sender<SourcedMessage>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, WorkerSpawnError> {
        let source = assignment.worker_index;
        let worker_index = source.unwrap_or_default();
        let input = serde_json::to_vec(&assignment)
            .map_err(|error| WorkerSpawnError::Serialize {
                worker_index,
                error,
            })?;

        let mut command = Command::new(&self.program);
        command
            .arg(WORKER_SUBCOMMAND_NAME)
            .current_dir(&assignment.root_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .map_err(|error| WorkerSpawnError::Spawn {
                worker_index,
                error,
            })?;
        debug!(
            "spawned worker {worker_index} (pid {:?}) with {} spec files",
            child.id(),
            assignment.spec_files.len(),
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        Ok(tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // Dropping stdin closes it, which marks the end of the assignment.
                if let Err(error) = stdin.write_all(&input).await {
                    warn!("failed to send assignment to worker {worker_index}: {error}");
                }
            }

            let mut lines = stdout.map(|stdout| BufReader::new(stdout).lines());
            let mut cancelled = *cancel.borrow();
            while !cancelled {
                let Some(reader) = lines.as_mut() else {
                    break;
                };
                tokio::select! {
                    line = reader.next_line() => match line {
                        Ok(Some(line)) => {
                            let message = SourcedMessage::new(source, decode_line(&line));
                            if sender.send(message).await.is_err() {
                                // The coordinator has gone away.
                                cancelled = true;
                            }
                        }
                        Ok(None) => break,
                        Err(error) => {
                            warn!("error reading from worker {worker_index}: {error}");
                            break;
                        }
                    },
                    changed = cancel.changed() => {
                        cancelled = changed.is_err() || *cancel.borrow();
                    }
                }
            }

            if cancelled {
                debug!("killing worker {worker_index}");
                let _ = child.start_kill();
            }
            let closed = match child.wait().await {
                Ok(status) => ChannelClosed {
                    exit_code: status.code(),
                    description: status.to_string(),
                },
                Err(error) => ChannelClosed {
                    exit_code: None,
                    description: format!("failed to wait for worker: {error}"),
                },
            };
            debug!("worker {worker_index} closed: {}", closed.description);
            let _ = sender
                .send(SourcedMessage::new(source, ChannelMessage::Closed(closed)))
                .await;
        }))
    }
}

/// Runs each worker as a task in the current process.
#[derive(Clone, Debug)]
pub struct InProcessLauncher {
    registry: Arc<SpecRegistry>,
}

impl InProcessLauncher {
    /// Creates a launcher that looks up compiled-in modules in `registry`.
    pub fn new(registry: Arc<SpecRegistry>) -> Self {
        Self { registry }
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(
        &self,
        assignment: WorkerAssignment,
        sender: mpsc::Sender<SourcedMessage>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, WorkerSpawnError> {
        let source = assignment.worker_index;
        let runtime = WorkerRuntime::new(self.registry.clone());

        Ok(tokio::spawn(async move {
            // The engine calls back synchronously, so events go through an unbounded channel and
            // are forwarded to the bounded one here.
            let (event_sender, mut event_receiver) = mpsc::unbounded_channel();
            let run = runtime.run(&assignment, move |event| {
                let _ = event_sender.send(event);
            });
            let forward = async {
                while let Some(event) = event_receiver.recv().await {
                    if sender
                        .send(SourcedMessage::new(source, ChannelMessage::Event(event)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            };

            let cancelled = async {
                while !*cancel.borrow_and_update() {
                    if cancel.changed().await.is_err() {
                        // The sender is gone, so the flag can never be set.
                        futures::future::pending::<()>().await;
                    }
                }
            };

            let closed = tokio::select! {
                (exit, ()) = async { tokio::join!(run, forward) } => ChannelClosed {
                    exit_code: Some(exit.process_exit_code()),
                    description: match exit {
                        WorkerExit::Completed => "completed".to_owned(),
                        WorkerExit::Fatal => "fatal error".to_owned(),
                        WorkerExit::PrematureExit(code) => format!("exited early with code {code}"),
                    },
                },
                () = cancelled => ChannelClosed {
                    exit_code: None,
                    description: "cancelled".to_owned(),
                },
            };
            let _ = sender
                .send(SourcedMessage::new(source, ChannelMessage::Closed(closed)))
                .await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::EngineConfig,
        errors::{ModuleError, SpecError},
        loader::LoaderKind,
        suite::{Body, SuiteBuilder},
    };
    use pretty_assertions::assert_eq;
    use specrun_metadata::SpecEvent;

    fn passing(builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        builder.it("passes", Body::from_fn(|_| Ok(())));
        Ok(())
    }

    fn assignment(spec_files: Vec<Utf8PathBuf>) -> WorkerAssignment {
        WorkerAssignment {
            worker_index: Some(1),
            worker_count: 2,
            root_dir: ".".into(),
            spec_files,
            helper_files: Vec::new(),
            require_files: Vec::new(),
            loader: LoaderKind::Static,
            config: EngineConfig::default(),
        }
    }

    #[tokio::test]
    async fn in_process_workers_stream_then_close() {
        let mut registry = SpecRegistry::new();
        registry.register("spec/a.rs", passing);
        let launcher = InProcessLauncher::new(Arc::new(registry));

        let (sender, mut receiver) = mpsc::channel(4);
        let (_cancel_sender, cancel) = watch::channel(false);
        let handle = launcher
            .launch(assignment(vec!["spec/a.rs".into()]), sender, cancel)
            .unwrap();

        let mut messages = Vec::new();
        while let Some(message) = receiver.recv().await {
            assert_eq!(message.source, Some(1));
            messages.push(message.message);
        }
        handle.await.unwrap();

        assert!(matches!(
            messages.first(),
            Some(ChannelMessage::Event(SpecEvent::RunStarted(_)))
        ));
        assert!(matches!(
            messages.get(messages.len() - 2),
            Some(ChannelMessage::Event(SpecEvent::RunDone(_)))
        ));
        assert_eq!(
            messages.last(),
            Some(&ChannelMessage::Closed(ChannelClosed {
                exit_code: Some(0),
                description: "completed".to_owned(),
            }))
        );
    }

    fn hangs(builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        builder.it(
            "hangs",
            Body::from_async(|_| futures::future::pending::<Result<(), SpecError>>()),
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_in_process_workers_close() {
        let mut registry = SpecRegistry::new();
        registry.register("spec/hangs.rs", hangs);
        let launcher = InProcessLauncher::new(Arc::new(registry));

        let (sender, mut receiver) = mpsc::channel(16);
        let (cancel_sender, cancel) = watch::channel(false);
        let handle = launcher
            .launch(assignment(vec!["spec/hangs.rs".into()]), sender, cancel)
            .unwrap();

        // Wait until the spec has started, then cancel.
        loop {
            let message = receiver.recv().await.unwrap();
            if matches!(message.message, ChannelMessage::Event(SpecEvent::SpecStarted(_))) {
                break;
            }
        }
        cancel_sender.send(true).unwrap();

        let mut last = None;
        while let Some(message) = receiver.recv().await {
            last = Some(message.message);
        }
        handle.await.unwrap();
        assert_eq!(
            last,
            Some(ChannelMessage::Closed(ChannelClosed {
                exit_code: None,
                description: "cancelled".to_owned(),
            }))
        );
    }
}
