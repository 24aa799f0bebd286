// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by specrun.

use crate::helpers::location_str;
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// An error that occurred while parsing a specrun config file.
#[derive(Debug, Error)]
#[error("failed to parse specrun config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<ConfigError>),
}

/// An error that occurred while discovering spec and helper files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A glob in `spec-files` or `helpers` was invalid.
    #[error("invalid glob `{glob}`")]
    InvalidGlob {
        /// The glob.
        glob: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// An error occurred while walking the spec directory.
    #[error("error walking spec directory `{dir}`")]
    WalkDir {
        /// The directory being walked.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path under the spec directory was not valid UTF-8.
    #[error("path `{}` is not valid UTF-8", path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },
}

/// An error that occurs while parsing a worker count.
#[derive(Clone, Debug, Error)]
#[error("invalid worker count `{input}`: {message}")]
pub struct ParallelismParseError {
    input: String,
    message: &'static str,
}

impl ParallelismParseError {
    pub(crate) fn new(input: impl Into<String>, message: &'static str) -> Self {
        Self {
            input: input.into(),
            message,
        }
    }
}

/// An error that occurs while compiling a `--filter` expression.
#[derive(Debug, Error)]
#[error("invalid filter `{filter}`")]
pub struct FilterBuildError {
    filter: String,
    #[source]
    error: regex::Error,
}

impl FilterBuildError {
    pub(crate) fn new(filter: impl Into<String>, error: regex::Error) -> Self {
        Self {
            filter: filter.into(),
            error,
        }
    }
}

/// A spec, helper or require file failed to load.
///
/// The `Display` implementation produces the message shown to users, e.g.
/// `Error loading spec/one.toml: nope`.
#[derive(Debug, Error)]
#[error("Error loading {path}: {kind}")]
pub struct LoadError {
    path: Utf8PathBuf,
    kind: LoadErrorKind,
}

impl LoadError {
    /// Creates a new `LoadError`.
    pub fn new(path: impl Into<Utf8PathBuf>, kind: LoadErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the path that failed to load.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the cause of the failure.
    pub fn kind(&self) -> &LoadErrorKind {
        &self.kind
    }

    /// Returns a stack-like location for the failure, if one is known.
    pub fn location(&self) -> Option<String> {
        match &self.kind {
            LoadErrorKind::Parse {
                line: Some(line), ..
            } => Some(location_str(self.path.as_str(), line)),
            LoadErrorKind::Module(ModuleError::Thrown { location, .. }) => location.clone(),
            _ => None,
        }
    }

    /// Returns true if this error was caused by registering something in the wrong place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind,
            LoadErrorKind::Module(ModuleError::Configuration { .. })
        )
    }
}

/// The cause of a [`LoadError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadErrorKind {
    /// The file could not be read.
    #[error("{error}")]
    Read {
        /// The underlying error.
        error: io::Error,
    },

    /// The file could not be parsed.
    #[error("{message}")]
    Parse {
        /// The parser's message.
        message: String,

        /// The 1-based line the error was found at, if known.
        line: Option<usize>,
    },

    /// No compiled-in module matches the file.
    #[error("no spec module is registered for this file")]
    NotRegistered,

    /// The module failed while registering its suites.
    #[error(transparent)]
    Module(ModuleError),
}

/// An error that a spec module produced while registering its suites.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ModuleError {
    /// The module threw an error at load time.
    #[error("{message}")]
    Thrown {
        /// The error message.
        message: String,

        /// Where the error was thrown.
        location: Option<String>,
    },

    /// The module registered something where it isn't allowed.
    #[error("{message}")]
    Configuration {
        /// A description of the problem.
        message: String,
    },

    /// The module panicked at load time.
    #[error("{message}")]
    Panicked {
        /// The panic message.
        message: String,
    },
}

impl ModuleError {
    /// Creates a [`ModuleError::Thrown`] located at the caller.
    #[track_caller]
    pub fn thrown(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self::Thrown {
            message: message.into(),
            location: Some(location_str(caller.file(), caller.line())),
        }
    }
}

/// The ways a spec body or hook can finish other than successfully.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum SpecError {
    /// An error was thrown. The rest of the body is skipped.
    #[error("{message}")]
    Thrown {
        /// The error message.
        message: String,

        /// Where the error was thrown.
        location: Option<String>,
    },

    /// The spec marked itself pending.
    #[error("spec marked pending")]
    Pending {
        /// An optional reason.
        reason: Option<String>,
    },

    /// The spec requested that the whole run stop immediately.
    #[error("early exit requested with code {code}")]
    Exit {
        /// The requested exit code.
        code: i32,
    },
}

impl SpecError {
    /// Creates a [`SpecError::Thrown`] located at the caller.
    #[track_caller]
    pub fn thrown(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self::Thrown {
            message: message.into(),
            location: Some(location_str(caller.file(), caller.line())),
        }
    }
}

/// A failure reported by a global setup or teardown hook.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct GlobalHookError {
    message: String,
    location: Option<String>,
}

impl GlobalHookError {
    /// Creates a new `GlobalHookError`.
    pub fn new(message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns where the failure happened, if known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

/// An error that occurred while starting a worker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerSpawnError {
    /// The assignment could not be serialized.
    #[error("failed to serialize assignment for worker {worker_index}")]
    Serialize {
        /// The worker index.
        worker_index: usize,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The worker process could not be started.
    #[error("failed to spawn worker {worker_index}")]
    Spawn {
        /// The worker index.
        worker_index: usize,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred inside a worker process before or while streaming events.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerProcessError {
    /// The assignment could not be read from standard input.
    #[error("failed to read worker assignment from stdin")]
    ReadAssignment(#[source] io::Error),

    /// The assignment could not be decoded.
    #[error("failed to decode worker assignment")]
    DecodeAssignment(#[source] serde_json::Error),

    /// The worker's runtime could not be created.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// An event could not be written to standard output.
    #[error("failed to write event to stdout")]
    WriteEvent(#[source] WriteEventError),
}

/// An error that occurs while writing a narrative event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[from] io::Error),

    /// An error occurred while serializing the event.
    #[error("error serializing event")]
    Json(#[from] serde_json::Error),
}

/// An error that occurred while building a coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// The `--filter` expression was invalid.
    #[error(transparent)]
    Filter(#[from] FilterBuildError),
}
