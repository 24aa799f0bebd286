// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use specrun_metadata::SpecrunExitCode;
use specrun_runner::errors::{
    ConfigParseError, CoordinatorBuildError, DiscoveryError, WorkerProcessError, WriteEventError,
};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that specrun expects might happen, as opposed to a bug.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        error: std::io::Error,
    },
    #[error("path is not valid UTF-8")]
    NonUtf8Path { path: std::path::PathBuf },
    #[error("could not determine the current executable")]
    CurrentExeFailed {
        #[source]
        error: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("spec file discovery failed")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("failed to build coordinator")]
    CoordinatorBuildError {
        #[from]
        err: CoordinatorBuildError,
    },
    #[error("failed to write to output")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("worker process failed")]
    WorkerProcessError {
        #[from]
        err: WorkerProcessError,
    },
    #[error("spec file `{path}` is outside the project directory `{base_dir}`")]
    SpecFileOutsideProject {
        path: Utf8PathBuf,
        base_dir: Utf8PathBuf,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        // Every expected error is a problem with the run as a whole.
        SpecrunExitCode::FATAL
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { error } => {
                error!("could not determine the current directory");
                Some(error as &dyn Error)
            }
            Self::NonUtf8Path { path } => {
                error!("path `{}` is not valid UTF-8", path.display());
                None
            }
            Self::CurrentExeFailed { error } => {
                error!("could not determine the path to the specrun executable");
                Some(error as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse specrun config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!("failed to discover spec files");
                Some(err as &dyn Error)
            }
            Self::CoordinatorBuildError { err } => {
                error!("failed to set up run");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::WorkerProcessError { err } => {
                error!("[worker] {err}");
                err.source()
            }
            Self::SpecFileOutsideProject { path, base_dir } => {
                error!(
                    "spec file `{}` is outside the project directory `{}`",
                    path.style(styles.bold),
                    base_dir.style(styles.bold),
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
