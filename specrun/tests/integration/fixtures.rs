// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use std::{
    borrow::Cow,
    collections::HashMap,
    ffi::OsString,
    fmt,
    process::{Command, ExitStatus},
};

/// Returns the path to a fixture project under `fixtures/`.
pub(crate) fn fixture_dir(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("the specrun crate lives inside the workspace")
        .join("fixtures")
        .join(name)
}

#[derive(Clone, Debug)]
pub(crate) struct SpecrunCli {
    bin: Utf8PathBuf,
    cwd: Utf8PathBuf,
    args: Vec<String>,
    envs: HashMap<OsString, OsString>,
}

impl SpecrunCli {
    /// Runs the specrun binary from inside the fixture project `fixture`.
    pub(crate) fn new(fixture: &str) -> Self {
        let mut envs = HashMap::new();
        envs.insert("SPECRUN_COLOR".into(), "never".into());
        envs.insert("SPECRUN_LOG".into(), "warn".into());
        Self {
            bin: env!("CARGO_BIN_EXE_specrun").into(),
            cwd: fixture_dir(fixture),
            args: Vec::new(),
            envs,
        }
    }

    pub(crate) fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn output(&self) -> SpecrunOutput {
        let mut command = Command::new(&self.bin);
        command
            .args(&self.args)
            .envs(&self.envs)
            .current_dir(&self.cwd);
        let output = command.output().expect("failed to execute specrun");
        SpecrunOutput {
            command,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

pub(crate) struct SpecrunOutput {
    pub(crate) command: Command,
    pub(crate) exit_status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

impl SpecrunOutput {
    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    pub(crate) fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub(crate) fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Asserts the exit code and that stdout contains each of `needles`.
    #[track_caller]
    pub(crate) fn assert(&self, exit_code: i32, needles: &[&str]) {
        assert_eq!(self.exit_code(), Some(exit_code), "unexpected exit code:\n\n{self}");
        let stdout = self.stdout_as_str();
        for needle in needles {
            assert!(
                stdout.contains(needle),
                "stdout is missing {needle:?}:\n\n{self}"
            );
        }
    }
}

impl fmt::Display for SpecrunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "command: {:?}", self.command)?;
        writeln!(f, "exit status: {}", self.exit_status)?;
        writeln!(f, "--- stdout ---\n{}", self.stdout_as_str())?;
        writeln!(f, "--- stderr ---\n{}", self.stderr_as_str())
    }
}
