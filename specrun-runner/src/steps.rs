// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative steps, the bodies of specs, hooks and global hooks in TOML spec files.
//!
//! A list of steps is interpreted in order:
//!
//! ```toml
//! steps = [
//!     { print = "starting" },
//!     { expect = { actual = 1, expected = 2 } },
//!     { sleep = "10ms" },
//!     "never-complete",
//! ]
//! ```

use crate::{
    errors::{ModuleError, SpecError},
    suite::{Body, SpecContext},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};

/// A single declarative step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Prints a line to standard output.
    Print(String),

    /// Records `Expected <actual> to be <expected>.` if the values differ, and continues.
    Expect {
        /// The actual value.
        actual: StepValue,
        /// The expected value.
        expected: StepValue,
    },

    /// Records a failure with this message, and continues.
    Fail(String),

    /// Throws an error with this message. The remaining steps are skipped.
    Throw(String),

    /// Panics with this message.
    Panic(String),

    /// Waits for this long.
    Sleep(#[serde(with = "humantime_serde")] Duration),

    /// Completes the body through a deferred callback after this long.
    CallbackAfter(#[serde(with = "humantime_serde")] Duration),

    /// Never completes. The body times out.
    NeverComplete,

    /// Marks the spec pending with this reason.
    Pending(String),

    /// Requests that the whole run stop with this exit code.
    Exit(i32),

    /// Prints this message to standard error and aborts the process.
    Crash(String),
}

impl Step {
    /// Returns the kebab-case name of this step.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Print(_) => "print",
            Step::Expect { .. } => "expect",
            Step::Fail(_) => "fail",
            Step::Throw(_) => "throw",
            Step::Panic(_) => "panic",
            Step::Sleep(_) => "sleep",
            Step::CallbackAfter(_) => "callback-after",
            Step::NeverComplete => "never-complete",
            Step::Pending(_) => "pending",
            Step::Exit(_) => "exit",
            Step::Crash(_) => "crash",
        }
    }
}

/// A value compared by [`Step::Expect`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepValue {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Integer(i64),
    /// A float.
    Float(f64),
    /// A string.
    String(String),
}

impl fmt::Display for StepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepValue::Bool(value) => write!(f, "{value}"),
            StepValue::Integer(value) => write!(f, "{value}"),
            StepValue::Float(value) => write!(f, "{value}"),
            StepValue::String(value) => write!(f, "'{value}'"),
        }
    }
}

/// A step along with where it was declared.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatedStep {
    /// The step.
    pub step: Step,

    /// A stack-like location, e.g. `at spec/one.toml:4`.
    pub location: Option<String>,
}

impl From<Step> for LocatedStep {
    fn from(step: Step) -> Self {
        Self {
            step,
            location: None,
        }
    }
}

/// An ordered list of steps that can be turned into a [`Body`].
#[derive(Clone, Debug)]
pub struct StepProgram {
    steps: Arc<[LocatedStep]>,
}

impl StepProgram {
    /// Creates a new program.
    pub fn new(steps: impl IntoIterator<Item = LocatedStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Returns true if the program has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Converts the program into a body. Programs that contain `callback-after` complete through a
    /// [`DoneCallback`](crate::suite::DoneCallback); all others are plain futures.
    pub fn into_body(self) -> Body {
        let uses_callback = self
            .steps
            .iter()
            .any(|s| matches!(s.step, Step::CallbackAfter(_)));
        if uses_callback {
            Body::from_callback(move |ctx, done| {
                let program = self.clone();
                tokio::spawn(async move {
                    match program.run(ctx).await {
                        Ok(()) => done.done(),
                        Err(error) => done.fail(error),
                    }
                });
            })
        } else {
            Body::from_async(move |ctx| {
                let program = self.clone();
                async move { program.run(ctx).await }
            })
        }
    }

    /// Runs the steps in order.
    pub async fn run(&self, ctx: SpecContext) -> Result<(), SpecError> {
        for LocatedStep { step, location } in self.steps.iter() {
            match step {
                Step::Print(line) => println!("{line}"),
                Step::Expect { actual, expected } => {
                    if actual != expected {
                        ctx.record_expectation_failure(
                            format!("Expected {actual} to be {expected}."),
                            location.clone(),
                        );
                    }
                }
                Step::Fail(message) => {
                    ctx.record_expectation_failure(message.clone(), location.clone());
                }
                Step::Throw(message) => {
                    return Err(SpecError::Thrown {
                        message: message.clone(),
                        location: location.clone(),
                    });
                }
                Step::Panic(message) => panic!("{message}"),
                Step::Sleep(duration) | Step::CallbackAfter(duration) => {
                    tokio::time::sleep(*duration).await;
                }
                Step::NeverComplete => futures::future::pending::<()>().await,
                Step::Pending(reason) => {
                    return Err(SpecError::Pending {
                        reason: (!reason.is_empty()).then(|| reason.clone()),
                    });
                }
                Step::Exit(code) => return Err(SpecError::Exit { code: *code }),
                Step::Crash(message) => crash(message),
            }
        }
        Ok(())
    }

    /// Runs the steps synchronously while a file is being loaded.
    ///
    /// Only steps that make sense outside of a spec are allowed: `print`, `throw`, `panic` and
    /// `crash`.
    pub fn run_at_load(&self) -> Result<(), ModuleError> {
        for LocatedStep { step, location } in self.steps.iter() {
            match step {
                Step::Print(line) => println!("{line}"),
                Step::Throw(message) => {
                    return Err(ModuleError::Thrown {
                        message: message.clone(),
                        location: location.clone(),
                    });
                }
                Step::Panic(message) => panic!("{message}"),
                Step::Crash(message) => crash(message),
                other => {
                    return Err(ModuleError::Configuration {
                        message: format!("step `{}` cannot run at load time", other.name()),
                    });
                }
            }
        }
        Ok(())
    }
}

fn crash(message: &str) -> ! {
    eprintln!("{message}");
    std::process::abort()
}
