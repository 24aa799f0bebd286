// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global setup and teardown.
//!
//! Global setup runs once before any worker starts, and global teardown runs once after every
//! worker has finished. A hook can fail in two ways: by reporting a failure (returning an error),
//! or by panicking. The coordinator reports the two differently.

use crate::{
    errors::{GlobalHookError, SpecError},
    steps::{LocatedStep, Step, StepProgram},
    suite::SpecContext,
};
use futures::{FutureExt, future::BoxFuture};
use std::fmt;

/// A hook that runs once around the whole run.
pub trait GlobalHook: fmt::Debug + Send + Sync {
    /// Starts the hook. The returned future is run on its own task, so panics are observed
    /// separately from reported failures.
    fn run(&self) -> BoxFuture<'static, Result<(), GlobalHookError>>;
}

/// A global hook made of declarative [`Step`]s.
///
/// `fail`, `throw` and failed `expect` steps are reported failures; `panic` is unhandled.
#[derive(Clone, Debug)]
pub struct StepsHook {
    program: StepProgram,
}

impl StepsHook {
    /// Creates a new hook from steps.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            program: StepProgram::new(steps.into_iter().map(LocatedStep::from)),
        }
    }
}

impl GlobalHook for StepsHook {
    fn run(&self) -> BoxFuture<'static, Result<(), GlobalHookError>> {
        let program = self.program.clone();
        async move {
            let ctx = SpecContext::default();
            let result = program.run(ctx.clone()).await;
            let failures = ctx.take_failures();

            match result {
                Err(SpecError::Thrown { message, location }) => {
                    return Err(GlobalHookError::new(message, location));
                }
                Err(SpecError::Exit { code }) => {
                    return Err(GlobalHookError::new(
                        format!("global hooks cannot request an early exit (code {code})"),
                        None,
                    ));
                }
                Err(SpecError::Pending { .. }) | Ok(()) => {}
            }

            match failures.into_iter().next() {
                Some(failure) => Err(GlobalHookError::new(failure.message, failure.location)),
                None => Ok(()),
            }
        }
        .boxed()
    }
}
