// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::SpecError, helpers::location_str};
use futures::{FutureExt, future::BoxFuture};
use specrun_metadata::{FailureKind, FailureOrigin, FailureRecord};
use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::oneshot;

/// The future returned by a spec or hook body.
pub type SpecFuture = BoxFuture<'static, Result<(), SpecError>>;

type AsyncFn = dyn Fn(SpecContext) -> SpecFuture + Send + Sync;
type CallbackFn = dyn Fn(SpecContext, DoneCallback) + Send + Sync;

/// The body of a spec or hook.
///
/// Every body is driven as a single future by the engine. Callback-style bodies are adapted through
/// a [`DoneCallback`]: the body completes when the callback is invoked, and times out if it never
/// is.
pub enum Body {
    /// A body that completes when its future does.
    Async(Box<AsyncFn>),

    /// A body that completes when it invokes the [`DoneCallback`] it is handed.
    Callback(Box<CallbackFn>),
}

impl Body {
    /// Creates a body that runs synchronously.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&SpecContext) -> Result<(), SpecError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::Async(Box::new(move |ctx| {
            let f = f.clone();
            async move { (*f)(&ctx) }.boxed()
        }))
    }

    /// Creates a body from an async function.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(SpecContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SpecError>> + Send + 'static,
    {
        Self::Async(Box::new(move |ctx| f(ctx).boxed()))
    }

    /// Creates a body that signals completion through a [`DoneCallback`].
    pub fn from_callback<F>(f: F) -> Self
    where
        F: Fn(SpecContext, DoneCallback) + Send + Sync + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Starts the body. Nothing runs until the returned future is polled, so panics raised while
    /// starting the body surface from the future.
    pub(crate) fn invoke(&self, ctx: SpecContext) -> BoxFuture<'_, Result<(), SpecError>> {
        match self {
            Body::Async(f) => async move { f(ctx).await }.boxed(),
            Body::Callback(f) => async move {
                let (done, receiver) = DoneCallback::new();
                f(ctx, done);
                match receiver.await {
                    Ok(result) => result,
                    // A callback that was dropped without being called never completes.
                    Err(_) => futures::future::pending().await,
                }
            }
            .boxed(),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Async(_) => f.write_str("Body::Async(..)"),
            Body::Callback(_) => f.write_str("Body::Callback(..)"),
        }
    }
}

/// Completion handle for callback-style bodies.
#[must_use = "a body completes only when its callback is invoked"]
pub struct DoneCallback {
    sender: oneshot::Sender<Result<(), SpecError>>,
}

impl DoneCallback {
    fn new() -> (Self, oneshot::Receiver<Result<(), SpecError>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Signals successful completion.
    pub fn done(self) {
        // The engine may have timed the body out already.
        let _ = self.sender.send(Ok(()));
    }

    /// Signals completion with an error.
    pub fn fail(self, error: SpecError) {
        let _ = self.sender.send(Err(error));
    }
}

impl fmt::Debug for DoneCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneCallback").finish_non_exhaustive()
    }
}

/// State shared between a spec's body and the hooks that run around it.
///
/// Expectation failures are recorded here and don't stop the body.
#[derive(Clone, Debug, Default)]
pub struct SpecContext {
    failures: Arc<Mutex<Vec<RecordedFailure>>>,
}

impl SpecContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Checks that `actual` equals `expected`, recording `Expected <actual> to be <expected>.` if
    /// it doesn't. Returns whether the values were equal.
    #[track_caller]
    pub fn expect_eq<T>(&self, actual: T, expected: T) -> bool
    where
        T: PartialEq + fmt::Debug,
    {
        if actual == expected {
            return true;
        }
        let caller = std::panic::Location::caller();
        self.record_expectation_failure(
            format!("Expected {actual:?} to be {expected:?}."),
            Some(location_str(caller.file(), caller.line())),
        );
        false
    }

    /// Records an explicit failure. The body continues.
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) {
        let caller = std::panic::Location::caller();
        self.record(RecordedFailure {
            message: message.into(),
            location: Some(location_str(caller.file(), caller.line())),
            kind: FailureKind::Expectation,
        });
    }

    /// Records an expectation failure with an already-formatted message and location.
    pub fn record_expectation_failure(&self, message: String, location: Option<String>) {
        self.record(RecordedFailure {
            message,
            location,
            kind: FailureKind::Expectation,
        });
    }

    /// Returns the number of failures recorded and not yet collected by the engine.
    pub fn failure_count(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn take_failures(&self) -> Vec<RecordedFailure> {
        std::mem::take(&mut *self.lock())
    }

    fn record(&self, failure: RecordedFailure) {
        self.lock().push(failure);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedFailure>> {
        // No code panics while holding this lock, so poisoning carries no information.
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A failure recorded through a [`SpecContext`], not yet attributed to an origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordedFailure {
    pub(crate) message: String,
    pub(crate) location: Option<String>,
    pub(crate) kind: FailureKind,
}

impl RecordedFailure {
    pub(crate) fn into_record(self, origin: FailureOrigin) -> FailureRecord {
        FailureRecord {
            message: self.message,
            stack: self.location,
            origin,
            kind: self.kind,
        }
    }
}
