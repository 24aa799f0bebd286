// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{any::Any, error::Error};
use swrite::{SWrite, swrite};

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "spec" if `count` is 1, otherwise "specs".
    pub(crate) fn specs_str(count: usize) -> &'static str {
        if count == 1 { "spec" } else { "specs" }
    }

    /// Returns "failure" if `count` is 1, otherwise "failures".
    pub(crate) fn failures_str(count: usize) -> &'static str {
        if count == 1 { "failure" } else { "failures" }
    }

    /// Returns "worker" if `count` is 1, otherwise "workers".
    pub(crate) fn workers_str(count: usize) -> &'static str {
        if count == 1 { "worker" } else { "workers" }
    }

    /// Returns "second" if `seconds` is exactly 1, otherwise "seconds".
    pub(crate) fn seconds_str(seconds: f64) -> &'static str {
        if seconds == 1.0 { "second" } else { "seconds" }
    }
}

/// Extracts a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}

/// Joins an error and all of its sources into a single line.
pub(crate) fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut next = error.source();
    while let Some(source) = next {
        swrite!(message, ": {source}");
        next = source.source();
    }
    message
}

/// Indents every line of `text` by `width` spaces.
pub(crate) fn indent(text: &str, width: usize) -> String {
    let prefix = " ".repeat(width);
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats a source location the way failure stacks display it.
pub(crate) fn location_str(file: &str, line: impl std::fmt::Display) -> String {
    format!("at {file}:{line}")
}
