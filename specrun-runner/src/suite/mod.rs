// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory suite tree.
//!
//! Spec modules register suites, specs and hooks into a [`SuiteBuilder`], which produces a
//! [`SuiteTree`] for the [engine](crate::engine) to run.

mod builder;
mod context;
mod tree;

pub use builder::*;
pub use context::*;
pub use tree::*;
