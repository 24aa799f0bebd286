// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [specrun](https://crates.io/crates/specrun), a spec-suite runner.
//!
//! The pieces, leaves first:
//!
//! * [`suite`]: the in-memory suite tree and the builder that spec modules register into.
//! * [`loader`]: turns spec files into registered modules.
//! * [`engine`]: runs one suite tree to completion, streaming [`SpecEvent`]s.
//! * [`worker`]: hosts an engine, either in-process or in a child process.
//! * [`ipc`]: the line protocol between a worker process and the coordinator.
//! * [`coordinator`]: partitions files across workers, drives global setup and teardown, and merges
//!   worker events through the [`reporter`] multiplexer.
//!
//! [`SpecEvent`]: specrun_metadata::SpecEvent

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod global_hooks;
mod helpers;
pub mod ipc;
pub mod launcher;
pub mod loader;
pub mod partition;
pub mod reporter;
pub mod steps;
pub mod suite;
mod time;
pub mod worker;
