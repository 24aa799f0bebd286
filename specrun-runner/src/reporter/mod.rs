// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merge worker events and report the results of a run in human and machine-readable formats.
//!
//! The [`ReporterMultiplexer`] turns the unordered events of every worker into a single
//! [`NarrativeEvent`] stream, which is written out by a [`Reporter`] built with a
//! [`ReporterBuilder`].

mod displayer;
mod events;
mod imp;
mod multiplexer;
mod structured;
#[cfg(test)]
mod test_helpers;

pub use events::*;
pub use imp::*;
pub use multiplexer::ReporterMultiplexer;
