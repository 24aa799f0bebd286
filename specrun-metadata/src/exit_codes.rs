// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `specrun run`.
///
/// When more than one condition applies, the first one in this order wins: fatal, premature exit,
/// failed, incomplete.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum SpecrunExitCode {}

impl SpecrunExitCode {
    /// All specs ran, and none of them failed.
    pub const OK: i32 = 0;

    /// A fatal error occurred: a helper failed to load, a worker crashed, global setup or teardown
    /// failed, or the run could not be set up at all.
    pub const FATAL: i32 = 1;

    /// No failures occurred, but no specs were executed.
    pub const INCOMPLETE: i32 = 2;

    /// One or more specs, suites, or spec files failed.
    pub const FAILED: i32 = 3;

    /// A spec requested an early exit before the run completed.
    pub const PREMATURE_EXIT: i32 = 4;
}
