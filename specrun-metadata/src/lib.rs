// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable events and exit codes for specrun.
//!
//! Workers stream [`SpecEvent`]s to the coordinator, one JSON document per line. The same types are
//! exposed to external tooling through `specrun run --message-format json`.

mod events;
mod exit_codes;

pub use events::*;
pub use exit_codes::*;
