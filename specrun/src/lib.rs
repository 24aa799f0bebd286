// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A spec-suite runner that splits spec files across worker processes.
//!
//! The `specrun` binary runs declarative TOML spec files. To run spec modules written in Rust,
//! build a binary that registers them in a [`SpecRegistry`](specrun_runner::loader::SpecRegistry)
//! and hands it to [`SpecrunApp::exec`]:
//!
//! ```no_run
//! use clap::Parser;
//! use specrun::SpecrunApp;
//! use specrun_runner::loader::SpecRegistry;
//!
//! let registry = SpecRegistry::new();
//! // registry.register("spec/math.rs", ...);
//! let app = SpecrunApp::parse();
//! let output = app.init_output();
//! let code = app.exec(output, registry).unwrap_or(1);
//! std::process::exit(code);
//! ```

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
