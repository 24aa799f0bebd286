// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading spec, helper and require files.
//!
//! A [`Loader`] turns a path into a [`SpecModule`], which then registers its suites with a
//! [`SuiteBuilder`]. Two kinds of modules exist:
//!
//! * compiled-in registration functions, looked up in a [`SpecRegistry`] by [`StaticLoader`]
//! * declarative TOML spec files, parsed at run time by [`DynamicLoader`]
//!
//! [`AutoLoader`] picks between the two by file extension.

mod dynamic;
mod registry;

pub use dynamic::*;
pub use registry::*;

use crate::{
    errors::{LoadError, LoadErrorKind, ModuleError},
    suite::{ModuleKind, SuiteBuilder},
};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// A loaded file, ready to register its suites.
pub trait SpecModule: fmt::Debug + Send {
    /// Registers the module's suites, specs and hooks with `builder`.
    fn register(self: Box<Self>, builder: &mut SuiteBuilder) -> Result<(), ModuleError>;
}

/// Turns a path into a [`SpecModule`].
pub trait Loader: fmt::Debug + Send + Sync {
    /// Loads the file at `path`, which is relative to the run's root directory.
    fn load(&self, path: &Utf8Path) -> Result<Box<dyn SpecModule>, LoadError>;
}

/// Loads `path` and registers it with `builder` as a module of the given kind.
///
/// Nothing the module registered is kept if either step fails.
pub fn load_and_register(
    loader: &dyn Loader,
    builder: &mut SuiteBuilder,
    path: &Utf8Path,
    kind: ModuleKind,
) -> Result<(), LoadError> {
    let module = loader.load(path)?;
    builder
        .register_file(path, kind, |builder| module.register(builder))
        .map_err(|error| LoadError::new(path, LoadErrorKind::Module(error)))
}

/// The loader to use for a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoaderKind {
    /// Picks a loader by file extension: `.toml` files are loaded dynamically, everything else
    /// statically.
    #[default]
    Auto,

    /// Only compiled-in modules.
    Static,

    /// Only declarative TOML spec files.
    Dynamic,
}

impl LoaderKind {
    /// Creates a loader of this kind.
    ///
    /// `root_dir` is the directory paths are resolved against, and `registry` holds the
    /// compiled-in modules.
    pub fn build(self, root_dir: &Utf8Path, registry: Arc<SpecRegistry>) -> Box<dyn Loader> {
        match self {
            LoaderKind::Auto => Box::new(AutoLoader::new(
                StaticLoader::new(registry),
                DynamicLoader::new(root_dir),
            )),
            LoaderKind::Static => Box::new(StaticLoader::new(registry)),
            LoaderKind::Dynamic => Box::new(DynamicLoader::new(root_dir)),
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderKind::Auto => f.write_str("auto"),
            LoaderKind::Static => f.write_str("static"),
            LoaderKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LoaderKind::Auto),
            "static" => Ok(LoaderKind::Static),
            "dynamic" => Ok(LoaderKind::Dynamic),
            other => Err(format!(
                "unknown loader `{other}` (expected one of: auto, static, dynamic)"
            )),
        }
    }
}

/// Dispatches to a [`DynamicLoader`] for `.toml` files and a [`StaticLoader`] otherwise.
#[derive(Debug)]
pub struct AutoLoader {
    static_loader: StaticLoader,
    dynamic_loader: DynamicLoader,
}

impl AutoLoader {
    /// Creates a new `AutoLoader`.
    pub fn new(static_loader: StaticLoader, dynamic_loader: DynamicLoader) -> Self {
        Self {
            static_loader,
            dynamic_loader,
        }
    }
}

impl Loader for AutoLoader {
    fn load(&self, path: &Utf8Path) -> Result<Box<dyn SpecModule>, LoadError> {
        if path.extension() == Some("toml") {
            self.dynamic_loader.load(path)
        } else {
            self.static_loader.load(path)
        }
    }
}
