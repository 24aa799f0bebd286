// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for specrun.
//!
//! The config is read from `specrun.toml`, layered over the defaults embedded from
//! `default-config.toml`. Relative paths in the config are resolved against the directory the
//! config file is in.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    loader::LoaderKind,
    partition::Parallelism,
    steps::Step,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, warn};

/// Overall specrun configuration.
#[derive(Clone, Debug)]
pub struct SpecrunConfig {
    base_dir: Utf8PathBuf,
    spec_dir: Utf8PathBuf,
    spec_files: Vec<String>,
    helpers: Vec<String>,
    requires: Vec<Utf8PathBuf>,
    loader: LoaderKind,
    default_timeout: Duration,
    parallel: Option<Parallelism>,
    global_setup: Option<Vec<Step>>,
    global_teardown: Option<Vec<Step>>,
    unknown_keys: BTreeSet<String>,
}

impl SpecrunConfig {
    /// The default location of the config within a project.
    pub const CONFIG_FILE_NAME: &'static str = "specrun.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Custom configs are layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config.
    ///
    /// If `config_file` is given, it must exist, and relative paths are resolved against its
    /// directory. Otherwise `specrun.toml` in `cwd` is read if it exists, and relative paths are
    /// resolved against `cwd`.
    pub fn from_sources(
        cwd: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, required) = match config_file {
            Some(file) => (cwd.join(file), true),
            None => (cwd.join(Self::CONFIG_FILE_NAME), false),
        };
        let base_dir = match config_file.parent() {
            Some(parent) if required => parent.to_owned(),
            _ => cwd.to_owned(),
        };

        let builder = Config::builder()
            .add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required));
        let config = builder.build().map_err(|error| {
            ConfigParseError::new(
                &config_file,
                ConfigParseErrorKind::BuildError(Box::new(error)),
            )
        })?;
        let mut unknown_keys = BTreeSet::new();
        let deserialized: SpecrunConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown_keys.insert(path.to_string());
            })
            .map_err(|error| {
                ConfigParseError::new(
                    &config_file,
                    ConfigParseErrorKind::DeserializeError(Box::new(error)),
                )
            })?;

        // Execution order is always declaration order, so keys like `env.random` are ignored too.
        if !unknown_keys.is_empty() {
            let keys: Vec<_> = unknown_keys.iter().map(String::as_str).collect();
            warn!(
                "ignoring unknown config keys in {config_file}: {}",
                keys.join(", ")
            );
        }

        debug!("read config from {config_file} (base directory: {base_dir})");
        Ok(Self::from_deserialized(base_dir, deserialized, unknown_keys))
    }

    fn from_deserialized(
        base_dir: Utf8PathBuf,
        de: SpecrunConfigDeserialize,
        unknown_keys: BTreeSet<String>,
    ) -> Self {
        Self {
            base_dir,
            spec_dir: de.spec_dir,
            spec_files: de.spec_files,
            helpers: de.helpers,
            requires: de.requires,
            loader: de.loader,
            default_timeout: de.default_timeout,
            parallel: de.parallel,
            global_setup: de.global_setup.map(|hook| hook.steps),
            global_teardown: de.global_teardown.map(|hook| hook.steps),
            unknown_keys,
        }
    }

    /// The directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// The spec directory, relative to [`base_dir`](Self::base_dir).
    pub fn spec_dir(&self) -> &Utf8Path {
        &self.spec_dir
    }

    /// Globs matching spec files, relative to the spec directory.
    pub fn spec_files(&self) -> &[String] {
        &self.spec_files
    }

    /// Globs matching helper files, relative to the spec directory.
    pub fn helpers(&self) -> &[String] {
        &self.helpers
    }

    /// Files to load before helpers, relative to [`base_dir`](Self::base_dir).
    pub fn requires(&self) -> &[Utf8PathBuf] {
        &self.requires
    }

    /// How files are loaded.
    pub fn loader(&self) -> LoaderKind {
        self.loader
    }

    /// The timeout for specs and hooks that don't set their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The number of workers, or `None` to run in-process.
    pub fn parallel(&self) -> Option<Parallelism> {
        self.parallel
    }

    /// Steps to run before any spec.
    pub fn global_setup(&self) -> Option<&[Step]> {
        self.global_setup.as_deref()
    }

    /// Steps to run after all specs.
    pub fn global_teardown(&self) -> Option<&[Step]> {
        self.global_teardown.as_deref()
    }

    /// Keys in the config file that specrun doesn't recognize. They are ignored.
    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    // ---
    // Command-line overrides
    // ---

    /// Overrides the number of workers.
    pub fn set_parallel(&mut self, parallel: Parallelism) -> &mut Self {
        self.parallel = Some(parallel);
        self
    }

    /// Overrides the loader.
    pub fn set_loader(&mut self, loader: LoaderKind) -> &mut Self {
        self.loader = loader;
        self
    }

    /// Appends files to load before helpers.
    pub fn add_requires(&mut self, requires: impl IntoIterator<Item = Utf8PathBuf>) -> &mut Self {
        self.requires.extend(requires);
        self
    }

    /// Appends helper globs.
    pub fn add_helpers(&mut self, helpers: impl IntoIterator<Item = String>) -> &mut Self {
        self.helpers.extend(helpers);
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SpecrunConfigDeserialize {
    spec_dir: Utf8PathBuf,
    spec_files: Vec<String>,
    helpers: Vec<String>,
    requires: Vec<Utf8PathBuf>,
    loader: LoaderKind,
    #[serde(with = "humantime_serde")]
    default_timeout: Duration,
    #[serde(default)]
    parallel: Option<Parallelism>,
    #[serde(default)]
    global_setup: Option<GlobalHookDeserialize>,
    #[serde(default)]
    global_teardown: Option<GlobalHookDeserialize>,
}

#[derive(Clone, Debug, Deserialize)]
struct GlobalHookDeserialize {
    steps: Vec<Step>,
}
