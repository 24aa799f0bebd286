// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use specrun_runner::{
    config::SpecrunConfig,
    coordinator::{CoordinatorBuilder, RunPlan},
    discovery::DiscoveredFiles,
    engine::EngineConfig,
    global_hooks::{GlobalHook, StepsHook},
    launcher::{InProcessLauncher, ProcessLauncher, WorkerLauncher},
    loader::{LoaderKind, SpecRegistry},
    partition::{Parallelism, PartitionPlan},
    reporter::{MessageFormat, ReporterBuilder, ReporterOutput},
    worker::{self, WORKER_SUBCOMMAND_NAME},
};
use std::{
    io::{BufWriter, Write},
    sync::Arc,
};
use tracing::debug;

/// A spec-suite runner that splits spec files across worker processes.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "specrun",
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct SpecrunApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl SpecrunApp {
    /// Initializes logging and colors, returning the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    ///
    /// `registry` holds the spec modules compiled into this binary. Worker processes are started
    /// from the same executable, so they see the same registry.
    pub fn exec(self, output: OutputContext, registry: SpecRegistry) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output, registry),
            Command::List(opts) => opts.exec(),
            Command::Worker => Ok(worker::run_process(registry)?),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run specs
    Run(RunOpts),

    /// List spec files and how they would be split across workers
    List(ListOpts),

    /// Run a worker process (internal)
    #[command(name = WORKER_SUBCOMMAND_NAME, hide = true)]
    Worker,
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: ./specrun.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Number of worker processes, or "auto" [default: from config, or run in-process]
    #[arg(long, short = 'j', value_name = "N|auto")]
    parallel: Option<Parallelism>,

    /// Additional file to load before helpers (may be specified multiple times)
    #[arg(long = "require", value_name = "PATH")]
    requires: Vec<Utf8PathBuf>,

    /// Additional helper glob, relative to the spec directory (may be specified multiple times)
    #[arg(long = "helper", value_name = "GLOB")]
    helpers: Vec<String>,

    /// How spec files are loaded: auto, static or dynamic
    #[arg(long, value_name = "KIND")]
    loader: Option<LoaderKind>,

    /// Spec files to run instead of the configured globs
    #[arg(value_name = "FILES")]
    files: Vec<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, cwd: &Utf8Path) -> Result<SpecrunConfig> {
        let mut config = SpecrunConfig::from_sources(cwd, self.config.as_deref())?;
        if let Some(parallel) = self.parallel {
            config.set_parallel(parallel);
        }
        if let Some(loader) = self.loader {
            config.set_loader(loader);
        }
        config
            .add_requires(self.requires.iter().cloned())
            .add_helpers(self.helpers.iter().cloned());
        Ok(config)
    }

    /// Makes explicitly listed spec files relative to the config's base directory.
    fn explicit_spec_files(&self, cwd: &Utf8Path, base_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        self.files
            .iter()
            .map(|file| {
                let absolute = normalize(&cwd.join(file));
                absolute
                    .strip_prefix(base_dir)
                    .map(Utf8Path::to_path_buf)
                    .map_err(|_| ExpectedError::SpecFileOutsideProject {
                        path: file.clone(),
                        base_dir: base_dir.to_owned(),
                    })
            })
            .collect()
    }

    fn discover(&self, cwd: &Utf8Path, config: &SpecrunConfig) -> Result<DiscoveredFiles> {
        let explicit = self.explicit_spec_files(cwd, config.base_dir())?;
        Ok(DiscoveredFiles::discover(config, &explicit)?)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    config_opts: ConfigOpts,

    /// Only run specs whose full name matches this regular expression
    #[arg(long, value_name = "REGEX")]
    filter: Option<String>,

    /// Output format: human or json
    #[arg(long, value_name = "FORMAT", default_value_t)]
    message_format: MessageFormat,
}

impl RunOpts {
    fn exec(self, output: OutputContext, registry: SpecRegistry) -> Result<i32> {
        let cwd = current_dir()?;
        let config = self.config_opts.make_config(&cwd)?;
        let discovered = self.config_opts.discover(&cwd, &config)?;

        let plan = RunPlan {
            root_dir: config.base_dir().to_owned(),
            spec_files: discovered.spec_files,
            helper_files: discovered.helper_files,
            require_files: config.requires().to_vec(),
            loader: config.loader(),
            engine: EngineConfig {
                default_timeout: config.default_timeout(),
                filter: self.filter,
                parallel: config.parallel().is_some(),
            },
        };
        debug!(
            "running {} spec files with {} helpers",
            plan.spec_files.len(),
            plan.helper_files.len(),
        );

        let mut builder = CoordinatorBuilder::default();
        builder.set_handle_signals(true);
        if let Some(steps) = config.global_setup() {
            builder.set_global_setup(steps_hook(steps));
        }
        if let Some(steps) = config.global_teardown() {
            builder.set_global_teardown(steps_hook(steps));
        }
        let launcher: Arc<dyn WorkerLauncher> = match config.parallel() {
            Some(parallel) => {
                builder.set_parallelism(parallel);
                Arc::new(ProcessLauncher::new(current_exe()?))
            }
            None => Arc::new(InProcessLauncher::new(Arc::new(registry))),
        };
        let coordinator = builder.build(plan, launcher)?;

        let mut reporter = ReporterBuilder::default()
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stdout))
            .set_message_format(self.message_format)
            .build(ReporterOutput::Terminal);
        let outcome = coordinator.execute(&mut reporter)?;
        Ok(outcome.exit_code)
    }
}

fn steps_hook(steps: &[specrun_runner::steps::Step]) -> Arc<dyn GlobalHook> {
    Arc::new(StepsHook::new(steps.iter().cloned()))
}

#[derive(Debug, Args)]
struct ListOpts {
    #[command(flatten)]
    config_opts: ConfigOpts,
}

impl ListOpts {
    fn exec(self) -> Result<i32> {
        let cwd = current_dir()?;
        let config = self.config_opts.make_config(&cwd)?;
        let discovered = self.config_opts.discover(&cwd, &config)?;

        let mut stdout = BufWriter::new(std::io::stdout());
        write_list(&mut stdout, &config, &discovered)
            .and_then(|()| stdout.flush())
            .map_err(|error| ExpectedError::WriteEventError { err: error.into() })?;
        Ok(0)
    }
}

fn write_list(
    writer: &mut dyn Write,
    config: &SpecrunConfig,
    discovered: &DiscoveredFiles,
) -> std::io::Result<()> {
    if !config.requires().is_empty() {
        writeln!(writer, "requires:")?;
        for file in config.requires() {
            writeln!(writer, "    {file}")?;
        }
    }
    if !discovered.helper_files.is_empty() {
        writeln!(writer, "helpers:")?;
        for file in &discovered.helper_files {
            writeln!(writer, "    {file}")?;
        }
    }

    match config.parallel() {
        Some(parallel) => {
            let plan = PartitionPlan::round_robin(&discovered.spec_files, parallel.compute());
            for (index, files) in plan.iter() {
                writeln!(writer, "worker {index}:")?;
                for file in files {
                    writeln!(writer, "    {file}")?;
                }
            }
        }
        None => {
            writeln!(writer, "specs:")?;
            for file in &discovered.spec_files {
                writeln!(writer, "    {file}")?;
            }
        }
    }
    Ok(())
}

/// Lexically resolves `.` and `..` components without touching the filesystem.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|error| ExpectedError::CurrentDirFailed { error })?;
    Utf8PathBuf::from_path_buf(dir).map_err(|path| ExpectedError::NonUtf8Path { path })
}

fn current_exe() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe().map_err(|error| ExpectedError::CurrentExeFailed { error })?;
    Utf8PathBuf::from_path_buf(exe).map_err(|path| ExpectedError::NonUtf8Path { path })
}
