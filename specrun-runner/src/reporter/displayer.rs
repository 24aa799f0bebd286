// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output in the style of a console spec reporter.
//!
//! Progress is a single line of glyphs, one per spec. Failure details, pending specs and totals
//! are printed once the run has finished.

use super::{
    ReporterOutput,
    events::{AggregateReport, NarrativeEvent, OverallStatus},
};
use crate::{
    errors::WriteEventError,
    helpers::{indent, plural},
};
use owo_colors::{OwoColorize, Style};
use specrun_metadata::{FailureRecord, FatalErrorKind, FatalErrorSummary, PrematureExitSummary};
use std::io::Write;

#[derive(Clone, Debug, Default)]
pub(super) struct Styles {
    pub(super) pass: Style,
    pub(super) fail: Style,
    pub(super) pending: Style,
    pub(super) count: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.pass = Style::new().green();
        self.fail = Style::new().red();
        self.pending = Style::new().yellow();
        self.count = Style::new().bold();
    }
}

pub(super) struct DisplayReporter<'a> {
    output: ReporterOutput<'a>,
    styles: Box<Styles>,
    // True if progress glyphs have been written since the last newline.
    mid_line: bool,
}

impl<'a> DisplayReporter<'a> {
    pub(super) fn new(output: ReporterOutput<'a>, styles: Box<Styles>) -> Self {
        Self {
            output,
            styles,
            mid_line: false,
        }
    }

    pub(super) fn write_event(&mut self, event: &NarrativeEvent) -> Result<(), WriteEventError> {
        let mut buf = Vec::new();
        self.write_event_impl(event, &mut buf)?;
        match &mut self.output {
            ReporterOutput::Terminal => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&buf)?;
                stdout.flush()?;
            }
            ReporterOutput::Buffer(buffer) => buffer.extend_from_slice(&buf),
        }
        Ok(())
    }

    fn write_event_impl(
        &mut self,
        event: &NarrativeEvent,
        writer: &mut dyn Write,
    ) -> Result<(), WriteEventError> {
        match event {
            NarrativeEvent::RunStarted { .. } => {
                writeln!(writer, "Started")?;
            }
            NarrativeEvent::SpecProgress { result, .. } => {
                if let Some(glyph) = result.status.glyph() {
                    let style = match glyph {
                        '.' => self.styles.pass,
                        'F' => self.styles.fail,
                        _ => self.styles.pending,
                    };
                    write!(writer, "{}", glyph.style(style))?;
                    self.mid_line = true;
                }
            }
            NarrativeEvent::Output { line, .. } => {
                self.end_line(writer)?;
                writeln!(writer, "{line}")?;
            }
            NarrativeEvent::FatalError { error, .. } => {
                self.end_line(writer)?;
                self.write_fatal_error(error, writer)?;
            }
            NarrativeEvent::PrematureExit { exit, .. } => {
                self.end_line(writer)?;
                self.write_premature_exit(exit, writer)?;
            }
            NarrativeEvent::RunFinished { report } => {
                self.mid_line = false;
                self.write_summary(report, writer)?;
            }
        }
        Ok(())
    }

    fn end_line(&mut self, writer: &mut dyn Write) -> std::io::Result<()> {
        if self.mid_line {
            writeln!(writer)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn write_fatal_error(
        &self,
        error: &FatalErrorSummary,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let heading = match error.kind {
            FatalErrorKind::LoadFailure
            | FatalErrorKind::WorkerCrash
            | FatalErrorKind::Configuration => "Fatal error in worker",
            FatalErrorKind::GlobalSetup => "Error in globalSetup",
            FatalErrorKind::GlobalTeardown => "Error in globalTeardown",
            FatalErrorKind::UnhandledGlobalSetup => "Unhandled exception during globalSetup",
            FatalErrorKind::UnhandledGlobalTeardown => "Unhandled exception during globalTeardown",
        };
        writeln!(
            writer,
            "{}: {}",
            heading.style(self.styles.fail),
            error.message
        )?;
        if let Some(location) = &error.location {
            writeln!(writer, "{}", indent(location, 4))?;
        }
        Ok(())
    }

    fn write_premature_exit(
        &self,
        exit: &PrematureExitSummary,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        match &exit.spec {
            Some(spec) => writeln!(
                writer,
                "{} `{spec}` requested an early exit with code {}",
                "Exiting:".style(self.styles.fail),
                exit.code,
            ),
            None => writeln!(
                writer,
                "{} early exit requested with code {}",
                "Exiting:".style(self.styles.fail),
                exit.code,
            ),
        }
    }

    fn write_summary(&self, report: &AggregateReport, writer: &mut dyn Write) -> std::io::Result<()> {
        write!(writer, "\n\n")?;

        if !report.spec_failures.is_empty() {
            write!(writer, "Failures:")?;
        }
        for (index, result) in report.spec_failures.iter().enumerate() {
            write!(writer, "\n{}) {}", index + 1, result.spec.full_name)?;
            self.write_failures(&result.failures, writer)?;
        }

        for result in &report.suite_failures {
            write!(
                writer,
                "\n{}",
                format!("Suite error: {}", result.suite.full_name).style(self.styles.fail)
            )?;
            self.write_failures(&result.failures, writer)?;
        }
        if !report.global_failures.is_empty() {
            write!(
                writer,
                "\n{}",
                "Suite error: top suite".style(self.styles.fail)
            )?;
            self.write_failures(&report.global_failures, writer)?;
        }

        if !report.pending.is_empty() {
            write!(writer, "Pending:")?;
        }
        for (index, result) in report.pending.iter().enumerate() {
            let reason = result
                .pending_reason
                .as_deref()
                .filter(|reason| !reason.is_empty())
                .unwrap_or("No reason given");
            write!(writer, "\n{}) {}\n", index + 1, result.spec.full_name)?;
            writeln!(writer, "{}", indent(reason, 2).style(self.styles.pending))?;
        }

        let executed = report.counts.executed();
        if executed > 0 {
            writeln!(writer)?;
            if report.counts.excluded > 0 {
                writeln!(
                    writer,
                    "Ran {} of {} {}",
                    executed,
                    report.counts.total,
                    plural::specs_str(report.counts.total),
                )?;
            }
            let failures = report.failure_count();
            let failures_style = if failures > 0 {
                self.styles.fail
            } else {
                self.styles.pass
            };
            write!(
                writer,
                "{}",
                format!(
                    "{executed} {}, {failures} {}",
                    plural::specs_str(executed),
                    plural::failures_str(failures),
                )
                .style(failures_style),
            )?;
            if report.counts.pending > 0 {
                write!(
                    writer,
                    ", {} pending {}",
                    report.counts.pending,
                    plural::specs_str(report.counts.pending),
                )?;
            }
        } else {
            write!(writer, "No specs found")?;
        }
        writeln!(writer)?;

        if let Some(worker_count) = report.worker_count {
            writeln!(
                writer,
                "Ran in parallel with {} {}",
                worker_count.style(self.styles.count),
                plural::workers_str(worker_count),
            )?;
        }
        let seconds = report.duration.as_secs_f64();
        writeln!(
            writer,
            "Finished in {seconds:.3} {}",
            plural::seconds_str(seconds)
        )?;

        if report.status() == OverallStatus::Incomplete {
            writeln!(writer, "Incomplete: No specs found")?;
        }
        Ok(())
    }

    fn write_failures(
        &self,
        failures: &[FailureRecord],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        for failure in failures {
            write!(writer, "\n  Message:\n")?;
            write!(
                writer,
                "{}",
                indent(&failure.message, 4).style(self.styles.fail)
            )?;
            if let Some(stack) = &failure.stack {
                write!(writer, "\n  Stack:\n{}", indent(stack, 8))?;
            }
        }
        writeln!(writer)
    }
}
