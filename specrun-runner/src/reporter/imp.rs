// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    displayer::{DisplayReporter, Styles},
    events::NarrativeEvent,
    structured::StructuredReporter,
};
use crate::errors::WriteEventError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Where a reporter writes its output.
///
/// This is usually standard output, but can be an in-memory buffer for tests.
pub enum ReporterOutput<'a> {
    /// Write to standard output, flushing after every event.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Receives the narrative of a run.
pub trait ReporterSink {
    /// Reports a single narrative event.
    fn report(&mut self, event: &NarrativeEvent) -> Result<(), WriteEventError>;
}

/// The format a [`Reporter`] writes in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageFormat {
    /// Progress glyphs and a summary for people.
    #[default]
    Human,

    /// One JSON document per narrative event.
    Json,
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFormat::Human => write!(f, "human"),
            MessageFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(MessageFormat::Human),
            "json" => Ok(MessageFormat::Json),
            other => Err(format!(
                "unknown message format `{other}` (expected `human` or `json`)"
            )),
        }
    }
}

/// Reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    message_format: MessageFormat,
}

impl ReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets the output format.
    pub fn set_message_format(&mut self, message_format: MessageFormat) -> &mut Self {
        self.message_format = message_format;
        self
    }

    /// Creates a new reporter writing to `output`.
    pub fn build<'a>(&self, output: ReporterOutput<'a>) -> Reporter<'a> {
        let inner = match self.message_format {
            MessageFormat::Human => {
                let mut styles: Box<Styles> = Box::default();
                if self.should_colorize {
                    styles.colorize();
                }
                ReporterImpl::Display(DisplayReporter::new(output, styles))
            }
            MessageFormat::Json => ReporterImpl::Structured(StructuredReporter::new(output)),
        };
        Reporter { inner }
    }
}

/// Writes the narrative of a run, either for people or for machines.
pub struct Reporter<'a> {
    inner: ReporterImpl<'a>,
}

enum ReporterImpl<'a> {
    Display(DisplayReporter<'a>),
    Structured(StructuredReporter<'a>),
}

impl ReporterSink for Reporter<'_> {
    fn report(&mut self, event: &NarrativeEvent) -> Result<(), WriteEventError> {
        match &mut self.inner {
            ReporterImpl::Display(display) => display.write_event(event),
            ReporterImpl::Structured(structured) => structured.write_event(event),
        }
    }
}
