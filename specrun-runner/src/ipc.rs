// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The line protocol between worker processes and the coordinator.
//!
//! A worker writes every [`SpecEvent`] to its standard output as a single line: the
//! [`EVENT_LINE_PREFIX`] followed by the event as JSON. Any other line on standard output is
//! output printed by specs, and is passed through as-is.

use crate::errors::WriteEventError;
use specrun_metadata::SpecEvent;
use std::io::Write;
use tracing::warn;

/// The prefix marking a line as an event.
pub const EVENT_LINE_PREFIX: &str = "@@specrun@@ ";

/// Writes events to a worker's standard output.
#[derive(Debug)]
pub struct EventWriter<W> {
    writer: W,
}

impl<W: Write> EventWriter<W> {
    /// Creates a new writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single event and flushes it.
    ///
    /// The line is written with a single call, so that it isn't interleaved with output printed by
    /// specs running at the same time.
    pub fn write_event(&mut self, event: &SpecEvent) -> Result<(), WriteEventError> {
        let mut line = String::from(EVENT_LINE_PREFIX);
        line.push_str(&serde_json::to_string(event)?);
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// A message received from a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelMessage {
    /// An event.
    Event(SpecEvent),

    /// A line of output that isn't an event.
    Output {
        /// The line, without its trailing newline.
        line: String,
    },

    /// The worker's channel closed. Nothing follows this message from the same source.
    Closed(ChannelClosed),
}

/// Payload of [`ChannelMessage::Closed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelClosed {
    /// The worker's exit code, if it was a process that exited normally.
    pub exit_code: Option<i32>,

    /// A description of how the worker finished.
    pub description: String,
}

/// A [`ChannelMessage`] tagged with the worker it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcedMessage {
    /// The worker index, or `None` for a non-parallel run.
    pub source: Option<usize>,

    /// The message.
    pub message: ChannelMessage,
}

impl SourcedMessage {
    /// Creates a new message.
    pub fn new(source: Option<usize>, message: ChannelMessage) -> Self {
        Self { source, message }
    }
}

/// Decodes a line read from a worker's standard output.
///
/// A line with the event prefix that can't be decoded is treated as output.
pub fn decode_line(line: &str) -> ChannelMessage {
    let Some(json) = line.strip_prefix(EVENT_LINE_PREFIX) else {
        return ChannelMessage::Output {
            line: line.to_owned(),
        };
    };
    match serde_json::from_str(json) {
        Ok(event) => ChannelMessage::Event(event),
        Err(error) => {
            warn!("malformed event line from worker: {error}");
            ChannelMessage::Output {
                line: line.to_owned(),
            }
        }
    }
}
