// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Machine-readable output: one JSON document per narrative event.

use super::{ReporterOutput, events::NarrativeEvent};
use crate::errors::WriteEventError;
use std::io::Write;

pub(super) struct StructuredReporter<'a> {
    output: ReporterOutput<'a>,
}

impl<'a> StructuredReporter<'a> {
    pub(super) fn new(output: ReporterOutput<'a>) -> Self {
        Self { output }
    }

    pub(super) fn write_event(&mut self, event: &NarrativeEvent) -> Result<(), WriteEventError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        match &mut self.output {
            ReporterOutput::Terminal => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&line)?;
                stdout.flush()?;
            }
            ReporterOutput::Buffer(buffer) => buffer.extend_from_slice(&line),
        }
        Ok(())
    }
}
