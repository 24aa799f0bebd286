// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::events::AggregateReport;
use chrono::{DateTime, FixedOffset};
use specrun_metadata::{ResultStatus, RunCounts, SpecInfo, SpecResult};
use std::time::Duration;

pub(crate) fn spec_result(full_name: &str, status: ResultStatus) -> SpecResult {
    SpecResult {
        spec: SpecInfo {
            id: "spec0".to_owned(),
            description: full_name.to_owned(),
            full_name: full_name.to_owned(),
            file: None,
        },
        status,
        failures: Vec::new(),
        pending_reason: None,
        duration: Duration::ZERO,
    }
}

/// An empty report.
pub(crate) fn report(worker_count: Option<usize>) -> AggregateReport {
    AggregateReport {
        counts: RunCounts::default(),
        total_specs_defined: 0,
        spec_failures: Vec::new(),
        suite_failures: Vec::new(),
        global_failures: Vec::new(),
        pending: Vec::new(),
        fatal_errors: Vec::new(),
        premature_exit: None,
        worker_count,
        started_at: DateTime::<FixedOffset>::default(),
        duration: Duration::ZERO,
    }
}
