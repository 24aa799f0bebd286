// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests that run the specrun binary against the projects in `fixtures/`.
//!
//! Every fixture is a small specrun project with a `specrun.toml` and declarative spec files under
//! `spec/`. Runs never write to the fixture directories.

use color_eyre::{Result, eyre::ensure};
use pretty_assertions::assert_eq;
use specrun_metadata::SpecrunExitCode;

mod fixtures;

use fixtures::SpecrunCli;

#[test]
fn test_passing_in_process() {
    let output = SpecrunCli::new("passing").args(["run"]).output();
    output.assert(SpecrunExitCode::OK, &["Started\n...\n", "3 specs, 0 failures\n"]);
    assert!(
        !output.stdout_as_str().contains("Ran in parallel"),
        "in-process runs don't mention workers:\n\n{output}"
    );
}

#[test]
fn test_passing_parallel() {
    let output = SpecrunCli::new("passing")
        .args(["run", "--parallel", "2"])
        .output();
    output.assert(
        SpecrunExitCode::OK,
        &["3 specs, 0 failures\n", "Ran in parallel with 2 workers\n"],
    );
}

#[test]
fn test_failing_parallel() {
    let output = SpecrunCli::new("failing").args(["run"]).output();
    output.assert(
        SpecrunExitCode::FAILED,
        &[
            "Failures:\n1) Spec file 1 a failing spec\n  Message:\n    Expected 1 to be 2.\n  Stack:\n",
            "at spec/one.toml:",
            "3 specs, 1 failure\n",
            "Ran in parallel with 2 workers\n",
        ],
    );
}

#[test]
fn test_no_specs() {
    let output = SpecrunCli::new("empty").args(["run"]).output();
    output.assert(
        SpecrunExitCode::INCOMPLETE,
        &["No specs found\n", "Incomplete: No specs found\n"],
    );
}

#[test]
fn test_suite_error() {
    let output = SpecrunCli::new("suite-error").args(["run"]).output();
    output.assert(
        SpecrunExitCode::FAILED,
        &[
            "Suite error: Spec file 1\n  Message:\n    afterAll exploded\n",
            "1 spec, 1 failure\n",
        ],
    );
}

#[test]
fn test_helper_hooks_run_in_workers() {
    let output = SpecrunCli::new("helpers").args(["run"]).output();
    output.assert(
        SpecrunExitCode::OK,
        &[
            "beforeEach in helper ran\n",
            "afterEach in helper ran\n",
            "1 spec, 0 failures\n",
        ],
    );
}

#[test]
fn test_helper_load_error_is_reported_once() {
    let output = SpecrunCli::new("helper-load-error").args(["run"]).output();
    output.assert(
        SpecrunExitCode::FATAL,
        &["Fatal error in worker: helper exploded\n    at spec/helpers/broken.toml:1\n"],
    );
    let stdout = output.stdout_as_str();
    assert_eq!(
        stdout.matches("helper exploded").count(),
        1,
        "the error is reported exactly once"
    );
    assert!(
        !stdout.contains("Finished in"),
        "fatal runs have no summary:\n\n{output}"
    );
}

#[test]
fn test_spec_load_error_is_contained() {
    let output = SpecrunCli::new("spec-load-error").args(["run"]).output();
    output.assert(
        SpecrunExitCode::FAILED,
        &[
            "Suite error: top suite\n  Message:\n    Error loading spec/bad.toml: spec exploded\n",
            "1 spec, 1 failure\n",
        ],
    );
}

#[test]
fn test_top_level_hooks_in_spec_files() {
    let output = SpecrunCli::new("parallel-hooks").args(["run"]).output();
    output.assert(
        SpecrunExitCode::OK,
        &["top-level beforeEach ran\n", "1 spec, 0 failures\n"],
    );

    let output = SpecrunCli::new("parallel-hooks")
        .args(["run", "--parallel", "2"])
        .output();
    output.assert(
        SpecrunExitCode::FAILED,
        &["In parallel mode, beforeEach must be in a describe block or in a helper file"],
    );
}

#[test]
fn test_filter() {
    let output = SpecrunCli::new("filter")
        .args(["run", "--filter", "adds"])
        .output();
    output.assert(
        SpecrunExitCode::OK,
        &["Ran 1 of 2 specs\n", "1 spec, 0 failures\n"],
    );

    let output = SpecrunCli::new("filter").args(["run"]).output();
    output.assert(SpecrunExitCode::FAILED, &["2 specs, 1 failure\n"]);
}

#[test]
fn test_invalid_filter() {
    let output = SpecrunCli::new("filter")
        .args(["run", "--filter", "("])
        .output();
    assert_eq!(output.exit_code(), Some(SpecrunExitCode::FATAL), "{output}");
    assert!(
        output.stderr_as_str().contains("invalid filter `(`"),
        "{output}"
    );
}

#[test]
fn test_global_hooks() -> Result<()> {
    let output = SpecrunCli::new("global-hooks").args(["run"]).output();
    output.assert(
        SpecrunExitCode::OK,
        &["in globalSetup\n", "in spec\n", "in globalTeardown\n"],
    );

    let stdout = output.stdout_as_str();
    let position = |needle: &str| stdout.find(needle);
    ensure!(
        position("in globalSetup") < position("in spec")
            && position("in spec") < position("in globalTeardown"),
        "global hooks run around specs:\n\n{output}"
    );
    Ok(())
}

#[test]
fn test_global_setup_failure() {
    let output = SpecrunCli::new("global-hooks")
        .args(["run", "--config", "setup-fails.toml"])
        .output();
    output.assert(
        SpecrunExitCode::FATAL,
        &["Error in globalSetup: setup failed\n"],
    );
    let stdout = output.stdout_as_str();
    assert!(!stdout.contains("in spec"), "no specs run:\n\n{output}");
    assert!(
        !stdout.contains("in globalTeardown"),
        "teardown is skipped:\n\n{output}"
    );
}

#[test]
fn test_global_teardown_failure() {
    let output = SpecrunCli::new("global-hooks")
        .args(["run", "--config", "teardown-fails.toml"])
        .output();
    output.assert(
        SpecrunExitCode::FATAL,
        &["1 spec, 0 failures\n", "Error in globalTeardown: teardown failed\n"],
    );

    let output = SpecrunCli::new("global-hooks")
        .args(["run", "--config", "teardown-panics.toml"])
        .output();
    output.assert(
        SpecrunExitCode::FATAL,
        &["Unhandled exception during globalTeardown: teardown exploded\n"],
    );
}

#[test]
fn test_require() {
    let output = SpecrunCli::new("noisy-require")
        .args(["run", "--require", "support/noisy.toml"])
        .output();
    output.assert(
        SpecrunExitCode::OK,
        &["noisy require was loaded\n", "1 spec, 0 failures\n"],
    );
}

#[test]
fn test_premature_exit() {
    for args in [&["run"][..], &["run", "--parallel", "1"]] {
        let output = SpecrunCli::new("premature-exit").args(args.iter().copied()).output();
        output.assert(
            SpecrunExitCode::PREMATURE_EXIT,
            &["`exits early` requested an early exit with code 7\n"],
        );
    }
}

#[test]
fn test_worker_crash() {
    let output = SpecrunCli::new("crash").args(["run"]).output();
    output.assert(
        SpecrunExitCode::FATAL,
        &["Fatal error in worker: worker 0 exited before finishing its specs ("],
    );
    assert_eq!(
        output
            .stdout_as_str()
            .matches("exited before finishing its specs")
            .count(),
        1,
        "the crash is reported exactly once:\n\n{output}"
    );
    assert!(
        output.stderr_as_str().contains("worker exploded"),
        "the worker's stderr is passed through:\n\n{output}"
    );
}

#[test]
fn test_explicit_files() {
    let output = SpecrunCli::new("failing")
        .args(["run", "spec/two.toml", "spec/three.toml"])
        .output();
    output.assert(
        SpecrunExitCode::OK,
        &["2 specs, 0 failures\n", "Ran in parallel with 2 workers\n"],
    );
}

#[test]
fn test_list() {
    let output = SpecrunCli::new("failing").args(["list"]).output();
    assert_eq!(output.exit_code(), Some(SpecrunExitCode::OK), "{output}");
    assert_eq!(
        output.stdout_as_str(),
        "worker 0:\n    spec/one.toml\n    spec/two.toml\n\
         worker 1:\n    spec/three.toml\n"
    );
}

#[test]
fn test_json_message_format() -> Result<()> {
    let output = SpecrunCli::new("passing")
        .args(["run", "--message-format", "json"])
        .output();
    assert_eq!(output.exit_code(), Some(SpecrunExitCode::OK), "{output}");

    let events = output
        .stdout_as_str()
        .lines()
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<Result<Vec<_>, _>>()?;
    let types: Vec<_> = events
        .iter()
        .map(|event| event["type"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(
        types,
        vec![
            "run-started",
            "spec-progress",
            "spec-progress",
            "spec-progress",
            "run-finished",
        ]
    );
    let report = &events[4]["report"];
    ensure!(
        report["counts"]["total"] == 3 && report["counts"]["failures"] == 0,
        "unexpected report: {report}"
    );
    Ok(())
}

#[test]
fn test_missing_config_file() {
    let output = SpecrunCli::new("passing")
        .args(["run", "--config", "does-not-exist.toml"])
        .output();
    assert_eq!(output.exit_code(), Some(SpecrunExitCode::FATAL), "{output}");
    assert!(
        output
            .stderr_as_str()
            .contains("failed to parse specrun config"),
        "{output}"
    );
}
