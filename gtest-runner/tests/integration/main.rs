// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the test runner, driven by fake device collaborators.

mod fixtures;

use camino_tempfile::tempdir;
use color_eyre::eyre::{Result, bail};
use fixtures::*;
use gtest_runner::{
    config::RunnerConfig,
    errors::RunTestError,
    resources::ResourceState,
    runner::{RunOutcome, TestRunner, TestRunnerBuilder},
    test_result::ResultType,
    transcript::RunTermination,
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{fs, time::Duration};

const TIMEOUT: Duration = Duration::from_millis(200);

fn build_runner<'a>(
    device: &'a FakeDevice,
    package: &'a FakePackage,
    tool: &'a FakeTool,
    spawner: &FakeSpawner,
) -> Result<TestRunner<'a, FakeDevice, FakePackage>> {
    init_logging();
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_timeout(TIMEOUT)
        .set_test_arguments("--gtest_repeat=1")
        .set_ci(false);
    Ok(builder.build(device, package, tool, spawner)?)
}

fn summarize(outcome: &RunOutcome) -> Vec<(&str, ResultType, Duration)> {
    outcome
        .results
        .iter()
        .map(|result| (result.name(), result.result_type(), result.duration()))
        .collect()
}

#[test]
fn crash_mid_run() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        indoc! {"
            [ RUN      ] A
            output from A
            [       OK ] A (5 ms)
            [ RUN      ] B
            [ CRASHED      ]
        "},
    );

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    runner.set_up()?;
    let outcome = runner.run_one("A:B:C")?;
    runner.tear_down()?;

    assert_eq!(
        summarize(&outcome),
        vec![
            ("A", ResultType::Pass, Duration::from_millis(5)),
            ("B", ResultType::Crash, Duration::ZERO),
            ("C", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert_eq!(
        outcome.results.get("A").map(|result| result.log()),
        Some("output from A\n")
    );
    assert_eq!(outcome.retry.as_deref(), Some("B:C"));
    assert_eq!(outcome.termination, Some(RunTermination::Crashed));
    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.start_time.is_some());
    assert_eq!(package.close_count(), 1);

    assert_eq!(
        log.calls(),
        vec![
            "tool set up",
            "clear application state",
            "command line A:B:C [--gtest_repeat=1]",
            "spawn",
            "exit code",
            "clear application state",
            "tool clean up",
        ]
    );
    Ok(())
}

#[test]
fn crash_ends_parsing() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        indoc! {"
            [ RUN      ] B
            [ CRASHED      ]
            [ RUN      ] C
            [       OK ] C (1 ms)
        "},
    );

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("B:C")?;

    // Output after the crash marker isn't parsed.
    assert_eq!(
        summarize(&outcome),
        vec![
            ("B", ResultType::Crash, Duration::ZERO),
            ("C", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert_eq!(outcome.retry.as_deref(), Some("B:C"));
    assert_eq!(outcome.termination, Some(RunTermination::Crashed));
    assert_eq!(package.close_count(), 1);
    Ok(())
}

#[test]
fn empty_spec_is_a_no_op() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new("net_unittests", &log, "");

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    for spec in ["", "::"] {
        let outcome = runner.run_one(spec)?;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.retry, None);
        assert_eq!(outcome.termination, None);
    }

    assert_eq!(log.calls(), Vec::<String>::new(), "no device calls");
    assert_eq!(package.close_count(), 0);
    Ok(())
}

#[test]
fn all_pass() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        "[ RUN      ] Foo.A\r\n[       OK ] Foo.A (2 ms)\r\n\
         [ RUN      ] Foo.B\r\n[       OK ] Foo.B (0 ms)\r\n\
         [  PASSED  ] 2 tests.\r\n",
    );

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("Foo.A:Foo.B")?;

    assert_eq!(
        summarize(&outcome),
        vec![
            ("Foo.A", ResultType::Pass, Duration::from_millis(2)),
            ("Foo.B", ResultType::Pass, Duration::ZERO),
        ]
    );
    assert_eq!(outcome.retry, None);
    assert_eq!(outcome.termination, Some(RunTermination::RunPassed));
    assert_eq!(package.close_count(), 1);
    Ok(())
}

#[test]
fn end_of_stream() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);

    // A pending test at end of stream crashed.
    let package = FakePackage::new(
        "base_unittests",
        &log,
        indoc! {"
            [ RUN      ] A
            [       OK ] A (1 ms)
            [ RUN      ] B
            partial output
        "},
    );
    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A:B:C")?;
    assert_eq!(
        summarize(&outcome),
        vec![
            ("A", ResultType::Pass, Duration::from_millis(1)),
            ("B", ResultType::Crash, Duration::ZERO),
            ("C", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert_eq!(
        outcome.results.get("B").map(|result| result.log()),
        Some("partial output\n")
    );
    assert_eq!(outcome.termination, Some(RunTermination::StreamEnded));
    assert_eq!(package.close_count(), 1);

    // With no test pending, nothing is recorded for the stream ending.
    let package = FakePackage::new(
        "base_unittests",
        &log,
        "[ RUN      ] A\n[       OK ] A (1 ms)\n",
    );
    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A:B")?;
    assert_eq!(
        summarize(&outcome),
        vec![
            ("A", ResultType::Pass, Duration::from_millis(1)),
            ("B", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert_eq!(outcome.retry.as_deref(), Some("B"));
    assert_eq!(outcome.termination, Some(RunTermination::StreamEnded));
    Ok(())
}

#[test]
fn timeouts() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);

    let package = FakePackage::new("base_unittests", &log, "[ RUN      ] A\nworking\n")
        .with_after(AfterTranscript::Hang);
    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A:B")?;
    assert_eq!(
        summarize(&outcome),
        vec![
            ("A", ResultType::Timeout, Duration::ZERO),
            ("B", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert_eq!(
        outcome.results.get("A").map(|result| result.log()),
        Some("working\n")
    );
    assert_eq!(outcome.retry.as_deref(), Some("A:B"));
    assert_eq!(outcome.termination, Some(RunTermination::TimedOut));
    assert!(outcome.elapsed >= TIMEOUT);
    assert_eq!(package.close_count(), 1);

    // Timing out between tests records nothing for the timeout itself.
    let package = FakePackage::new("base_unittests", &log, "").with_after(AfterTranscript::Hang);
    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A")?;
    assert_eq!(
        summarize(&outcome),
        vec![("A", ResultType::Unknown, Duration::ZERO)]
    );
    assert_eq!(outcome.termination, Some(RunTermination::TimedOut));
    Ok(())
}

#[test]
fn device_lost() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new("net_unittests", &log, "[ RUN      ] A\n");

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    assert!(runner.profile().requires_mock_server);
    assert_eq!(runner.resources().server_ports().len(), 1);
    runner.set_up()?;

    device.set_online(false);
    match runner.run_one("A") {
        Err(error @ RunTestError::DeviceLost { .. }) => {
            assert!(error.is_device_lost());
            assert_eq!(error.to_string(), "device `emulator-5554` went offline");
        }
        other => bail!("expected device lost, found {other:?}"),
    }
    assert_eq!(package.close_count(), 1);

    runner.tear_down()?;
    assert_eq!(runner.resources().state(), ResourceState::TornDown);

    assert_eq!(
        log.calls(),
        vec![
            "server set up",
            "tool set up",
            "clear application state",
            "command line A [--gtest_repeat=1]",
            "spawn",
            "server reset",
            "server tear down",
            "clear application state",
            "tool clean up",
        ]
    );
    Ok(())
}

#[test]
fn spawn_failure_still_resets_servers() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new("content_unittests", &log, "").with_failing_spawn();

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    match runner.run_one("A") {
        Err(RunTestError::Device { step, error }) => {
            assert_eq!(step, "spawn test process");
            assert!(!error.is_unreachable());
        }
        other => bail!("expected a device error, found {other:?}"),
    }

    assert_eq!(
        log.calls(),
        vec![
            "clear application state",
            "command line A [--gtest_repeat=1]",
            "spawn",
            "server reset",
        ]
    );
    Ok(())
}

#[test]
fn runner_failed() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        "launcher output\n[ RUNNER_FAILED ] could not start tests\n[ RUN      ] A\n",
    );

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A")?;
    assert_eq!(
        summarize(&outcome),
        vec![("A", ResultType::Unknown, Duration::ZERO)]
    );
    assert_eq!(outcome.termination, Some(RunTermination::RunnerFailed));
    assert_eq!(package.close_count(), 1);
    Ok(())
}

#[test]
fn mismatched_ok_is_dropped() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        indoc! {"
            [ RUN      ] A
            [       OK ] B (3 ms)
            [ RUN      ] C
            [  FAILED  ] C
            [  PASSED  ] 0 tests.
        "},
    );

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A:C")?;
    assert_eq!(
        summarize(&outcome),
        vec![
            ("C", ResultType::Fail, Duration::ZERO),
            ("A", ResultType::Unknown, Duration::ZERO),
        ]
    );
    assert!(!outcome.results.contains("B"));
    assert_eq!(outcome.retry.as_deref(), Some("C:A"));
    assert_eq!(outcome.termination, Some(RunTermination::RunPassed));
    Ok(())
}

#[test]
fn nonzero_exit_code_is_reported() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new(
        "base_unittests",
        &log,
        "[ RUN      ] A\n[  FAILED  ] A (12 ms)\n",
    )
    .with_exit_code(1);

    let mut runner = build_runner(&device, &package, &tool, &spawner)?;
    let outcome = runner.run_one("A")?;
    assert_eq!(
        summarize(&outcome),
        vec![("A", ResultType::Fail, Duration::from_millis(12))]
    );
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.termination, Some(RunTermination::StreamEnded));
    Ok(())
}

#[test]
fn perf_suite_lifecycle() -> Result<()> {
    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 2.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new("cc_perftests", &log, "[  PASSED  ] 0 tests.\n");

    let mut builder = TestRunnerBuilder::default();
    builder.set_ci(true);
    let mut runner = builder.build(&device, &package, &tool, &spawner)?;
    assert!(runner.profile().requires_high_perf_mode);
    assert!(!runner.profile().requires_mock_server);
    assert_eq!(runner.profile().effective_timeout, Duration::from_secs(240));

    runner.install_test_package()?;
    runner.set_up()?;
    runner.run_one("Perf.Test")?;
    runner.tear_down()?;
    // A second tear-down does nothing.
    runner.tear_down()?;

    assert_eq!(
        log.calls(),
        vec![
            "install",
            "perf mode high",
            "tool set up",
            "clear application state",
            "command line Perf.Test []",
            "spawn",
            "exit code",
            "perf mode default",
            "clear application state",
            "tool clean up",
        ]
    );
    Ok(())
}

#[test]
fn runner_from_config() -> Result<()> {
    let workspace_dir = tempdir()?;
    let config_path = workspace_dir.path().join(RunnerConfig::CONFIG_PATH);
    fs::create_dir_all(workspace_dir.path().join(".config"))?;
    fs::write(
        &config_path,
        indoc! {r#"
            timeout = "250ms"
            test-arguments = "--gtest_shuffle"
            ci = "never"
        "#},
    )?;
    let config = RunnerConfig::from_sources(workspace_dir.path(), None)?;

    let log = CallLog::default();
    let device = FakeDevice::new(&log);
    let tool = FakeTool::new(&log, 1.0);
    let spawner = FakeSpawner::new(&log);
    let package = FakePackage::new("base_unittests", &log, "");

    let mut runner = config
        .builder()
        .build(&device, &package, &tool, &spawner)?;
    assert_eq!(
        runner.profile().effective_timeout,
        Duration::from_millis(250)
    );
    runner.run_one("A")?;
    assert!(
        log.calls()
            .contains(&"command line A [--gtest_shuffle]".to_owned())
    );
    Ok(())
}
