// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`], created through [`TestRunnerBuilder`].

use crate::{
    device::{Device, ExecutionTool, MockServer, MockServerSpawner, TestPackage},
    errors::{
        DeviceError, ErrorList, RunTestError, SetUpError, TearDownStepError, TestRunnerBuildError,
    },
    ports::allocate_test_server_port,
    resources::AuxiliaryResources,
    suite_policy::{SuiteProfile, detect_ci},
    test_result::RunResultSet,
    time::stopwatch,
    transcript::{ParsedTranscript, RunTermination, TranscriptParser},
};
use chrono::{DateTime, Local};
use debug_ignore::DebugIgnore;
use indexmap::IndexSet;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Test runner options.
#[derive(Clone, Debug, Default)]
pub struct TestRunnerBuilder {
    timeout: Duration,
    test_arguments: String,
    ci: Option<bool>,
}

impl TestRunnerBuilder {
    /// Sets the base per-marker timeout. Zero (the default) means 60 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Sets extra arguments passed through to the test binary.
    pub fn set_test_arguments(&mut self, test_arguments: impl Into<String>) -> &mut Self {
        self.test_arguments = test_arguments.into();
        self
    }

    /// Sets whether the runner is on a CI machine, which doubles the timeout.
    ///
    /// If not set, this is detected from the environment.
    pub fn set_ci(&mut self, ci: bool) -> &mut Self {
        self.ci = Some(ci);
        self
    }

    /// Creates a new test runner.
    ///
    /// Suites that need mock test servers get one server, spawned on a freshly allocated port.
    pub fn build<'a, D: Device, P: TestPackage<D>>(
        self,
        device: &'a D,
        package: &'a P,
        tool: &'a dyn ExecutionTool,
        spawner: &dyn MockServerSpawner,
    ) -> Result<TestRunner<'a, D, P>, TestRunnerBuildError> {
        let ci = self.ci.unwrap_or_else(detect_ci);
        let profile = SuiteProfile::classify(
            package.suite_name(),
            self.timeout,
            ci,
            tool.timeout_scale(),
        );

        let servers: Vec<Box<dyn MockServer>> = if profile.requires_mock_server {
            vec![spawner.spawn(allocate_test_server_port()?)]
        } else {
            Vec::new()
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            device,
            package,
            tool: DebugIgnore(tool),
            resources: AuxiliaryResources::new(&profile, servers),
            profile,
            test_arguments: self.test_arguments,
            runtime,
        })
    }
}

/// Runs gtest binaries for a single suite on a single device.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a, D, P> {
    device: &'a D,
    package: &'a P,
    tool: DebugIgnore<&'a dyn ExecutionTool>,
    profile: SuiteProfile,
    test_arguments: String,
    resources: AuxiliaryResources,
    runtime: Runtime,
}

impl<'a, D: Device, P: TestPackage<D>> TestRunner<'a, D, P> {
    /// Returns the profile the suite was classified into.
    pub fn profile(&self) -> &SuiteProfile {
        &self.profile
    }

    /// Returns the auxiliary resources managed by this runner.
    pub fn resources(&self) -> &AuxiliaryResources {
        &self.resources
    }

    /// Installs the test binary on the device.
    pub fn install_test_package(&self) -> Result<(), DeviceError> {
        debug!(device = %self.device, suite = self.package.suite_name(), "installing test package");
        self.package.install(self.device)
    }

    /// Sets up auxiliary resources for the suite. Must be called at most once.
    pub fn set_up(&mut self) -> Result<(), SetUpError> {
        self.resources.set_up(self.device, *self.tool)
    }

    /// Releases auxiliary resources and clears application state.
    ///
    /// Does nothing if [`Self::set_up`] was never called.
    pub fn tear_down(&mut self) -> Result<(), ErrorList<TearDownStepError>> {
        self.resources
            .tear_down(self.device, self.package, *self.tool)
    }

    /// Runs the tests in `test_spec`, a colon-separated list of fully-qualified test names.
    ///
    /// Tests that were requested but never observed in the output are reported as
    /// [`Unknown`](crate::test_result::ResultType::Unknown). An empty spec is a no-op that
    /// doesn't touch the device.
    ///
    /// Returns an error if the device is lost or a device operation fails. Mock servers are reset
    /// afterwards either way.
    pub fn run_one(&mut self, test_spec: &str) -> Result<RunOutcome, RunTestError> {
        let requested = parse_test_spec(test_spec);
        if requested.is_empty() {
            debug!("empty test spec, nothing to run");
            return Ok(RunOutcome::default());
        }

        let suite = self.package.suite_name();
        info!(suite, test_count = requested.len(), "starting test run");
        let start = stopwatch();

        let ParsedTranscript {
            mut results,
            termination,
            exit_code,
        } = {
            let _reset = self.resources.reset_on_drop();

            self.package
                .clear_application_state(self.device)
                .map_err(|error| RunTestError::device("clear application state", error))?;
            self.package
                .create_command_line_file(self.device, test_spec, &self.test_arguments)
                .map_err(|error| RunTestError::device("create command line file", error))?;
            let mut stream = self
                .package
                .spawn_test_process(self.device)
                .map_err(|error| RunTestError::device("spawn test process", error))?;

            let parser =
                TranscriptParser::new(self.device, self.package, self.profile.effective_timeout);
            self.runtime.block_on(parser.parse(&mut stream))?
        };

        let unknown = results.add_unknown(requested.iter().copied());
        let retry = results.retry_spec();

        let snapshot = start.snapshot();
        info!(
            suite,
            %termination,
            ?exit_code,
            unknown,
            counts = %results.counts(),
            end_time = %snapshot.end_time(),
            elapsed = ?snapshot.duration,
            "test run finished",
        );

        Ok(RunOutcome {
            results,
            retry,
            termination: Some(termination),
            exit_code,
            start_time: Some(snapshot.start_time),
            elapsed: snapshot.duration,
        })
    }
}

/// The outcome of [`TestRunner::run_one`].
#[derive(Clone, Debug, Default)]
pub struct RunOutcome {
    /// Results for every requested test, plus any unrequested tests that were observed.
    pub results: RunResultSet,

    /// Tests that should be re-run, joined with `:`, or `None` if every test passed.
    pub retry: Option<String>,

    /// Why parsing stopped. `None` if nothing was run.
    pub termination: Option<RunTermination>,

    /// The exit code of the test process, if it could be determined.
    pub exit_code: Option<i32>,

    /// When the run started. `None` if nothing was run.
    pub start_time: Option<DateTime<Local>>,

    /// How long the run took.
    pub elapsed: Duration,
}

/// Splits a colon-separated test spec into its test names.
///
/// Empty segments are skipped and duplicates collapsed, keeping the first occurrence.
pub fn parse_test_spec(test_spec: &str) -> IndexSet<&str> {
    test_spec
        .split(':')
        .filter(|name| !name.is_empty())
        .collect()
}
