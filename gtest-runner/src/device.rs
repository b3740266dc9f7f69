// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts for the device-control subsystem.
//!
//! gtest-runner doesn't talk to devices directly. Instead, callers provide implementations of the
//! traits in this module, and the runner drives them.

use crate::{
    errors::{DeviceError, MockServerError},
    transcript::ProcessStream,
};
use std::fmt;

/// A device that tests run on.
///
/// The `Display` implementation is used to identify the device in logs and errors.
pub trait Device: fmt::Display {
    /// Returns true if the device is currently reachable.
    ///
    /// This is used to tell device loss apart from the test process exiting.
    fn is_online(&self) -> bool;

    /// Switches the device's CPU performance mode.
    fn set_perf_mode(&self, mode: PerfMode) -> Result<(), DeviceError>;
}

/// A device performance mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PerfMode {
    /// Fixed, high CPU frequencies, used for benchmarking suites.
    High,

    /// The device's default scaling behavior.
    Default,
}

impl fmt::Display for PerfMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PerfMode::High => write!(f, "high"),
            PerfMode::Default => write!(f, "default"),
        }
    }
}

/// A gtest binary that can be installed on and run against a device.
pub trait TestPackage<D: Device> {
    /// The stream type returned by [`Self::spawn_test_process`].
    type Stream: ProcessStream;

    /// The name of the suite, e.g. `net_unittests`.
    fn suite_name(&self) -> &str;

    /// Installs the test binary on the device.
    fn install(&self, device: &D) -> Result<(), DeviceError>;

    /// Clears any state left behind on the device by previous runs.
    fn clear_application_state(&self, device: &D) -> Result<(), DeviceError>;

    /// Writes the command line for the next invocation to the device.
    ///
    /// `test_filter` is a colon-separated list of fully-qualified test names, and `extra_args` is
    /// passed through verbatim.
    fn create_command_line_file(
        &self,
        device: &D,
        test_filter: &str,
        extra_args: &str,
    ) -> Result<(), DeviceError>;

    /// Starts the test process and returns a stream over its console output.
    fn spawn_test_process(&self, device: &D) -> Result<Self::Stream, DeviceError>;

    /// Returns the exit code of the most recent test process.
    fn exit_code(&self, device: &D) -> Result<i32, DeviceError>;
}

/// A local network server that some suites need to be running while their tests execute.
pub trait MockServer {
    /// The port this server is bound to.
    fn port(&self) -> u16;

    /// Starts the server.
    fn set_up(&mut self) -> Result<(), MockServerError>;

    /// Returns the server to a clean state between runs, without closing its listening socket.
    fn reset(&mut self) -> Result<(), MockServerError>;

    /// Stops the server.
    fn tear_down(&mut self) -> Result<(), MockServerError>;
}

/// Constructs mock servers for suites that need them.
pub trait MockServerSpawner {
    /// Creates a new (not yet started) server bound to `port`.
    fn spawn(&self, port: u16) -> Box<dyn MockServer>;
}

/// A tool that wraps test execution, e.g. a sanitizer or instrumentation layer.
pub trait ExecutionTool {
    /// How much longer tests take to run under this tool. Always at least 1.
    fn timeout_scale(&self) -> f64;

    /// Prepares the device environment before any tests run.
    fn setup_environment(&self) -> Result<(), DeviceError>;

    /// Undoes [`Self::setup_environment`].
    fn clean_up_environment(&self) -> Result<(), DeviceError>;
}

/// An [`ExecutionTool`] that runs tests directly.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTool;

impl ExecutionTool for NoopTool {
    fn timeout_scale(&self) -> f64 {
        1.0
    }

    fn setup_environment(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn clean_up_environment(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
