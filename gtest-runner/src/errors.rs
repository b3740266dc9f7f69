// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gtest-runner.

use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error, fmt, io, time::Duration};
use thiserror::Error;

/// A boxed error returned by a collaborator implementation.
pub type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;

/// An error returned by a device-control collaborator: the device itself, the test package, or the
/// execution tool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// The device could not be reached.
    #[error("device `{device}` is unreachable")]
    Unreachable {
        /// The device identifier.
        device: String,
    },

    /// An operation on the device failed.
    #[error("`{operation}` failed on device `{device}`")]
    CommandFailed {
        /// The device identifier.
        device: String,

        /// A short description of the operation that failed.
        operation: String,

        /// The underlying error.
        #[source]
        error: BoxedError,
    },
}

impl DeviceError {
    /// Creates a new `Unreachable` error.
    pub fn unreachable(device: impl fmt::Display) -> Self {
        Self::Unreachable {
            device: device.to_string(),
        }
    }

    /// Creates a new `CommandFailed` error.
    pub fn command_failed(
        device: impl fmt::Display,
        operation: impl Into<String>,
        error: impl Into<BoxedError>,
    ) -> Self {
        Self::CommandFailed {
            device: device.to_string(),
            operation: operation.into(),
            error: error.into(),
        }
    }

    /// Returns true if this error indicates that the device is gone.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// An error returned by a mock test server hook.
#[derive(Debug, Error)]
#[error("mock test server on port {port} failed to {operation}")]
pub struct MockServerError {
    port: u16,
    operation: &'static str,
    #[source]
    error: BoxedError,
}

impl MockServerError {
    /// Creates a new `MockServerError`.
    pub fn new(port: u16, operation: &'static str, error: impl Into<BoxedError>) -> Self {
        Self {
            port,
            operation,
            error: error.into(),
        }
    }

    /// Returns the port the server was bound to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// An error that occurred while waiting for output from a test process.
#[derive(Debug, Error)]
pub enum ExpectError {
    /// The process exited and its output was fully consumed without a match.
    #[error("end of stream reached before any pattern matched")]
    Eof,

    /// No pattern matched within the timeout.
    #[error("no pattern matched within {}s", timeout.as_secs_f64())]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Reading from the process failed.
    #[error("error reading test process output")]
    Read(#[source] io::Error),

    /// The stream was already closed.
    #[error("stream was already closed")]
    Closed,
}

/// An error that occurred while running a single set of tests.
///
/// Individual test failures are not errors: they're reported as results. This error is returned
/// only when the run as a whole could not be carried out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunTestError {
    /// The device went offline in the middle of the run.
    ///
    /// This is fatal for the device: callers should stop scheduling further work on it.
    #[error("device `{device}` went offline")]
    DeviceLost {
        /// The device identifier.
        device: String,
    },

    /// A device-control operation failed.
    #[error("failed to {step} for test run")]
    Device {
        /// The step that failed.
        step: &'static str,

        /// The underlying error.
        #[source]
        error: DeviceError,
    },

    /// The test process stream reported a match for a pattern it wasn't given.
    #[error(
        "test process stream reported a match for pattern {index}, \
         but only {pattern_count} patterns were given"
    )]
    InvalidPatternIndex {
        /// The index the stream reported.
        index: usize,

        /// The number of patterns passed to the stream.
        pattern_count: usize,
    },
}

impl RunTestError {
    pub(crate) fn device(step: &'static str, error: DeviceError) -> Self {
        Self::Device { step, error }
    }

    /// Returns true if the device is no longer usable.
    pub fn is_device_lost(&self) -> bool {
        match self {
            Self::DeviceLost { .. } => true,
            Self::Device { error, .. } => error.is_unreachable(),
            Self::InvalidPatternIndex { .. } => false,
        }
    }
}

/// An error that occurred while setting up auxiliary resources for a suite.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetUpError {
    /// Set-up was called more than once.
    #[error("auxiliary resources were already set up")]
    AlreadySetUp,

    /// Set-up was called after tear-down.
    #[error("auxiliary resources were already torn down")]
    AlreadyTornDown,

    /// A mock server failed to start.
    #[error("failed to set up mock test server")]
    MockServer(#[source] MockServerError),

    /// A device operation failed.
    #[error("failed to {step}")]
    Device {
        /// The step that failed.
        step: &'static str,

        /// The underlying error.
        #[source]
        error: DeviceError,
    },
}

/// A single failed step during tear-down. Tear-down errors are collected into an [`ErrorList`].
#[derive(Debug, Error)]
pub enum TearDownStepError {
    /// A mock server failed to stop.
    #[error("failed to tear down mock test server")]
    MockServer(#[source] MockServerError),

    /// A device operation failed.
    #[error("failed to {step}")]
    Device {
        /// The step that failed.
        step: &'static str,

        /// The underlying error.
        #[source]
        error: DeviceError,
    },
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// A port for a mock test server couldn't be allocated.
    #[error(transparent)]
    PortAllocation(#[from] PortAllocationError),
}

/// An error that occurred while allocating a port for a mock test server.
#[derive(Debug, Error)]
#[error("failed to allocate a port for a mock test server")]
pub struct PortAllocationError {
    #[source]
    error: io::Error,
}

impl PortAllocationError {
    pub(crate) fn new(error: io::Error) -> Self {
        Self { error }
    }
}

/// An error that occurred while parsing the runner config.
#[derive(Debug, Error)]
#[error("failed to parse gtest-runner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Several errors from steps that are all attempted, reported together.
#[derive(Debug)]
pub struct ErrorList<T> {
    // A description of what the errors are.
    description: &'static str,
    // Invariant: this list is non-empty.
    inner: Vec<T>,
}

impl<T: error::Error> ErrorList<T> {
    pub(crate) fn new(description: &'static str, errors: Vec<T>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self {
                description,
                inner: errors,
            })
        }
    }

    /// Returns the number of errors in this list.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Always returns false, since the list is never empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the errors in this list.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }
}

impl<T: error::Error> fmt::Display for ErrorList<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // A single error displays as itself.
        if self.inner.len() == 1 {
            return write!(f, "{}", self.inner[0]);
        }

        writeln!(
            f,
            "{} errors occurred {}:",
            self.inner.len(),
            self.description,
        )?;
        write!(
            f,
            "{}",
            self.inner.iter().map(|error| format!("* {error}")).join("\n")
        )
    }
}

impl<T: error::Error + 'static> error::Error for ErrorList<T> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        if self.inner.len() == 1 {
            self.inner[0].source()
        } else {
            // Each error is listed in `Display` instead.
            None
        }
    }
}
