// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ProcessStream,
    markers::{
        IN_TEST_PATTERNS, Marker, RUNNING_PATTERNS, marker_at, parse_duration, strip_cr,
    },
};
use crate::{
    device::{Device, TestPackage},
    errors::{ExpectError, RunTestError},
    test_result::{ResultType, RunResultSet, TestResult},
};
use std::{
    fmt,
    ops::{Deref, DerefMut},
    time::Duration,
};
use tracing::{debug, error, info, warn};

/// Why the parse loop stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunTermination {
    /// The binary printed its `[  PASSED  ]` summary.
    RunPassed,

    /// The test launcher reported `[ RUNNER_FAILED ]`.
    RunnerFailed,

    /// A test crashed, ending the run.
    Crashed,

    /// The output ended without a summary line.
    StreamEnded,

    /// No marker appeared within the timeout.
    TimedOut,
}

impl fmt::Display for RunTermination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunTermination::RunPassed => write!(f, "run passed"),
            RunTermination::RunnerFailed => write!(f, "runner failed"),
            RunTermination::Crashed => write!(f, "crashed"),
            RunTermination::StreamEnded => write!(f, "end of stream"),
            RunTermination::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The output of [`TranscriptParser::parse`].
#[derive(Clone, Debug)]
pub struct ParsedTranscript {
    /// Results for every test observed in the transcript, in marker order.
    pub results: RunResultSet,

    /// Why parsing stopped.
    pub termination: RunTermination,

    /// The exit code of the test process, if it could be determined.
    pub exit_code: Option<i32>,
}

/// Converts the console output of a gtest binary into per-test results.
#[derive(Debug)]
pub struct TranscriptParser<'a, D, P> {
    device: &'a D,
    package: &'a P,
    timeout: Duration,
}

// The two states of the parse loop.
#[derive(Clone, Debug, Eq, PartialEq)]
enum ParserState {
    // Between tests.
    Running,
    // A test has printed its start marker, but not its end marker.
    InTest { pending: String },
}

impl<'a, D: Device, P: TestPackage<D>> TranscriptParser<'a, D, P> {
    /// Creates a new parser. `timeout` bounds the wait for each individual marker.
    pub fn new(device: &'a D, package: &'a P, timeout: Duration) -> Self {
        Self {
            device,
            package,
            timeout,
        }
    }

    /// Parses output from `stream` until the run ends, then closes the stream.
    ///
    /// Test failures, crashes and timeouts are reported as results. The stream is also closed if
    /// parsing fails: either the device went offline mid-run, or the stream reported a match for a
    /// pattern it wasn't given.
    pub async fn parse<S: ProcessStream>(
        &self,
        stream: &mut S,
    ) -> Result<ParsedTranscript, RunTestError> {
        let (results, termination) = {
            // The stream is closed when this guard is dropped, however the loop exits.
            let mut guard = CloseOnDrop(&mut *stream);
            self.parse_loop(&mut *guard).await?
        };

        let exit_code = self.check_exit_code(stream);
        Ok(ParsedTranscript {
            results,
            termination,
            exit_code,
        })
    }

    async fn parse_loop<S: ProcessStream>(
        &self,
        stream: &mut S,
    ) -> Result<(RunResultSet, RunTermination), RunTestError> {
        let mut results = RunResultSet::new();
        let mut state = ParserState::Running;

        let termination = loop {
            state = match state {
                ParserState::Running => {
                    let found = match stream.expect_next(&*RUNNING_PATTERNS, self.timeout).await {
                        Ok(found) => found,
                        Err(error) => {
                            break self.handle_unmatched(error, None, stream, &mut results)?;
                        }
                    };

                    match marker_at(&Marker::RUNNING, found.index())? {
                        Marker::TestStart => {
                            let name = strip_cr(found.group(1).unwrap_or_default());
                            debug!(test_name = %name, "test started");
                            ParserState::InTest { pending: name }
                        }
                        Marker::RunPassed => {
                            info!(
                                summary = found.group(1).unwrap_or_default(),
                                "test binary reported run passed",
                            );
                            break RunTermination::RunPassed;
                        }
                        Marker::RunFailed => {
                            error!(
                                summary = found.group(1).unwrap_or_default(),
                                "test launcher reported failure",
                            );
                            break RunTermination::RunnerFailed;
                        }
                        other => unreachable!("{other} is not waited for between tests"),
                    }
                }
                ParserState::InTest { pending } => {
                    let found = match stream.expect_next(&*IN_TEST_PATTERNS, self.timeout).await {
                        Ok(found) => found,
                        Err(error) => {
                            break self.handle_unmatched(
                                error,
                                Some(pending),
                                stream,
                                &mut results,
                            )?;
                        }
                    };
                    let log = strip_cr(found.before());

                    match marker_at(&Marker::IN_TEST, found.index())? {
                        Marker::TestOk => {
                            let name = strip_cr(found.group(1).unwrap_or_default());
                            if name == pending {
                                results.add(
                                    TestResult::new(pending, ResultType::Pass)
                                        .with_duration(parse_duration(found.group(2)))
                                        .with_log(log),
                                );
                            } else {
                                // Interleaved output can garble names: drop the marker rather
                                // than attribute it to the wrong test.
                                debug!(
                                    test_name = %pending,
                                    marker_name = %name,
                                    "ignoring OK marker for a different test",
                                );
                            }
                            ParserState::Running
                        }
                        Marker::TestFail => {
                            results.add(
                                TestResult::new(pending, ResultType::Fail)
                                    .with_duration(parse_duration(found.group(2)))
                                    .with_log(log),
                            );
                            ParserState::Running
                        }
                        Marker::TestCrash => {
                            error!(test_name = %pending, "test crashed");
                            results.add(TestResult::new(pending, ResultType::Crash).with_log(log));
                            break RunTermination::Crashed;
                        }
                        other => unreachable!("{other} is not waited for during a test"),
                    }
                }
            };
        };

        Ok((results, termination))
    }

    // Handles the stream ending or timing out before the next marker.
    fn handle_unmatched<S: ProcessStream>(
        &self,
        error: ExpectError,
        pending: Option<String>,
        stream: &S,
        results: &mut RunResultSet,
    ) -> Result<RunTermination, RunTestError> {
        match error {
            ExpectError::Timeout { timeout } => {
                error!(
                    "test terminated after {} second timeout",
                    timeout.as_secs_f64()
                );
                if let Some(pending) = pending {
                    results.add(
                        TestResult::new(pending, ResultType::Timeout)
                            .with_log(strip_cr(stream.before())),
                    );
                }
                Ok(RunTermination::TimedOut)
            }
            ExpectError::Eof | ExpectError::Read(_) | ExpectError::Closed => {
                if let ExpectError::Read(error) = &error {
                    warn!(%error, "error reading test output, treating as end of stream");
                }
                error!("test terminated: end of stream");

                // Either the device went away, or the binary crashed without the crash handler
                // getting a chance to print its marker.
                if !self.device.is_online() {
                    return Err(RunTestError::DeviceLost {
                        device: self.device.to_string(),
                    });
                }
                if let Some(pending) = pending {
                    results.add(
                        TestResult::new(pending, ResultType::Crash)
                            .with_log(strip_cr(stream.before())),
                    );
                }
                Ok(RunTermination::StreamEnded)
            }
        }
    }

    fn check_exit_code<S: ProcessStream>(&self, stream: &S) -> Option<i32> {
        match self.package.exit_code(self.device) {
            Ok(0) => Some(0),
            Ok(exit_code) => {
                error!(
                    exit_code,
                    before = stream.before(),
                    after = stream.after(),
                    "gtest exited with non-zero exit code",
                );
                Some(exit_code)
            }
            Err(error) => {
                warn!(%error, "failed to query gtest exit code");
                None
            }
        }
    }
}

/// Closes the wrapped stream when dropped.
struct CloseOnDrop<'s, S: ProcessStream>(&'s mut S);

impl<S: ProcessStream> Deref for CloseOnDrop<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.0
    }
}

impl<S: ProcessStream> DerefMut for CloseOnDrop<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.0
    }
}

impl<S: ProcessStream> Drop for CloseOnDrop<'_, S> {
    fn drop(&mut self) {
        self.0.close();
    }
}
