// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use gtest_runner::{
    device::{Device, ExecutionTool, MockServer, MockServerSpawner, PerfMode, TestPackage},
    errors::{DeviceError, ExpectError, MockServerError},
    transcript::{ExpectMatch, ExpectStream, ProcessStream},
};
use regex::bytes::Regex;
use std::{
    cell::{Cell, RefCell},
    fmt, io,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, ReadBuf};

/// Sends runner logs to the test harness's captured output.
pub(crate) fn init_logging() {
    // Only the first test in the process installs the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A shared log of collaborator calls, in order.
#[derive(Clone, Debug, Default)]
pub(crate) struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, call: impl Into<String>) {
        self.0.borrow_mut().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

#[derive(Debug)]
pub(crate) struct FakeDevice {
    log: CallLog,
    online: Cell<bool>,
}

impl FakeDevice {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            online: Cell::new(true),
        }
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.set(online);
    }
}

impl fmt::Display for FakeDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "emulator-5554")
    }
}

impl Device for FakeDevice {
    fn is_online(&self) -> bool {
        self.online.get()
    }

    fn set_perf_mode(&self, mode: PerfMode) -> Result<(), DeviceError> {
        self.log.push(format!("perf mode {mode}"));
        Ok(())
    }
}

/// What the fake test process does once its transcript is exhausted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum AfterTranscript {
    /// The process exits.
    Exit,

    /// The process hangs without printing anything further.
    Hang,
}

#[derive(Debug)]
pub(crate) struct FakePackage {
    suite_name: &'static str,
    log: CallLog,
    transcript: &'static str,
    after: AfterTranscript,
    exit_code: i32,
    fail_spawn: bool,
    closes: Rc<Cell<usize>>,
}

impl FakePackage {
    pub(crate) fn new(suite_name: &'static str, log: &CallLog, transcript: &'static str) -> Self {
        Self {
            suite_name,
            log: log.clone(),
            transcript,
            after: AfterTranscript::Exit,
            exit_code: 0,
            fail_spawn: false,
            closes: Rc::default(),
        }
    }

    pub(crate) fn with_after(mut self, after: AfterTranscript) -> Self {
        self.after = after;
        self
    }

    pub(crate) fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub(crate) fn with_failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    /// The number of times a spawned stream was closed.
    pub(crate) fn close_count(&self) -> usize {
        self.closes.get()
    }
}

impl TestPackage<FakeDevice> for FakePackage {
    type Stream = CountingStream;

    fn suite_name(&self) -> &str {
        self.suite_name
    }

    fn install(&self, _device: &FakeDevice) -> Result<(), DeviceError> {
        self.log.push("install");
        Ok(())
    }

    fn clear_application_state(&self, _device: &FakeDevice) -> Result<(), DeviceError> {
        self.log.push("clear application state");
        Ok(())
    }

    fn create_command_line_file(
        &self,
        _device: &FakeDevice,
        test_filter: &str,
        extra_args: &str,
    ) -> Result<(), DeviceError> {
        self.log
            .push(format!("command line {test_filter} [{extra_args}]"));
        Ok(())
    }

    fn spawn_test_process(&self, device: &FakeDevice) -> Result<Self::Stream, DeviceError> {
        self.log.push("spawn");
        if self.fail_spawn {
            return Err(DeviceError::command_failed(
                device,
                "am instrument",
                "activity not found",
            ));
        }
        Ok(CountingStream {
            inner: ExpectStream::new(ScriptedOutput {
                remaining: self.transcript.as_bytes(),
                after: self.after,
            }),
            closes: self.closes.clone(),
        })
    }

    fn exit_code(&self, _device: &FakeDevice) -> Result<i32, DeviceError> {
        self.log.push("exit code");
        Ok(self.exit_code)
    }
}

/// Output of a fake test process: a fixed transcript, then either EOF or silence.
#[derive(Debug)]
pub(crate) struct ScriptedOutput {
    remaining: &'static [u8],
    after: AfterTranscript,
}

impl AsyncRead for ScriptedOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining.is_empty() {
            return match self.after {
                AfterTranscript::Exit => Poll::Ready(Ok(())),
                // Never woken: the caller's timeout fires instead.
                AfterTranscript::Hang => Poll::Pending,
            };
        }

        // Hand out a line at a time, so markers are split across reads.
        let remaining = self.remaining;
        let len = remaining
            .iter()
            .position(|&b| b == b'\n')
            .map_or(remaining.len(), |pos| pos + 1)
            .min(buf.remaining());
        let (chunk, rest) = remaining.split_at(len);
        buf.put_slice(chunk);
        self.remaining = rest;
        Poll::Ready(Ok(()))
    }
}

/// Wraps an [`ExpectStream`] and counts how often the stream is closed.
#[derive(Debug)]
pub(crate) struct CountingStream {
    inner: ExpectStream<ScriptedOutput>,
    closes: Rc<Cell<usize>>,
}

impl ProcessStream for CountingStream {
    async fn expect_next(
        &mut self,
        patterns: &[Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, ExpectError> {
        self.inner.expect_next(patterns, timeout).await
    }

    fn before(&self) -> &str {
        self.inner.before()
    }

    fn after(&self) -> &str {
        self.inner.after()
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
        self.inner.close();
    }
}

#[derive(Debug)]
pub(crate) struct FakeServer {
    port: u16,
    log: CallLog,
}

impl MockServer for FakeServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn set_up(&mut self) -> Result<(), MockServerError> {
        self.log.push("server set up");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), MockServerError> {
        self.log.push("server reset");
        Ok(())
    }

    fn tear_down(&mut self) -> Result<(), MockServerError> {
        self.log.push("server tear down");
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FakeSpawner {
    log: CallLog,
}

impl FakeSpawner {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self { log: log.clone() }
    }
}

impl MockServerSpawner for FakeSpawner {
    fn spawn(&self, port: u16) -> Box<dyn MockServer> {
        Box::new(FakeServer {
            port,
            log: self.log.clone(),
        })
    }
}

/// An execution tool that slows tests down and records its hooks.
#[derive(Debug)]
pub(crate) struct FakeTool {
    log: CallLog,
    scale: f64,
}

impl FakeTool {
    pub(crate) fn new(log: &CallLog, scale: f64) -> Self {
        Self {
            log: log.clone(),
            scale,
        }
    }
}

impl ExecutionTool for FakeTool {
    fn timeout_scale(&self) -> f64 {
        self.scale
    }

    fn setup_environment(&self) -> Result<(), DeviceError> {
        self.log.push("tool set up");
        Ok(())
    }

    fn clean_up_environment(&self) -> Result<(), DeviceError> {
        self.log.push("tool clean up");
        Ok(())
    }
}
