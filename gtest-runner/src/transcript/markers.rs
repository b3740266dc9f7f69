// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::RunTestError;
use regex::bytes::Regex;
use std::{fmt, sync::LazyLock, time::Duration};

/// A marker line written by the gtest console reporter.
///
/// Every marker is anchored at the start of a line, and may be terminated by any number of `\r`
/// characters followed by `\n`: output forwarded from a device through a pseudo-terminal commonly
/// ends lines with `\r\r\n`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Marker {
    /// `[ RUN      ] <name>`: a test started.
    TestStart,

    /// `[       OK ] <name> (<N> ms)`: a test passed.
    TestOk,

    /// `[  FAILED  ] <name> (<N> ms)`: a test failed.
    TestFail,

    /// `[ CRASHED      ]`: the crash handler installed by the test launcher fired.
    TestCrash,

    /// `[  PASSED  ] <summary>`: the run finished.
    RunPassed,

    /// `[ RUNNER_FAILED ] <summary>`: the test launcher itself failed.
    RunFailed,
}

impl Marker {
    /// Markers waited for between tests, in priority order.
    pub const RUNNING: [Marker; 3] = [Marker::TestStart, Marker::RunPassed, Marker::RunFailed];

    /// Markers waited for while a test is running, in priority order.
    pub const IN_TEST: [Marker; 3] = [Marker::TestOk, Marker::TestFail, Marker::TestCrash];

    /// Returns the regular expression for this marker.
    ///
    /// Group 1 is the test name (or trailing text), and for [`Self::TestOk`] and
    /// [`Self::TestFail`], group 2 is the reported duration in milliseconds, if any.
    pub fn pattern(self) -> &'static str {
        // (?-u) lets `.` match arbitrary bytes, since device output isn't guaranteed to be UTF-8.
        match self {
            Marker::TestStart => r"(?m-u)^\[ RUN      \] ?(.*?)\r*\n",
            Marker::TestOk => r"(?m-u)^\[       OK \] ?(.*?)(?: \(([0-9]+) ms\))?\r*\n",
            Marker::TestFail => r"(?m-u)^\[  FAILED  \] ?(.*?)(?: \(([0-9]+) ms\))?\r*\n",
            Marker::TestCrash => r"(?m-u)^\[ CRASHED      \](.*?)\r*\n",
            Marker::RunPassed => r"(?m-u)^\[  PASSED  \] ?(.*?)\r*\n",
            Marker::RunFailed => r"(?m-u)^\[ RUNNER_FAILED \] ?(.*?)\r*\n",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Marker::TestStart => write!(f, "RUN"),
            Marker::TestOk => write!(f, "OK"),
            Marker::TestFail => write!(f, "FAILED"),
            Marker::TestCrash => write!(f, "CRASHED"),
            Marker::RunPassed => write!(f, "PASSED"),
            Marker::RunFailed => write!(f, "RUNNER_FAILED"),
        }
    }
}

pub(super) static RUNNING_PATTERNS: LazyLock<[Regex; 3]> =
    LazyLock::new(|| compile(Marker::RUNNING));

pub(super) static IN_TEST_PATTERNS: LazyLock<[Regex; 3]> =
    LazyLock::new(|| compile(Marker::IN_TEST));

fn compile(markers: [Marker; 3]) -> [Regex; 3] {
    markers.map(|marker| Regex::new(marker.pattern()).expect("marker patterns are valid"))
}

/// Returns the marker a stream reported for `index` within `markers`.
pub(super) fn marker_at(markers: &[Marker; 3], index: usize) -> Result<Marker, RunTestError> {
    markers
        .get(index)
        .copied()
        .ok_or(RunTestError::InvalidPatternIndex {
            index,
            pattern_count: markers.len(),
        })
}

/// Strips carriage returns left over from line endings.
pub(super) fn strip_cr(text: &str) -> String {
    text.replace('\r', "")
}

/// Parses a duration group. A missing or unparseable value means no duration was reported.
pub(super) fn parse_duration(millis: Option<&str>) -> Duration {
    millis
        .and_then(|millis| millis.parse::<u64>().ok())
        .map_or(Duration::ZERO, Duration::from_millis)
}
