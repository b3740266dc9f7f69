// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test results and the ordered result set produced by a single run.

use indexmap::{IndexMap, map::Entry};
use itertools::Itertools;
use std::{fmt, time::Duration};
use tracing::debug;

/// The outcome of a single test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum ResultType {
    /// The test reported success.
    Pass,

    /// The test reported failure.
    Fail,

    /// The test process crashed while this test was running.
    Crash,

    /// No marker was observed for this test within the timeout.
    Timeout,

    /// The test was requested but never observed in the transcript.
    Unknown,
}

impl ResultType {
    /// Returns true if the test passed.
    pub fn is_success(self) -> bool {
        match self {
            ResultType::Pass => true,
            ResultType::Fail | ResultType::Crash | ResultType::Timeout | ResultType::Unknown => {
                false
            }
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultType::Pass => f.pad("PASS"),
            ResultType::Fail => f.pad("FAIL"),
            ResultType::Crash => f.pad("CRASH"),
            ResultType::Timeout => f.pad("TIMEOUT"),
            ResultType::Unknown => f.pad("UNKNOWN"),
        }
    }
}

/// The result of a single test in a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestResult {
    name: String,
    result_type: ResultType,
    duration: Duration,
    log: String,
}

impl TestResult {
    /// Creates a new result with no duration and an empty log.
    pub fn new(name: impl Into<String>, result_type: ResultType) -> Self {
        Self {
            name: name.into(),
            result_type,
            duration: Duration::ZERO,
            log: String::new(),
        }
    }

    /// Sets the duration reported for this test.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the log captured for this test.
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// The fully-qualified test name, e.g. `FooTest.Bar`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The outcome of the test.
    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    /// The duration reported by the test binary, or zero if none was reported.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Output captured around the terminal marker for this test.
    pub fn log(&self) -> &str {
        &self.log
    }
}

/// The results of a single run, in the order they were recorded.
///
/// A set holds at most one result per test name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunResultSet {
    results: IndexMap<String, TestResult>,
}

impl RunResultSet {
    /// Creates a new, empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result to the set.
    ///
    /// Returns false, and keeps the existing result, if a result with the same name was already
    /// recorded.
    pub fn add(&mut self, result: TestResult) -> bool {
        match self.results.entry(result.name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(result);
                true
            }
            Entry::Occupied(entry) => {
                debug!(
                    test_name = %entry.key(),
                    existing = %entry.get().result_type,
                    ignored = %result.result_type,
                    "ignoring duplicate result",
                );
                false
            }
        }
    }

    /// Returns the result for the given test name.
    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.get(name)
    }

    /// Returns true if a result for the given test name was recorded.
    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    /// The number of results in the set.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the set has no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates over all results in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.results.values()
    }

    /// Iterates over results of the given type.
    pub fn of_type(&self, result_type: ResultType) -> impl Iterator<Item = &TestResult> {
        self.iter()
            .filter(move |result| result.result_type == result_type)
    }

    /// Iterates over all results that did not pass.
    pub fn not_passed(&self) -> impl Iterator<Item = &TestResult> {
        self.iter().filter(|result| !result.result_type.is_success())
    }

    /// Returns the retry spec: every test that did not pass, joined with `:` in result order.
    ///
    /// Returns `None` if every test passed.
    pub fn retry_spec(&self) -> Option<String> {
        let mut not_passed = self.not_passed().peekable();
        not_passed.peek()?;
        Some(not_passed.map(|result| result.name.as_str()).join(":"))
    }

    /// Adds an [`ResultType::Unknown`] result for every requested test that has no result yet.
    ///
    /// Names are added in the order given. Returns the number of results added.
    pub fn add_unknown<'n>(&mut self, requested: impl IntoIterator<Item = &'n str>) -> usize {
        let mut added = 0;
        for name in requested {
            if !self.contains(name) && self.add(TestResult::new(name, ResultType::Unknown)) {
                added += 1;
            }
        }
        added
    }

    /// Counts the results of each type.
    pub fn counts(&self) -> ResultCounts {
        let mut counts = ResultCounts::default();
        for result in self.iter() {
            match result.result_type {
                ResultType::Pass => counts.passed += 1,
                ResultType::Fail => counts.failed += 1,
                ResultType::Crash => counts.crashed += 1,
                ResultType::Timeout => counts.timed_out += 1,
                ResultType::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

impl<'a> IntoIterator for &'a RunResultSet {
    type Item = &'a TestResult;
    type IntoIter = indexmap::map::Values<'a, String, TestResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.values()
    }
}

/// Per-type counts for a [`RunResultSet`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultCounts {
    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that crashed.
    pub crashed: usize,

    /// The number of tests that timed out.
    pub timed_out: usize,

    /// The number of tests that were requested but never observed.
    pub unknown: usize,
}

impl fmt::Display for ResultCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} crashed, {} timed out, {} unknown",
            self.passed, self.failed, self.crashed, self.timed_out, self.unknown
        )
    }
}
