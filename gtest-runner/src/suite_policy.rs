// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-suite behavior derived from the suite name.

use std::time::Duration;
use tracing::debug;

/// Suites whose tests talk to a local test server over the network.
pub const MOCK_SERVER_SUITES: &[&str] = &[
    "unit_tests",
    "net_unittests",
    "content_unittests",
    "content_browsertests",
];

/// Suites with this substring in their name are benchmarks, and need a stable CPU frequency.
pub const PERF_SUITE_MARKER: &str = "perftests";

/// The timeout used when the base timeout is zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Factor applied to the timeout on CI machines, which tend to be slow virtual machines.
pub const CI_TIMEOUT_MULTIPLIER: u32 = 2;

// Set on Chromium build bots.
const BUILDBOT_ENV: &str = "BUILDBOT_SLAVENAME";

/// Behavior flags and the effective per-marker timeout for a suite.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SuiteProfile {
    /// Whether mock test servers must be running for this suite.
    pub requires_mock_server: bool,

    /// Whether the device must be in high-performance mode for this suite.
    pub requires_high_perf_mode: bool,

    /// How long to wait for each marker before declaring a timeout.
    pub effective_timeout: Duration,
}

impl SuiteProfile {
    /// Classifies a suite.
    ///
    /// `base_timeout` of zero means [`DEFAULT_TIMEOUT`]. The timeout is doubled under CI and then
    /// scaled by `timeout_scale`, the factor reported by the execution tool.
    pub fn classify(
        suite_name: &str,
        base_timeout: Duration,
        ci: bool,
        timeout_scale: f64,
    ) -> Self {
        let profile = Self {
            requires_mock_server: requires_mock_server(suite_name),
            requires_high_perf_mode: requires_high_perf_mode(suite_name),
            effective_timeout: effective_timeout(base_timeout, ci, timeout_scale),
        };
        debug!(suite_name, ?profile, "classified suite");
        profile
    }
}

/// Returns true if the suite needs mock test servers.
pub fn requires_mock_server(suite_name: &str) -> bool {
    MOCK_SERVER_SUITES.contains(&suite_name)
}

/// Returns true if the suite needs the device to be in high-performance mode.
pub fn requires_high_perf_mode(suite_name: &str) -> bool {
    suite_name.contains(PERF_SUITE_MARKER)
}

/// Computes the per-marker timeout.
pub fn effective_timeout(base_timeout: Duration, ci: bool, timeout_scale: f64) -> Duration {
    let mut timeout = if base_timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        base_timeout
    };
    if ci {
        timeout = timeout
            .checked_mul(CI_TIMEOUT_MULTIPLIER)
            .unwrap_or(Duration::MAX);
    }
    // A scale below 1 (or NaN) would make tests time out faster than they run natively.
    let timeout_scale = if timeout_scale >= 1.0 {
        timeout_scale
    } else {
        1.0
    };
    Duration::try_from_secs_f64(timeout.as_secs_f64() * timeout_scale).unwrap_or(Duration::MAX)
}

/// Returns true if the current process is running under continuous integration.
pub fn detect_ci() -> bool {
    std::env::var_os(BUILDBOT_ENV).is_some_and(|value| !value.is_empty()) || is_ci::uncached()
}
