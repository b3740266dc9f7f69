// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Runs gtest binaries on an attached device and turns their console transcript into structured
//! results.
//!
//! The basic flow is:
//!
//! 1. [`SuiteProfile::classify`](suite_policy::SuiteProfile::classify) classifies the suite by
//!    name.
//! 2. A [`TestRunner`](runner::TestRunner) is built for a device, a test package and an execution
//!    tool. Auxiliary resources (mock test servers, performance mode) are set up once per suite.
//! 3. Each call to [`TestRunner::run_one`](runner::TestRunner::run_one) spawns the test binary,
//!    feeds its output into the [`TranscriptParser`](transcript::TranscriptParser), and reconciles
//!    the observed results against the requested tests to compute a retry list.
//!
//! Device control itself (connectivity, installation, process spawning) is provided by the caller
//! through the traits in [`device`].

pub mod config;
pub mod device;
pub mod errors;
mod ports;
pub mod resources;
pub mod runner;
pub mod suite_policy;
pub mod test_result;
mod time;
pub mod transcript;
