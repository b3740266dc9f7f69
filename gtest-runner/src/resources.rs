// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auxiliary resources that must be active while a suite runs: mock test servers and the device's
//! performance mode.
//!
//! The lifecycle is:
//!
//! ```text
//! Uninitialized --set_up--> SetUp --(reset)*--> --tear_down--> TornDown
//! ```
//!
//! Tearing down resources that were never set up does nothing.

use crate::{
    device::{Device, ExecutionTool, MockServer, PerfMode, TestPackage},
    errors::{ErrorList, SetUpError, TearDownStepError},
    suite_policy::SuiteProfile,
};
use debug_ignore::DebugIgnore;
use tracing::{debug, warn};

/// The lifecycle state of [`AuxiliaryResources`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResourceState {
    /// `set_up` hasn't been called yet.
    Uninitialized,

    /// Resources are active.
    SetUp,

    /// Resources have been released.
    TornDown,
}

/// Mock test servers and performance mode for a single suite.
#[derive(Debug)]
pub struct AuxiliaryResources {
    state: ResourceState,
    servers: DebugIgnore<Vec<Box<dyn MockServer>>>,
    high_perf_mode: bool,
}

impl AuxiliaryResources {
    /// Creates a new set of resources for a suite.
    ///
    /// `servers` should be empty unless the profile requires a mock server.
    pub fn new(profile: &SuiteProfile, servers: Vec<Box<dyn MockServer>>) -> Self {
        Self {
            state: ResourceState::Uninitialized,
            servers: DebugIgnore(servers),
            high_perf_mode: profile.requires_high_perf_mode,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Returns the ports the mock servers are bound to.
    pub fn server_ports(&self) -> Vec<u16> {
        self.servers.iter().map(|server| server.port()).collect()
    }

    /// Starts mock servers, engages high-performance mode if needed, and prepares the tool
    /// environment.
    pub fn set_up<D: Device>(
        &mut self,
        device: &D,
        tool: &dyn ExecutionTool,
    ) -> Result<(), SetUpError> {
        match self.state {
            ResourceState::Uninitialized => {}
            ResourceState::SetUp => return Err(SetUpError::AlreadySetUp),
            ResourceState::TornDown => return Err(SetUpError::AlreadyTornDown),
        }
        // Even a partially successful set-up needs to be torn down.
        self.state = ResourceState::SetUp;

        for server in self.servers.iter_mut() {
            debug!(port = server.port(), "setting up mock test server");
            server.set_up().map_err(SetUpError::MockServer)?;
        }
        if self.high_perf_mode {
            debug!(%device, "engaging high performance mode");
            device
                .set_perf_mode(PerfMode::High)
                .map_err(|error| SetUpError::Device {
                    step: "engage high performance mode",
                    error,
                })?;
        }
        tool.setup_environment()
            .map_err(|error| SetUpError::Device {
                step: "set up tool environment",
                error,
            })?;

        Ok(())
    }

    /// Returns mock servers to a clean state between runs.
    ///
    /// Failures are logged rather than returned, since a reset happens after results for a run are
    /// already in hand.
    pub fn reset(&mut self) {
        for server in self.servers.iter_mut() {
            if let Err(error) = server.reset() {
                warn!(%error, port = server.port(), "failed to reset mock test server");
            }
        }
    }

    /// Returns a guard that calls [`Self::reset`] when dropped.
    pub fn reset_on_drop(&mut self) -> ResetGuard<'_> {
        ResetGuard { resources: self }
    }

    /// Releases everything acquired by [`Self::set_up`] and clears application state.
    ///
    /// Every step is attempted even if earlier steps fail. Does nothing unless resources are
    /// currently set up.
    pub fn tear_down<D: Device, P: TestPackage<D>>(
        &mut self,
        device: &D,
        package: &P,
        tool: &dyn ExecutionTool,
    ) -> Result<(), ErrorList<TearDownStepError>> {
        if self.state != ResourceState::SetUp {
            debug!(state = ?self.state, "skipping tear-down");
            return Ok(());
        }
        self.state = ResourceState::TornDown;

        let mut errors = Vec::new();
        for server in self.servers.iter_mut() {
            debug!(port = server.port(), "tearing down mock test server");
            if let Err(error) = server.tear_down() {
                errors.push(TearDownStepError::MockServer(error));
            }
        }
        if self.high_perf_mode {
            debug!(%device, "restoring default performance mode");
            if let Err(error) = device.set_perf_mode(PerfMode::Default) {
                errors.push(TearDownStepError::Device {
                    step: "restore default performance mode",
                    error,
                });
            }
        }
        if let Err(error) = package.clear_application_state(device) {
            errors.push(TearDownStepError::Device {
                step: "clear application state",
                error,
            });
        }
        if let Err(error) = tool.clean_up_environment() {
            errors.push(TearDownStepError::Device {
                step: "clean up tool environment",
                error,
            });
        }

        match ErrorList::new("while tearing down auxiliary resources", errors) {
            Some(errors) => Err(errors),
            None => Ok(()),
        }
    }
}

/// Resets mock servers when dropped. Created by [`AuxiliaryResources::reset_on_drop`].
#[derive(Debug)]
pub struct ResetGuard<'a> {
    resources: &'a mut AuxiliaryResources,
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.resources.reset();
    }
}
