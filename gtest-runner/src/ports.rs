// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::PortAllocationError;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

/// Allocates a free loopback port for a mock test server.
///
/// The port is found by binding to port 0 and letting the OS pick; the listener is then dropped so
/// the server can bind to it.
pub(crate) fn allocate_test_server_port() -> Result<u16, PortAllocationError> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(PortAllocationError::new)?;
    let port = listener
        .local_addr()
        .map_err(PortAllocationError::new)?
        .port();
    debug!(port, "allocated mock test server port");
    Ok(port)
}
