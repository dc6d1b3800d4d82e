// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Driver trait definitions.
//!
//! Defines the abstract interface for container group drivers.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from driver operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The container runtime exited with a non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    CommandFailed {
        /// Exit code from the process (-1 when killed by a signal).
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// No container group with this ID is known to the driver.
    #[error("Unknown container group: {0}")]
    UnknownGroup(String),

    /// The group descriptor could not be rendered.
    #[error("Failed to render group descriptor: {0}")]
    Render(#[from] serde_yaml::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// What the driver needs to bring one instance up.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// Host port the database is published on.
    pub port: u16,
    /// Root password the database is initialized with.
    pub root_password: String,
}

/// Trait for container group drivers.
///
/// Drivers are PURE execution engines - they know nothing about port pools,
/// queues or the registry. Bookkeeping is handled by the caller.
#[async_trait]
pub trait ContainerGroupDriver: Send + Sync {
    /// Driver type identifier (e.g., "compose", "mock")
    fn driver_type(&self) -> &'static str;

    /// Start the container group for one instance.
    ///
    /// Returns the container group ID to pass to [`stop`](Self::stop).
    async fn start(&self, spec: &GroupSpec) -> Result<String>;

    /// Stop and remove a container group, including its volumes.
    async fn stop(&self, container_group_id: &str) -> Result<()>;
}
