// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request, response and report types of the lifecycle manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::registry::InstanceRecord;

/// A request for a new instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Root password seed. Blank or missing means one is generated.
    #[serde(default, alias = "mysql_root_password")]
    pub root_password: Option<String>,
    /// Bootstrap SQL run once the server accepts connections.
    #[serde(default)]
    pub init_sql: Option<String>,
}

/// Admission state of the manager as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// Taking new requests.
    Accepting,
    /// Shutdown in progress; new work is refused.
    Draining,
    /// Shutdown finished.
    Stopped,
}

/// Settings the lifecycle manager runs with.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// First pool port (inclusive).
    pub port_min: u16,
    /// Last pool port (inclusive).
    pub port_max: u16,
    /// Configured ceiling; capped by the pool size at construction.
    pub max_instances: usize,
    /// How long a request may wait in the queue.
    pub admission_timeout: Duration,
    /// Maximum queue depth.
    pub queue_max_depth: usize,
    /// Host returned in credentials.
    pub advertised_host: String,
    /// Database user returned in credentials.
    pub username: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for LifecycleConfig {
    fn from(config: &Config) -> Self {
        Self {
            port_min: config.port_min,
            port_max: config.port_max,
            max_instances: config.max_instances,
            admission_timeout: config.admission_timeout,
            queue_max_depth: config.admission_queue_max_depth,
            advertised_host: config.advertised_host.clone(),
            username: "root".to_string(),
        }
    }
}

/// Warning attached to a stop whose container teardown failed.
///
/// The port has been reclaimed regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialStopFailure {
    /// Group the driver failed to stop, if one was recorded.
    pub container_group_id: Option<String>,
    /// Driver failure description.
    pub message: String,
}

/// Acknowledgement of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    /// Port that was released.
    pub port: u16,
    /// Set when the container group could not be stopped cleanly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<PartialStopFailure>,
}

/// An instance shutdown could not stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStop {
    /// Port of the instance.
    pub port: u16,
    /// Group the driver failed to stop, if one was recorded.
    pub container_group_id: Option<String>,
    /// What went wrong.
    pub error: String,
}

/// Outcome of [`LifecycleManager::shutdown`](super::LifecycleManager::shutdown).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Ports whose instances stopped cleanly.
    pub stopped: Vec<u16>,
    /// Instances whose teardown failed or could not be attempted.
    pub failed: Vec<FailedStop>,
    /// Queued requests cancelled with `ShuttingDown`.
    pub cancelled_requests: usize,
}

impl DrainReport {
    /// Whether every instance stopped cleanly.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    /// Admission state.
    pub state: ManagerState,
    /// Every registered instance, ordered by port.
    pub instances: Vec<InstanceRecord>,
    /// Requests waiting for capacity.
    pub waiting_queue_size: usize,
    /// Ports currently free.
    pub free_ports: usize,
    /// Enforced ceiling.
    pub max_instances: usize,
}
