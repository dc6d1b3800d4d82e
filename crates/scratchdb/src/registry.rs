// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance Registry
//!
//! In-memory table of provisioned instances keyed by port. The registry is
//! the only owner of [`InstanceRecord`]s; everything else sees clones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// A record already exists for this port.
    #[error("duplicate port: {0} is already registered")]
    DuplicatePort(u16),

    /// No record exists for this port.
    #[error("no instance registered on port {0}")]
    NotFound(u16),

    /// The record is in a state that does not allow the transition.
    #[error("instance on port {port} is {state}")]
    InvalidState {
        /// Port of the instance.
        port: u16,
        /// State the record was found in.
        state: InstanceState,
    },
}

/// Connection details handed back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Host the database is reachable on.
    pub host: String,
    /// Port the database listens on.
    pub port: u16,
    /// Database user.
    pub username: String,
    /// Database password.
    pub password: String,
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Container group and bootstrap are in progress.
    Starting,
    /// Ready for clients.
    Running,
    /// Teardown in progress.
    Stopping,
    /// Provisioning failed; rollback in progress.
    Failed,
}

impl InstanceState {
    /// Whether the instance counts against the concurrency ceiling.
    pub fn is_active(&self) -> bool {
        matches!(self, InstanceState::Starting | InstanceState::Running)
    }

    /// Status string used in logs and the HTTP API.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provisioned database instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Port owned by this instance.
    pub port: u16,
    /// Container group handle, known once the driver has started the group.
    pub container_group_id: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Credentials clients use to connect.
    pub credentials: Credentials,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Failure reason, set when the record is marked failed.
    pub error: Option<String>,
}

impl InstanceRecord {
    /// New record in the `Starting` state.
    pub fn starting(port: u16, credentials: Credentials) -> Self {
        Self {
            port,
            container_group_id: None,
            created_at: Utc::now(),
            credentials,
            state: InstanceState::Starting,
            error: None,
        }
    }
}

/// Registry of instances keyed by port.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    records: Mutex<HashMap<u16, InstanceRecord>>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. The record is stored in the `Starting` state whatever it carried.
    pub async fn insert(&self, mut record: InstanceRecord) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.port) {
            return Err(RegistryError::DuplicatePort(record.port));
        }
        record.state = InstanceState::Starting;
        records.insert(record.port, record);
        Ok(())
    }

    /// Remember the container group handle for a starting instance.
    pub async fn set_container_group(
        &self,
        port: u16,
        container_group_id: String,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&port).ok_or(RegistryError::NotFound(port))?;
        record.container_group_id = Some(container_group_id);
        Ok(())
    }

    /// Transition a starting instance to running with its final credentials.
    pub async fn mark_running(
        &self,
        port: u16,
        credentials: Credentials,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&port).ok_or(RegistryError::NotFound(port))?;
        if record.state != InstanceState::Starting {
            return Err(RegistryError::InvalidState {
                port,
                state: record.state,
            });
        }
        record.state = InstanceState::Running;
        record.credentials = credentials;
        record.error = None;
        Ok(())
    }

    /// Mark an instance as failed with a reason.
    pub async fn mark_failed(&self, port: u16, reason: &str) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&port).ok_or(RegistryError::NotFound(port))?;
        record.state = InstanceState::Failed;
        record.error = Some(reason.to_string());
        Ok(())
    }

    /// Claim a running (or failed) instance for teardown.
    ///
    /// Moves the record to `Stopping` and returns a copy. Starting instances
    /// are refused with `InvalidState`; stopping ones with `NotFound`, so two
    /// concurrent stops of the same port cannot both succeed.
    pub async fn begin_stop(&self, port: u16) -> Result<InstanceRecord, RegistryError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&port).ok_or(RegistryError::NotFound(port))?;
        match record.state {
            InstanceState::Running | InstanceState::Failed => {
                record.state = InstanceState::Stopping;
                Ok(record.clone())
            }
            InstanceState::Stopping => Err(RegistryError::NotFound(port)),
            InstanceState::Starting => Err(RegistryError::InvalidState {
                port,
                state: record.state,
            }),
        }
    }

    /// Remove and return a record.
    pub async fn remove(&self, port: u16) -> Result<InstanceRecord, RegistryError> {
        self.records
            .lock()
            .await
            .remove(&port)
            .ok_or(RegistryError::NotFound(port))
    }

    /// Look up a record.
    pub async fn get(&self, port: u16) -> Option<InstanceRecord> {
        self.records.lock().await.get(&port).cloned()
    }

    /// Snapshot of all records, ordered by port.
    pub async fn list(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<InstanceRecord> =
            self.records.lock().await.values().cloned().collect();
        records.sort_by_key(|r| r.port);
        records
    }

    /// Number of records that count against the ceiling (`Starting` or `Running`).
    pub async fn count(&self) -> usize {
        self.records
            .lock()
            .await
            .values()
            .filter(|r| r.state.is_active())
            .count()
    }

    /// Total number of records in any state.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the registry holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
