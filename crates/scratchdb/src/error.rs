// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for scratchdb.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the lifecycle manager and the daemon around it.
///
/// Driver and initializer failures never appear here raw: the lifecycle
/// manager folds them into [`Error::Provision`] and [`Error::Initialization`]
/// after rolling the instance back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A queued request waited longer than the admission timeout.
    #[error("No capacity became available within {}s", waited.as_secs())]
    AdmissionTimeout {
        /// How long the request waited.
        waited: Duration,
    },

    /// The admission queue is at its maximum depth.
    #[error("Admission queue is full ({max_depth} requests waiting)")]
    QueueFull {
        /// Configured maximum depth.
        max_depth: usize,
    },

    /// The container group could not be started. The port has been released.
    #[error("Failed to provision instance on port {port}: {message}")]
    Provision {
        /// Port the attempt was made on.
        port: u16,
        /// Driver failure description.
        message: String,
    },

    /// Bootstrap content failed. The instance has been torn down.
    #[error("Failed to initialize instance on port {port}: {message}")]
    Initialization {
        /// Port the attempt was made on.
        port: u16,
        /// Initializer failure description.
        message: String,
    },

    /// The daemon is draining and accepts no new work.
    #[error("Shutting down")]
    ShuttingDown,

    /// No starting or running instance holds this port.
    #[error("No instance running on port {0}")]
    InstanceNotFound(u16),

    /// The instance is still being provisioned and cannot be stopped yet.
    #[error("Instance on port {0} is still starting")]
    InstanceBusy(u16),

    /// Internal invariant violated (duplicate port, double release).
    #[error("Internal consistency fault: {0}")]
    Consistency(String),
}

impl Error {
    /// Short machine-readable kind used by the HTTP front end.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AdmissionTimeout { .. } => "admission_timeout",
            Error::QueueFull { .. } => "queue_full",
            Error::Provision { .. } => "provision_error",
            Error::Initialization { .. } => "initialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::InstanceNotFound(_) => "not_found",
            Error::InstanceBusy(_) => "busy",
            Error::Consistency(_) => "consistency_fault",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InstanceNotFound(_) => 404,
            Error::InstanceBusy(_) => 409,
            Error::QueueFull { .. } => 429,
            Error::Provision { .. } | Error::Initialization { .. } => 502,
            Error::ShuttingDown => 503,
            Error::AdmissionTimeout { .. } => 504,
            Error::Consistency(_) => 500,
        }
    }

    /// Whether the caller may simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AdmissionTimeout { .. }
                | Error::QueueFull { .. }
                | Error::Provision { .. }
                | Error::Initialization { .. }
                | Error::InstanceBusy(_)
        )
    }
}

/// Result type using scratchdb Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_errors_are_retryable() {
        assert!(
            Error::AdmissionTimeout {
                waited: Duration::from_secs(5)
            }
            .is_retryable()
        );
        assert!(Error::QueueFull { max_depth: 4 }.is_retryable());
        assert!(!Error::ShuttingDown.is_retryable());
        assert!(!Error::Consistency("double release".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InstanceNotFound(3306).status_code(), 404);
        assert_eq!(Error::InstanceBusy(3306).status_code(), 409);
        assert_eq!(Error::QueueFull { max_depth: 1 }.status_code(), 429);
        assert_eq!(Error::ShuttingDown.status_code(), 503);
        assert_eq!(
            Error::Provision {
                port: 3306,
                message: "exit 1".into()
            }
            .status_code(),
            502
        );
    }

    #[test]
    fn test_display_includes_port() {
        let err = Error::Initialization {
            port: 3307,
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3307"));
        assert!(msg.contains("syntax error"));
        assert_eq!(err.kind(), "initialization_error");
    }

    #[test]
    fn test_admission_timeout_display() {
        let err = Error::AdmissionTimeout {
            waited: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }
}
