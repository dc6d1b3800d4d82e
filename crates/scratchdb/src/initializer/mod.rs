// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bootstrap execution against a freshly started instance.

pub mod mock;
pub mod mysql;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::Credentials;

pub use mock::MockInitializer;
pub use mysql::{MySqlInitializer, MySqlInitializerConfig};

/// Errors from initializer operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitializerError {
    /// The server never accepted a connection.
    #[error("server not ready after {}s: {last_error}", waited.as_secs())]
    NotReady {
        /// How long the initializer kept retrying.
        waited: Duration,
        /// Last connection error seen.
        last_error: String,
    },

    /// Executing the bootstrap content failed.
    #[error("bootstrap statement failed: {0}")]
    Statement(#[from] sqlx::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for initializer operations.
pub type Result<T> = std::result::Result<T, InitializerError>;

/// Runs caller-supplied bootstrap content against a started instance.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Initializer type identifier (e.g., "mysql", "mock")
    fn initializer_type(&self) -> &'static str;

    /// Wait for the instance to accept connections, then run `init_content`.
    ///
    /// `None` or blank content only performs the readiness wait.
    async fn run(&self, endpoint: &Credentials, init_content: Option<&str>) -> Result<()>;
}
