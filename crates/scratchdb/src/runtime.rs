// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for scratchdb.
//!
//! [`ScratchRuntime`] wires a [`LifecycleManager`] to the HTTP front end so
//! the daemon can be embedded into an existing tokio application instead of
//! running as the standalone binary.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scratchdb::driver::compose::{ComposeDriver, ComposeDriverConfig};
//! use scratchdb::initializer::{MySqlInitializer, MySqlInitializerConfig};
//! use scratchdb::runtime::ScratchRuntime;
//! use scratchdb::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!
//!     let runtime = ScratchRuntime::builder()
//!         .driver(Arc::new(ComposeDriver::new(ComposeDriverConfig::from_config(&config))))
//!         .initializer(Arc::new(MySqlInitializer::new(MySqlInitializerConfig::from_config(&config))))
//!         .config(config)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     let report = runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::driver::ContainerGroupDriver;
use crate::initializer::Initializer;
use crate::lifecycle::{DrainReport, LifecycleConfig, LifecycleManager};

/// Builder for creating a [`ScratchRuntime`].
#[derive(Default)]
pub struct ScratchRuntimeBuilder {
    config: Config,
    driver: Option<Arc<dyn ContainerGroupDriver>>,
    initializer: Option<Arc<dyn Initializer>>,
}

impl ScratchRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the daemon configuration.
    ///
    /// Default: [`Config::default()`]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the HTTP bind address, overriding the configuration.
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.config.http_addr = addr;
        self
    }

    /// Set the container group driver (required).
    pub fn driver(mut self, driver: Arc<dyn ContainerGroupDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the initializer (required).
    pub fn initializer(mut self, initializer: Arc<dyn Initializer>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing or the configuration
    /// does not validate.
    pub fn build(self) -> Result<ScratchRuntimeConfig> {
        let driver = self
            .driver
            .ok_or_else(|| anyhow::anyhow!("driver is required"))?;
        let initializer = self
            .initializer
            .ok_or_else(|| anyhow::anyhow!("initializer is required"))?;
        self.config.validate()?;

        Ok(ScratchRuntimeConfig {
            config: self.config,
            driver,
            initializer,
        })
    }
}

/// Configuration for a [`ScratchRuntime`].
pub struct ScratchRuntimeConfig {
    config: Config,
    driver: Arc<dyn ContainerGroupDriver>,
    initializer: Arc<dyn Initializer>,
}

impl ScratchRuntimeConfig {
    /// Start the runtime: create the lifecycle manager and spawn the HTTP server.
    pub async fn start(self) -> Result<ScratchRuntime> {
        let manager = LifecycleManager::new(
            LifecycleConfig::from(&self.config),
            self.driver,
            self.initializer,
        );

        let listener = TcpListener::bind(self.config.http_addr).await?;
        let http_addr = listener.local_addr()?;

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(crate::server::serve(
            listener,
            manager.clone(),
            server_shutdown_rx,
        ));

        info!(
            http_addr = %http_addr,
            port_min = self.config.port_min,
            port_max = self.config.port_max,
            max_instances = manager.max_instances(),
            "ScratchRuntime started"
        );

        Ok(ScratchRuntime {
            server_handle,
            server_shutdown_tx,
            manager,
            http_addr,
        })
    }
}

/// A running scratchdb daemon.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination; dropping the
/// runtime leaves provisioned instances running.
pub struct ScratchRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    manager: LifecycleManager,
    http_addr: SocketAddr,
}

impl ScratchRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ScratchRuntimeBuilder {
        ScratchRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// The lifecycle manager behind the HTTP server.
    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// Check if the HTTP server is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops accepting HTTP connections, drains the lifecycle manager and
    /// waits for the server to finish answering in-flight requests. Returns
    /// `None` if the manager had already been shut down by someone else.
    pub async fn shutdown(self) -> Result<Option<DrainReport>> {
        info!("ScratchRuntime shutting down...");

        // Signal server shutdown
        let _ = self.server_shutdown_tx.send(true);

        // Queued requests are answered here, which lets their connections close
        let report = match self.manager.shutdown().await {
            Some(report) => {
                for failed in &report.failed {
                    warn!(
                        port = failed.port,
                        container_group_id = failed.container_group_id.as_deref().unwrap_or("-"),
                        error = %failed.error,
                        "Instance could not be stopped cleanly"
                    );
                }
                info!(
                    stopped = ?report.stopped,
                    failed = report.failed.len(),
                    cancelled_requests = report.cancelled_requests,
                    "Drain complete"
                );
                Some(report)
            }
            None => {
                self.manager.wait_until_stopped().await;
                None
            }
        };

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("ScratchRuntime shutdown complete");
                Ok(report)
            }
            Ok(Err(e)) => {
                error!("HTTP server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("HTTP server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::initializer::MockInitializer;

    #[test]
    fn test_build_requires_driver() {
        let result = ScratchRuntime::builder()
            .initializer(Arc::new(MockInitializer::new()))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = ScratchRuntime::builder()
            .driver(Arc::new(MockDriver::new()))
            .initializer(Arc::new(MockInitializer::new()))
            .config(Config {
                port_min: 3310,
                port_max: 3306,
                ..Config::default()
            })
            .build();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let runtime = ScratchRuntime::builder()
            .driver(Arc::new(MockDriver::new()))
            .initializer(Arc::new(MockInitializer::new()))
            .http_addr("127.0.0.1:0".parse().unwrap())
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        assert!(runtime.is_running());
        assert_ne!(runtime.http_addr().port(), 0);

        let report = runtime.shutdown().await.unwrap().unwrap();
        assert!(report.is_clean());
    }
}
