// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for scratchdb integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use scratchdb::driver::MockDriver;
use scratchdb::initializer::MockInitializer;
use scratchdb::lifecycle::{CreateRequest, LifecycleConfig, LifecycleManager};
use scratchdb::{Credentials, Result};

/// Lifecycle manager wired to mocks, plus handles to inspect them.
pub struct TestContext {
    pub manager: LifecycleManager,
    pub driver: MockDriver,
    pub initializer: MockInitializer,
}

impl TestContext {
    /// Manager over `port_min..=port_max` with the given ceiling.
    pub fn new(port_min: u16, port_max: u16, max_instances: usize) -> Self {
        Self::with_mocks(
            config(port_min, port_max, max_instances),
            MockDriver::new(),
            MockInitializer::new(),
        )
    }

    /// Manager with custom configuration and mocks.
    pub fn with_mocks(
        config: LifecycleConfig,
        driver: MockDriver,
        initializer: MockInitializer,
    ) -> Self {
        let manager = LifecycleManager::new(
            config,
            Arc::new(driver.clone()),
            Arc::new(initializer.clone()),
        );
        Self {
            manager,
            driver,
            initializer,
        }
    }

    /// Issue a create request in the background.
    pub fn spawn_create(&self) -> tokio::task::JoinHandle<Result<Credentials>> {
        let manager = self.manager.clone();
        tokio::spawn(async move { manager.create_instance(CreateRequest::default()).await })
    }

    /// Create an instance with default settings.
    pub async fn create(&self) -> Result<Credentials> {
        self.manager.create_instance(CreateRequest::default()).await
    }
}

/// Lifecycle configuration with a short admission timeout.
pub fn config(port_min: u16, port_max: u16, max_instances: usize) -> LifecycleConfig {
    LifecycleConfig {
        port_min,
        port_max,
        max_instances,
        admission_timeout: Duration::from_secs(30),
        queue_max_depth: 16,
        ..LifecycleConfig::default()
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
