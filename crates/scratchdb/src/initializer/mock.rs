// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock initializer for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{Initializer, InitializerError, Result};
use crate::registry::Credentials;

/// One recorded initializer run.
#[derive(Debug, Clone)]
pub struct InitRun {
    /// Endpoint the run targeted.
    pub endpoint: Credentials,
    /// Content that was passed in.
    pub content: Option<String>,
}

/// Mock initializer for testing.
#[derive(Clone, Default)]
pub struct MockInitializer {
    runs: Arc<Mutex<Vec<InitRun>>>,
    delay: Duration,
    fail_all: bool,
    fail_ports: HashSet<u16>,
}

impl MockInitializer {
    /// Create a mock initializer that always succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock initializer that always fails.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Simulate slow bootstrap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make runs against this port fail.
    pub fn fail_on(mut self, port: u16) -> Self {
        self.fail_ports.insert(port);
        self
    }

    /// Every run so far, in call order.
    pub async fn runs(&self) -> Vec<InitRun> {
        self.runs.lock().await.clone()
    }
}

#[async_trait]
impl Initializer for MockInitializer {
    fn initializer_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, endpoint: &Credentials, init_content: Option<&str>) -> Result<()> {
        self.runs.lock().await.push(InitRun {
            endpoint: endpoint.clone(),
            content: init_content.map(str::to_string),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_all || self.fail_ports.contains(&endpoint.port) {
            return Err(InitializerError::Other(format!(
                "mock bootstrap failure on port {}",
                endpoint.port
            )));
        }
        Ok(())
    }
}
