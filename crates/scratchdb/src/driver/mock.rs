// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock driver for testing.
//!
//! A driver implementation that simulates container groups without touching
//! a container runtime. Failures and latency can be injected per port.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;

#[derive(Debug, Default)]
struct MockState {
    /// Running groups: group ID -> port
    running: HashMap<String, u16>,
    start_calls: Vec<u16>,
    stop_calls: HashMap<String, usize>,
    peak_running: usize,
}

/// Mock driver for testing.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    sequence: Arc<AtomicU64>,
    delay: Duration,
    fail_all_starts: bool,
    fail_start_ports: HashSet<u16>,
    fail_stop_ports: HashSet<u16>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a mock driver where every operation succeeds immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            sequence: Arc::new(AtomicU64::new(0)),
            delay: Duration::ZERO,
            fail_all_starts: false,
            fail_start_ports: HashSet::new(),
            fail_stop_ports: HashSet::new(),
        }
    }

    /// Create a mock driver whose starts always fail.
    pub fn failing() -> Self {
        Self {
            fail_all_starts: true,
            ..Self::new()
        }
    }

    /// Simulate slow start/stop calls.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make starts on this port fail.
    pub fn fail_start_on(mut self, port: u16) -> Self {
        self.fail_start_ports.insert(port);
        self
    }

    /// Make stops of groups on this port fail.
    pub fn fail_stop_on(mut self, port: u16) -> Self {
        self.fail_stop_ports.insert(port);
        self
    }

    /// Ports of every start call, in call order.
    pub async fn start_calls(&self) -> Vec<u16> {
        self.state.lock().await.start_calls.clone()
    }

    /// How many times a group was asked to stop.
    pub async fn stop_calls(&self, container_group_id: &str) -> usize {
        self.state
            .lock()
            .await
            .stop_calls
            .get(container_group_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of stop calls across all groups.
    pub async fn total_stop_calls(&self) -> usize {
        self.state.lock().await.stop_calls.values().sum()
    }

    /// Ports of currently running groups, sorted.
    pub async fn running_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.state.lock().await.running.values().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Highest number of simultaneously running groups seen so far.
    pub async fn peak_running(&self) -> usize {
        self.state.lock().await.peak_running
    }
}

#[async_trait]
impl ContainerGroupDriver for MockDriver {
    fn driver_type(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, spec: &GroupSpec) -> Result<String> {
        self.state.lock().await.start_calls.push(spec.port);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_all_starts || self.fail_start_ports.contains(&spec.port) {
            return Err(DriverError::CommandFailed {
                exit_code: 1,
                stderr: format!("mock start failure on port {}", spec.port),
            });
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock_{}_{}", spec.port, seq);

        let mut state = self.state.lock().await;
        if state.running.values().any(|p| *p == spec.port) {
            return Err(DriverError::Other(format!(
                "port {} already published by another group",
                spec.port
            )));
        }
        state.running.insert(id.clone(), spec.port);
        state.peak_running = state.peak_running.max(state.running.len());

        Ok(id)
    }

    async fn stop(&self, container_group_id: &str) -> Result<()> {
        let port = {
            let mut state = self.state.lock().await;
            *state
                .stop_calls
                .entry(container_group_id.to_string())
                .or_insert(0) += 1;
            state.running.get(container_group_id).copied()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let port =
            port.ok_or_else(|| DriverError::UnknownGroup(container_group_id.to_string()))?;
        if self.fail_stop_ports.contains(&port) {
            return Err(DriverError::CommandFailed {
                exit_code: 1,
                stderr: format!("mock stop failure on port {}", port),
            });
        }

        self.state.lock().await.running.remove(container_group_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(port: u16) -> GroupSpec {
        GroupSpec {
            port,
            root_password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_driver_start_and_stop() {
        let driver = MockDriver::new();

        let id = driver.start(&spec(3306)).await.unwrap();
        assert_eq!(driver.running_ports().await, vec![3306]);

        driver.stop(&id).await.unwrap();
        assert!(driver.running_ports().await.is_empty());
        assert_eq!(driver.stop_calls(&id).await, 1);
    }

    #[tokio::test]
    async fn test_mock_driver_failing() {
        let driver = MockDriver::failing();

        let err = driver.start(&spec(3306)).await.unwrap_err();
        assert!(matches!(err, DriverError::CommandFailed { .. }));
        assert!(driver.running_ports().await.is_empty());
        assert_eq!(driver.start_calls().await, vec![3306]);
    }

    #[tokio::test]
    async fn test_mock_driver_per_port_failures() {
        let driver = MockDriver::new().fail_start_on(3307).fail_stop_on(3306);

        let id = driver.start(&spec(3306)).await.unwrap();
        assert!(driver.start(&spec(3307)).await.is_err());

        assert!(driver.stop(&id).await.is_err());
        // A failed stop leaves the group running
        assert_eq!(driver.running_ports().await, vec![3306]);
    }

    #[tokio::test]
    async fn test_mock_driver_unknown_group() {
        let driver = MockDriver::new();

        let err = driver.stop("mock_1_0").await.unwrap_err();
        assert!(matches!(err, DriverError::UnknownGroup(_)));
        assert_eq!(driver.stop_calls("mock_1_0").await, 1);
    }

    #[tokio::test]
    async fn test_mock_driver_rejects_double_publish() {
        let driver = MockDriver::new();

        driver.start(&spec(3306)).await.unwrap();
        assert!(driver.start(&spec(3306)).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_driver_tracks_peak() {
        let driver = MockDriver::new();

        let a = driver.start(&spec(3306)).await.unwrap();
        driver.start(&spec(3307)).await.unwrap();
        driver.stop(&a).await.unwrap();
        driver.start(&spec(3308)).await.unwrap();

        assert_eq!(driver.peak_running().await, 2);
    }
}
