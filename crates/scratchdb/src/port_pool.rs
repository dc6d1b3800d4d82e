// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded pool of instance ports.
//!
//! Every port in `[min, max]` is in exactly one of three states: free,
//! reserved (handed out, instance not yet running) or bound (owned by a
//! running instance). Reservation takes the port from the head of the free
//! list and release appends it to the tail, so ports rotate rather than
//! being reused immediately.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from port pool operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolError {
    /// No free port is left.
    #[error("port pool exhausted")]
    Exhausted,

    /// The port lies outside the configured range.
    #[error("port {0} is outside the pool range")]
    OutOfRange(u16),

    /// The port is not currently held by anyone.
    #[error("port {0} was not reserved from this pool")]
    NotReserved(u16),
}

/// State of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Available for reservation.
    Free,
    /// Reserved for an instance that is still starting.
    Reserved,
    /// Bound to a running instance.
    Bound,
}

#[derive(Debug)]
struct PoolInner {
    free: VecDeque<u16>,
    held: HashMap<u16, PortState>,
}

/// Thread-safe pool of ports in a fixed inclusive range.
#[derive(Debug)]
pub struct PortPool {
    min: u16,
    max: u16,
    inner: Mutex<PoolInner>,
}

impl PortPool {
    /// Create a pool holding every port in `[min, max]`, all free.
    ///
    /// An inverted range yields an empty pool.
    pub fn new(min: u16, max: u16) -> Self {
        let free: VecDeque<u16> = (min..=max).collect();
        Self {
            min,
            max,
            inner: Mutex::new(PoolInner {
                held: HashMap::with_capacity(free.len()),
                free,
            }),
        }
    }

    /// Total number of ports managed by the pool.
    pub fn capacity(&self) -> usize {
        if self.min > self.max {
            0
        } else {
            usize::from(self.max - self.min) + 1
        }
    }

    /// Take one free port.
    pub async fn reserve(&self) -> Result<u16, PoolError> {
        let mut inner = self.inner.lock().await;
        let port = inner.free.pop_front().ok_or(PoolError::Exhausted)?;
        inner.held.insert(port, PortState::Reserved);
        Ok(port)
    }

    /// Promote a reserved port to bound once its instance is running.
    pub async fn bind(&self, port: u16) -> Result<(), PoolError> {
        self.check_range(port)?;
        let mut inner = self.inner.lock().await;
        match inner.held.get_mut(&port) {
            Some(state) => {
                *state = PortState::Bound;
                Ok(())
            }
            None => Err(PoolError::NotReserved(port)),
        }
    }

    /// Return a reserved or bound port to the free list.
    pub async fn release(&self, port: u16) -> Result<(), PoolError> {
        self.check_range(port)?;
        let mut inner = self.inner.lock().await;
        if inner.held.remove(&port).is_none() {
            return Err(PoolError::NotReserved(port));
        }
        inner.free.push_back(port);
        Ok(())
    }

    /// Current state of a port.
    pub async fn state_of(&self, port: u16) -> Result<PortState, PoolError> {
        self.check_range(port)?;
        let inner = self.inner.lock().await;
        Ok(inner.held.get(&port).copied().unwrap_or(PortState::Free))
    }

    /// Number of free ports.
    pub async fn available(&self) -> usize {
        self.inner.lock().await.free.len()
    }

    fn check_range(&self, port: u16) -> Result<(), PoolError> {
        if port < self.min || port > self.max {
            return Err(PoolError::OutOfRange(port));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_hands_out_every_port_once() {
        let pool = PortPool::new(3306, 3308);

        let mut seen = HashSet::new();
        for _ in 0..3 {
            assert!(seen.insert(pool.reserve().await.unwrap()));
        }

        assert_eq!(seen, HashSet::from([3306, 3307, 3308]));
        assert_eq!(pool.reserve().await, Err(PoolError::Exhausted));
    }

    #[tokio::test]
    async fn test_release_makes_port_available_again() {
        let pool = PortPool::new(3306, 3306);

        let port = pool.reserve().await.unwrap();
        assert_eq!(pool.available().await, 0);

        pool.release(port).await.unwrap();
        assert_eq!(pool.available().await, 1);
        assert_eq!(pool.reserve().await.unwrap(), port);
    }

    #[tokio::test]
    async fn test_double_release_is_rejected() {
        let pool = PortPool::new(3306, 3307);

        let port = pool.reserve().await.unwrap();
        pool.release(port).await.unwrap();

        assert_eq!(pool.release(port).await, Err(PoolError::NotReserved(port)));
        assert_eq!(pool.available().await, 2);
    }

    #[tokio::test]
    async fn test_release_of_unreserved_port_is_rejected() {
        let pool = PortPool::new(3306, 3307);

        assert_eq!(pool.release(3307).await, Err(PoolError::NotReserved(3307)));
        assert_eq!(pool.release(9999).await, Err(PoolError::OutOfRange(9999)));
    }

    #[tokio::test]
    async fn test_port_state_transitions() {
        let pool = PortPool::new(3306, 3306);

        assert_eq!(pool.state_of(3306).await.unwrap(), PortState::Free);

        let port = pool.reserve().await.unwrap();
        assert_eq!(pool.state_of(port).await.unwrap(), PortState::Reserved);

        pool.bind(port).await.unwrap();
        assert_eq!(pool.state_of(port).await.unwrap(), PortState::Bound);

        pool.release(port).await.unwrap();
        assert_eq!(pool.state_of(port).await.unwrap(), PortState::Free);
    }

    #[tokio::test]
    async fn test_bind_requires_reservation() {
        let pool = PortPool::new(3306, 3307);

        assert_eq!(pool.bind(3306).await, Err(PoolError::NotReserved(3306)));
    }

    #[tokio::test]
    async fn test_released_port_goes_to_tail() {
        let pool = PortPool::new(3306, 3308);

        let first = pool.reserve().await.unwrap();
        pool.release(first).await.unwrap();

        assert_eq!(pool.reserve().await.unwrap(), 3307);
        assert_eq!(pool.reserve().await.unwrap(), 3308);
        assert_eq!(pool.reserve().await.unwrap(), first);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(PortPool::new(3306, 3310).capacity(), 5);
        assert_eq!(PortPool::new(3306, 3306).capacity(), 1);
        assert_eq!(PortPool::new(3310, 3306).capacity(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_double_issue() {
        let pool = Arc::new(PortPool::new(10000, 10049));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.reserve().await.ok() }));
        }

        let mut granted = Vec::new();
        for handle in handles {
            if let Some(port) = handle.await.unwrap() {
                granted.push(port);
            }
        }

        let unique: HashSet<u16> = granted.iter().copied().collect();
        assert_eq!(granted.len(), 50);
        assert_eq!(unique.len(), 50);
        assert_eq!(pool.available().await, 0);
    }
}
