// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FIFO queue of create requests waiting for capacity.
//!
//! A parked request owns the sending half of a oneshot channel; the caller
//! keeps the [`PendingHandle`] with the receiving half and is answered when
//! the lifecycle manager promotes, times out or cancels the request.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::lifecycle::CreateRequest;
use crate::registry::Credentials;

/// Errors from admission queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueueError {
    /// The queue already holds its maximum number of requests.
    #[error("admission queue is full ({max_depth} waiting)")]
    QueueFull {
        /// Configured maximum depth.
        max_depth: usize,
    },

    /// The request is no longer queued.
    #[error("request {0} is not queued")]
    NotFound(Uuid),
}

/// A create request parked until capacity frees up.
#[derive(Debug)]
pub struct PendingRequest {
    /// Unique request ID.
    pub request_id: Uuid,
    /// What the caller asked for.
    pub request: CreateRequest,
    /// When the request joined the queue.
    pub enqueued_at: Instant,
    /// Where the outcome is delivered.
    pub result_tx: oneshot::Sender<Result<Credentials>>,
}

impl PendingRequest {
    /// Whether the caller stopped waiting for an answer.
    pub fn is_abandoned(&self) -> bool {
        self.result_tx.is_closed()
    }

    /// Deliver the outcome. A caller that already left is ignored.
    pub fn respond(self, outcome: Result<Credentials>) {
        let _ = self.result_tx.send(outcome);
    }
}

/// Caller-side handle of a queued request.
#[derive(Debug)]
pub struct PendingHandle {
    /// ID to cancel the request with.
    pub request_id: Uuid,
    /// When the request joined the queue.
    pub enqueued_at: Instant,
    /// Receives the outcome.
    pub receiver: oneshot::Receiver<Result<Credentials>>,
}

/// Bounded FIFO admission queue.
#[derive(Debug)]
pub struct AdmissionQueue {
    max_depth: usize,
    pending: Mutex<VecDeque<PendingRequest>>,
}

impl AdmissionQueue {
    /// Create a queue that holds at most `max_depth` requests.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a request at the tail.
    ///
    /// Requests whose caller has gone away are dropped first and do not
    /// count against the depth limit.
    pub async fn enqueue(
        &self,
        request: CreateRequest,
    ) -> std::result::Result<PendingHandle, QueueError> {
        let mut pending = self.pending.lock().await;
        pending.retain(|p| !p.is_abandoned());
        if pending.len() >= self.max_depth {
            return Err(QueueError::QueueFull {
                max_depth: self.max_depth,
            });
        }

        let (result_tx, receiver) = oneshot::channel();
        let request_id = Uuid::new_v4();
        let enqueued_at = Instant::now();
        pending.push_back(PendingRequest {
            request_id,
            request,
            enqueued_at,
            result_tx,
        });

        Ok(PendingHandle {
            request_id,
            enqueued_at,
            receiver,
        })
    }

    /// Pop the head of the queue.
    pub async fn dequeue_next(&self) -> Option<PendingRequest> {
        self.pending.lock().await.pop_front()
    }

    /// Remove a specific request wherever it sits.
    pub async fn cancel(
        &self,
        request_id: Uuid,
    ) -> std::result::Result<PendingRequest, QueueError> {
        let mut pending = self.pending.lock().await;
        let index = pending
            .iter()
            .position(|p| p.request_id == request_id)
            .ok_or(QueueError::NotFound(request_id))?;
        pending
            .remove(index)
            .ok_or(QueueError::NotFound(request_id))
    }

    /// Take every queued request, oldest first.
    pub async fn drain(&self) -> Vec<PendingRequest> {
        self.pending.lock().await.drain(..).collect()
    }

    /// Number of queued requests whose caller is still waiting.
    pub async fn len(&self) -> usize {
        self.pending
            .lock()
            .await
            .iter()
            .filter(|p| !p.is_abandoned())
            .count()
    }

    /// Whether nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
