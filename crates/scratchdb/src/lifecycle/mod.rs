// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle manager.
//!
//! Owns the port pool, the instance registry and the admission queue, and
//! drives instances through:
//!
//! ```text
//! create ──► Starting ──► Running ──► Stopping ──► (removed)
//!               │
//!               └──► Failed ──► (rolled back, port released)
//! ```
//!
//! Admission decisions, promotions, stop claims and the shutdown transition
//! all run under one admission gate, so the ceiling check and the port
//! reservation it guards can never interleave. Locks are always taken in the
//! order gate, port pool, registry, queue, and none is held across a driver
//! or initializer call.
//!
//! Provisioning and teardown run as tracked tasks: a caller that goes away
//! mid-request cannot leave an instance half-built, and shutdown waits for
//! every one of them before stopping what is left.

mod types;

pub use types::*;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionQueue, PendingHandle, PendingRequest, QueueError};
use crate::driver::{ContainerGroupDriver, GroupSpec};
use crate::error::{Error, Result};
use crate::initializer::Initializer;
use crate::port_pool::PortPool;
use crate::registry::{Credentials, InstanceRecord, InstanceRegistry, RegistryError};

/// Length of generated root passwords.
const GENERATED_PASSWORD_LEN: usize = 24;

type Outcome = oneshot::Sender<Result<Credentials>>;

/// How a create request was admitted.
enum Admission {
    /// Capacity was free; provisioning already runs.
    Provisioning(oneshot::Receiver<Result<Credentials>>),
    /// Parked in the queue.
    Waiting(PendingHandle),
}

struct Inner {
    config: LifecycleConfig,
    max_instances: usize,
    ports: PortPool,
    registry: InstanceRegistry,
    queue: AdmissionQueue,
    admission_gate: Mutex<()>,
    state: watch::Sender<ManagerState>,
    driver: Arc<dyn ContainerGroupDriver>,
    initializer: Arc<dyn Initializer>,
    tasks: TaskTracker,
}

/// Lifecycle manager. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    /// Create a manager. The ceiling is capped by the number of pool ports.
    pub fn new(
        config: LifecycleConfig,
        driver: Arc<dyn ContainerGroupDriver>,
        initializer: Arc<dyn Initializer>,
    ) -> Self {
        let ports = PortPool::new(config.port_min, config.port_max);
        let max_instances = config.max_instances.min(ports.capacity());
        if max_instances < config.max_instances {
            warn!(
                configured = config.max_instances,
                effective = max_instances,
                "max_instances exceeds port pool size, capping"
            );
        }

        let (state, _) = watch::channel(ManagerState::Accepting);

        info!(
            port_min = config.port_min,
            port_max = config.port_max,
            max_instances,
            queue_max_depth = config.queue_max_depth,
            driver = driver.driver_type(),
            initializer = initializer.initializer_type(),
            "Lifecycle manager ready"
        );

        Self {
            inner: Arc::new(Inner {
                queue: AdmissionQueue::new(config.queue_max_depth),
                config,
                max_instances,
                ports,
                registry: InstanceRegistry::new(),
                admission_gate: Mutex::new(()),
                state,
                driver,
                initializer,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Current admission state.
    pub fn state(&self) -> ManagerState {
        *self.inner.state.borrow()
    }

    /// Enforced instance ceiling.
    pub fn max_instances(&self) -> usize {
        self.inner.max_instances
    }

    /// Provision a new instance and return its credentials.
    ///
    /// Runs immediately when capacity is free and nobody is queued ahead,
    /// otherwise waits in FIFO order for up to the admission timeout.
    pub async fn create_instance(&self, request: CreateRequest) -> Result<Credentials> {
        match self.admit(request).await? {
            Admission::Provisioning(receiver) => flatten(receiver.await),
            Admission::Waiting(handle) => self.await_promotion(handle).await,
        }
    }

    /// Stop a running (or failed) instance and reclaim its port.
    ///
    /// The port is released even if the container group refuses to stop; the
    /// acknowledgement then carries a warning.
    pub async fn stop_instance(&self, port: u16) -> Result<StopAck> {
        let teardown = {
            let _gate = self.inner.admission_gate.lock().await;
            if self.state() != ManagerState::Accepting {
                return Err(Error::ShuttingDown);
            }

            let record = self
                .inner
                .registry
                .begin_stop(port)
                .await
                .map_err(|e| match e {
                    RegistryError::NotFound(port) => Error::InstanceNotFound(port),
                    RegistryError::InvalidState { port, .. } => Error::InstanceBusy(port),
                    other => Error::Consistency(other.to_string()),
                })?;

            info!(
                port,
                container_group_id = record.container_group_id.as_deref().unwrap_or("-"),
                "Stopping instance"
            );

            // Promotion runs in the task, not in the caller
            let manager = self.clone();
            self.inner.tasks.spawn(async move {
                let warning = manager.teardown(record).await;
                manager.promote().await;
                warning
            })
        };

        let warning = teardown
            .await
            .map_err(|e| Error::Consistency(format!("teardown of port {} panicked: {}", port, e)))?;

        Ok(StopAck { port, warning })
    }

    /// Every instance plus queue depth.
    pub async fn list(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            state: self.state(),
            instances: self.inner.registry.list().await,
            waiting_queue_size: self.inner.queue.len().await,
            free_ports: self.inner.ports.available().await,
            max_instances: self.inner.max_instances,
        }
    }

    /// Record of the instance on a port.
    pub async fn status(&self, port: u16) -> Result<InstanceRecord> {
        self.inner
            .registry
            .get(port)
            .await
            .ok_or(Error::InstanceNotFound(port))
    }

    /// Drain the manager: refuse new work, cancel queued requests, wait for
    /// in-flight provisioning, then stop every instance.
    ///
    /// Only the first caller gets the report; later or concurrent callers get
    /// `None` straight away. Use [`LifecycleManager::wait_until_stopped`] to
    /// wait for completion instead.
    pub async fn shutdown(&self) -> Option<DrainReport> {
        let cancelled_requests = {
            let _gate = self.inner.admission_gate.lock().await;
            let claimed = self.inner.state.send_if_modified(|state| {
                if *state == ManagerState::Accepting {
                    *state = ManagerState::Draining;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                debug!("Shutdown already in progress");
                return None;
            }

            let pending = self.inner.queue.drain().await;
            let cancelled = pending.len();
            for request in pending {
                request.respond(Err(Error::ShuttingDown));
            }
            cancelled
        };

        info!(
            cancelled_requests,
            in_flight = self.inner.tasks.len(),
            "Draining lifecycle manager"
        );

        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        let mut report = DrainReport {
            cancelled_requests,
            ..DrainReport::default()
        };

        let mut stops = JoinSet::new();
        for record in self.inner.registry.list().await {
            match self.inner.registry.begin_stop(record.port).await {
                Ok(claimed) => {
                    let manager = self.clone();
                    stops.spawn(async move {
                        let port = claimed.port;
                        let container_group_id = claimed.container_group_id.clone();
                        let warning = manager.teardown(claimed).await;
                        (port, container_group_id, warning)
                    });
                }
                Err(e) => {
                    error!(port = record.port, error = %e, "Instance cannot be stopped during shutdown");
                    report.failed.push(FailedStop {
                        port: record.port,
                        container_group_id: record.container_group_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((port, _, None)) => report.stopped.push(port),
                Ok((port, container_group_id, Some(warning))) => report.failed.push(FailedStop {
                    port,
                    container_group_id,
                    error: warning.message,
                }),
                Err(e) => error!(error = %e, "Teardown task panicked during shutdown"),
            }
        }

        report.stopped.sort_unstable();
        report.failed.sort_by_key(|f| f.port);

        self.inner.state.send_replace(ManagerState::Stopped);

        info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            cancelled_requests = report.cancelled_requests,
            "Lifecycle manager stopped"
        );

        Some(report)
    }

    /// Wait until a shutdown has completed.
    pub async fn wait_until_stopped(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s == ManagerState::Stopped).await;
    }

    /// Decide between immediate provisioning and queueing.
    async fn admit(&self, request: CreateRequest) -> Result<Admission> {
        let _gate = self.inner.admission_gate.lock().await;
        if self.state() != ManagerState::Accepting {
            return Err(Error::ShuttingDown);
        }

        // Nobody may overtake requests that are already waiting
        if self.inner.queue.is_empty().await
            && let Some(port) = self.reserve_capacity().await
        {
            let (result_tx, receiver) = oneshot::channel();
            self.launch(port, request, result_tx).await;
            return Ok(Admission::Provisioning(receiver));
        }

        let handle = self
            .inner
            .queue
            .enqueue(request)
            .await
            .map_err(|e| match e {
                QueueError::QueueFull { max_depth } => Error::QueueFull { max_depth },
                other => Error::Consistency(other.to_string()),
            })?;

        let waiting = self.inner.queue.len().await;
        info!(
            request_id = %handle.request_id,
            waiting,
            "No capacity, request queued"
        );

        self.promote_locked().await;
        Ok(Admission::Waiting(handle))
    }

    async fn await_promotion(&self, handle: PendingHandle) -> Result<Credentials> {
        let PendingHandle {
            request_id,
            enqueued_at,
            mut receiver,
        } = handle;
        let deadline = enqueued_at + self.inner.config.admission_timeout;

        match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(outcome) => flatten(outcome),
            Err(_) => match self.inner.queue.cancel(request_id).await {
                Ok(_) => {
                    let waited = enqueued_at.elapsed();
                    info!(request_id = %request_id, waited_ms = waited.as_millis() as u64, "Admission timed out");
                    Err(Error::AdmissionTimeout { waited })
                }
                // Promoted right at the deadline; provisioning owns the answer now
                Err(_) => flatten(receiver.await),
            },
        }
    }

    /// Reserve a port if the ceiling allows another instance. Gate must be held.
    async fn reserve_capacity(&self) -> Option<u16> {
        if self.inner.registry.count().await >= self.inner.max_instances {
            return None;
        }
        self.inner.ports.reserve().await.ok()
    }

    /// Record a starting instance on a reserved port and spawn its
    /// provisioning. Gate must be held.
    async fn launch(&self, port: u16, request: CreateRequest, result_tx: Outcome) {
        let password = request
            .root_password
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(generate_password);
        let credentials = Credentials {
            host: self.inner.config.advertised_host.clone(),
            port,
            username: self.inner.config.username.clone(),
            password,
        };

        if let Err(e) = self
            .inner
            .registry
            .insert(InstanceRecord::starting(port, credentials.clone()))
            .await
        {
            error!(port, error = %e, "Port handed out while still registered");
            if let Err(e) = self.inner.ports.release(port).await {
                error!(port, error = %e, "Port release failed");
            }
            let _ = result_tx.send(Err(Error::Consistency(e.to_string())));
            return;
        }

        debug!(port, "Provisioning instance");

        let manager = self.clone();
        self.inner.tasks.spawn(async move {
            let outcome = manager.provision(port, request, credentials).await;
            let failed = outcome.is_err();
            let _ = result_tx.send(outcome);
            if failed {
                manager.promote().await;
            }
        });
    }

    /// Start the container group, run the bootstrap content, mark running.
    async fn provision(
        &self,
        port: u16,
        request: CreateRequest,
        credentials: Credentials,
    ) -> Result<Credentials> {
        let spec = GroupSpec {
            port,
            root_password: credentials.password.clone(),
        };

        let container_group_id = match self.inner.driver.start(&spec).await {
            Ok(id) => id,
            Err(e) => {
                warn!(port, error = %e, "Container group failed to start");
                let message = e.to_string();
                self.rollback(port, None, &message).await;
                return Err(Error::Provision { port, message });
            }
        };

        if let Err(e) = self
            .inner
            .registry
            .set_container_group(port, container_group_id.clone())
            .await
        {
            error!(port, error = %e, "Starting record vanished");
        }

        if let Err(e) = self
            .inner
            .initializer
            .run(&credentials, request.init_sql.as_deref())
            .await
        {
            warn!(port, container_group_id = %container_group_id, error = %e, "Initialization failed");
            let message = e.to_string();
            self.rollback(port, Some(&container_group_id), &message)
                .await;
            return Err(Error::Initialization { port, message });
        }

        if let Err(e) = self
            .inner
            .registry
            .mark_running(port, credentials.clone())
            .await
        {
            error!(port, error = %e, "Could not mark instance running");
            let message = e.to_string();
            self.rollback(port, Some(&container_group_id), &message)
                .await;
            return Err(Error::Consistency(message));
        }
        if let Err(e) = self.inner.ports.bind(port).await {
            error!(port, error = %e, "Could not bind port");
        }

        info!(port, container_group_id = %container_group_id, "Instance running");
        Ok(credentials)
    }

    /// Undo a failed provisioning attempt.
    async fn rollback(&self, port: u16, container_group_id: Option<&str>, reason: &str) {
        if let Err(e) = self.inner.registry.mark_failed(port, reason).await {
            error!(port, error = %e, "Could not mark instance failed");
        }

        if let Some(id) = container_group_id
            && let Err(e) = self.inner.driver.stop(id).await
        {
            error!(port, container_group_id = %id, error = %e, "Rollback could not stop container group");
        }

        if let Err(e) = self.inner.registry.remove(port).await {
            error!(port, error = %e, "Failed record already gone");
        }
        if let Err(e) = self.inner.ports.release(port).await {
            error!(port, error = %e, "Port release failed during rollback");
        }
    }

    /// Stop a claimed instance, then drop its record and release its port
    /// whatever the driver said.
    async fn teardown(&self, record: InstanceRecord) -> Option<PartialStopFailure> {
        let port = record.port;
        let warning = match record.container_group_id {
            Some(id) => match self.inner.driver.stop(&id).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(port, container_group_id = %id, error = %e, "Container group did not stop cleanly");
                    Some(PartialStopFailure {
                        container_group_id: Some(id),
                        message: e.to_string(),
                    })
                }
            },
            None => {
                warn!(port, "No container group recorded for instance");
                Some(PartialStopFailure {
                    container_group_id: None,
                    message: "no container group recorded".to_string(),
                })
            }
        };

        if let Err(e) = self.inner.registry.remove(port).await {
            error!(port, error = %e, "Stopped record already gone");
        }
        if let Err(e) = self.inner.ports.release(port).await {
            error!(port, error = %e, "Port release failed during stop");
        }

        info!(port, clean = warning.is_none(), "Instance stopped");
        warning
    }

    /// Boxed: promotion spawns provisioning tasks that promote again.
    fn promote(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let _gate = self.inner.admission_gate.lock().await;
            self.promote_locked().await;
        })
    }

    /// Hand free capacity to queued requests, oldest first. Gate must be held.
    async fn promote_locked(&self) {
        while self.state() == ManagerState::Accepting {
            if self.inner.queue.is_empty().await {
                return;
            }
            let Some(port) = self.reserve_capacity().await else {
                return;
            };
            let Some(pending) = self.next_live_request().await else {
                if let Err(e) = self.inner.ports.release(port).await {
                    error!(port, error = %e, "Port release failed");
                }
                return;
            };

            let PendingRequest {
                request_id,
                request,
                enqueued_at,
                result_tx,
            } = pending;
            info!(
                request_id = %request_id,
                port,
                waited_ms = enqueued_at.elapsed().as_millis() as u64,
                "Promoting queued request"
            );
            self.launch(port, request, result_tx).await;
        }
    }

    /// Pop queued requests until one is still worth serving.
    async fn next_live_request(&self) -> Option<PendingRequest> {
        while let Some(pending) = self.inner.queue.dequeue_next().await {
            if pending.is_abandoned() {
                debug!(request_id = %pending.request_id, "Skipping abandoned request");
                continue;
            }
            let waited = pending.enqueued_at.elapsed();
            if waited >= self.inner.config.admission_timeout {
                debug!(request_id = %pending.request_id, "Skipping expired request");
                pending.respond(Err(Error::AdmissionTimeout { waited }));
                continue;
            }
            return Some(pending);
        }
        None
    }
}

fn flatten(
    outcome: std::result::Result<Result<Credentials>, oneshot::error::RecvError>,
) -> Result<Credentials> {
    outcome.unwrap_or_else(|_| {
        Err(Error::Consistency(
            "request dropped without an answer".to_string(),
        ))
    })
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
