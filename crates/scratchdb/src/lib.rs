// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! scratchdb - Ephemeral MySQL Instance Lifecycle Management
//!
//! This crate provides the control plane for throwaway MySQL servers. Clients
//! ask for a database, get back a host, port and root password, and give the
//! port back when done. Every instance is its own container group publishing
//! one port from a bounded pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  HTTP clients (test suites, CI jobs)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      scratchdb (This Crate)                          │
//! │                           Port 5600                                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌────────────┐  │
//! │  │  Admission  │  │    Port     │  │  Instance   │  │ Lifecycle  │  │
//! │  │    Queue    │  │    Pool     │  │  Registry   │  │  Manager   │  │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//!              │ up -d / down -v                     │ bootstrap SQL
//!              ▼                                     ▼
//! ┌───────────────────────────────┐      ┌──────────────────────────────┐
//! │  Container runtime (compose)  │      │  MySQL instances             │
//! │  one project per port         │─────►│  3306..3310                  │
//! └───────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! # HTTP API (Port 5600)
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /mysql/start` | Provision an instance, waiting in FIFO order if at capacity |
//! | `POST /mysql/stop/{port}` | Tear an instance down and reclaim its port |
//! | `GET /mysql/list` | All instances plus admission queue depth |
//! | `GET /mysql/status/{port}` | One instance record |
//! | `GET /health` | Liveness check |
//!
//! # Instance State Machine
//!
//! ```text
//!              ┌──────────┐
//!              │ STARTING │──────────────┐
//!              └────┬─────┘              │ driver or
//!                   │ group up,          │ bootstrap failure
//!                   │ bootstrap applied  ▼
//!                   ▼               ┌────────┐
//!              ┌─────────┐          │ FAILED │──► rolled back
//!              │ RUNNING │          └────────┘
//!              └────┬────┘
//!                   │ stop / shutdown
//!                   ▼
//!              ┌──────────┐
//!              │ STOPPING │──► removed, port released
//!              └──────────┘
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SCRATCHDB_HTTP_PORT` | No | `5600` | HTTP front-end port |
//! | `SCRATCHDB_PORT_MIN` | No | `3306` | First instance port |
//! | `SCRATCHDB_PORT_MAX` | No | `3310` | Last instance port |
//! | `SCRATCHDB_MAX_INSTANCES` | No | `5` | Concurrency ceiling (capped by pool size) |
//! | `SCRATCHDB_ADMISSION_TIMEOUT_SECS` | No | `300` | Queue wait limit |
//! | `SCRATCHDB_QUEUE_MAX_DEPTH` | No | `64` | Queue cap |
//! | `SCRATCHDB_COMPOSE_DIR` | No | `.data/compose` | Rendered compose files |
//! | `SCRATCHDB_COMPOSE_COMMAND` | No | `docker compose` | Container runtime command |
//! | `SCRATCHDB_MYSQL_IMAGE` | No | `mysql:5.7` | Database image |
//! | `SCRATCHDB_ADVERTISED_HOST` | No | `localhost` | Host in returned credentials |
//! | `SCRATCHDB_INIT_TIMEOUT_SECS` | No | `120` | Readiness wait before bootstrap |
//!
//! # Modules
//!
//! - [`config`]: Daemon configuration from environment variables
//! - [`error`]: Error types surfaced to clients
//! - [`port_pool`]: Bounded set of publishable ports
//! - [`registry`]: Instance records keyed by port
//! - [`admission`]: FIFO queue of requests waiting for capacity
//! - [`driver`]: Container group backends (compose, mock)
//! - [`initializer`]: Bootstrap SQL execution (MySQL, mock)
//! - [`lifecycle`]: The lifecycle manager tying the above together
//! - [`server`]: HTTP front end
//! - [`runtime`]: Embeddable runtime with graceful shutdown

#![deny(missing_docs)]

/// Daemon configuration loaded from environment variables.
pub mod config;

/// Error types for scratchdb operations.
pub mod error;

/// Bounded pool of host ports.
pub mod port_pool;

/// Registry of provisioned instances.
pub mod registry;

/// Admission queue for requests waiting on capacity.
pub mod admission;

/// Container group backends (compose, mock).
pub mod driver;

/// Bootstrap execution backends (MySQL, mock).
pub mod initializer;

/// Instance lifecycle manager.
pub mod lifecycle;

/// HTTP front end.
pub mod server;

/// Embeddable runtime.
pub mod runtime;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::{CreateRequest, DrainReport, LifecycleManager};
pub use registry::Credentials;
