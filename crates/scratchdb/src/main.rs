// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! scratchdb - Ephemeral MySQL Instance Server
//!
//! An HTTP daemon responsible for:
//! - Handing out throwaway MySQL instances from a bounded port pool
//! - Queueing requests in FIFO order while at capacity
//! - Tearing every instance down on SIGINT/SIGTERM

use std::sync::Arc;
use tracing::{info, warn};

use scratchdb::config::Config;
use scratchdb::driver::ContainerGroupDriver;
use scratchdb::driver::compose::{ComposeDriver, ComposeDriverConfig};
use scratchdb::initializer::{MySqlInitializer, MySqlInitializerConfig};
use scratchdb::runtime::ScratchRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scratchdb=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        port_min = config.port_min,
        port_max = config.port_max,
        max_instances = config.effective_max_instances(),
        compose_dir = %config.compose_dir.display(),
        "Starting scratchdb"
    );

    let driver = Arc::new(ComposeDriver::new(ComposeDriverConfig::from_config(&config)));
    info!(driver_type = driver.driver_type(), "Driver initialized");

    let initializer = Arc::new(MySqlInitializer::new(MySqlInitializerConfig::from_config(
        &config,
    )));

    let runtime = ScratchRuntime::builder()
        .driver(driver)
        .initializer(initializer)
        .config(config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.http_addr(), "scratchdb ready");

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    if let Some(report) = runtime.shutdown().await?
        && !report.is_clean()
    {
        warn!(
            failed = ?report.failed.iter().map(|f| f.port).collect::<Vec<_>>(),
            "Some instances may still be running"
        );
    }

    info!("scratchdb shut down");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
