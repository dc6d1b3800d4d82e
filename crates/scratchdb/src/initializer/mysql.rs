// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MySQL initializer.
//!
//! A fresh MySQL container needs a while before it accepts TCP connections,
//! so the initializer polls until the server answers and only then runs the
//! bootstrap SQL as one multi-statement batch.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Initializer, InitializerError, Result};
use crate::config::Config;
use crate::registry::Credentials;

/// MySQL initializer configuration
#[derive(Debug, Clone)]
pub struct MySqlInitializerConfig {
    /// Host the daemon itself uses to reach published ports
    pub connect_host: String,
    /// How long to wait for the server to accept connections
    pub ready_timeout: Duration,
    /// Pause between connection attempts
    pub retry_interval: Duration,
    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,
}

impl Default for MySqlInitializerConfig {
    fn default() -> Self {
        Self {
            connect_host: "127.0.0.1".to_string(),
            ready_timeout: Duration::from_secs(120),
            retry_interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl MySqlInitializerConfig {
    /// Build the initializer configuration from the daemon configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_timeout: config.init_timeout,
            ..Self::default()
        }
    }
}

/// Runs bootstrap SQL over a MySQL connection.
pub struct MySqlInitializer {
    config: MySqlInitializerConfig,
}

impl MySqlInitializer {
    /// Create a new MySQL initializer
    pub fn new(config: MySqlInitializerConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self, endpoint: &Credentials) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.connect_host)
            .port(endpoint.port)
            .username(&endpoint.username)
            .password(&endpoint.password)
    }

    /// Connect, retrying until the server is up or the ready timeout elapses.
    async fn wait_until_ready(&self, endpoint: &Credentials) -> Result<MySqlConnection> {
        let options = self.connect_options(endpoint);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = self.config.ready_timeout.saturating_sub(started.elapsed());
            let attempt_timeout = self.config.connect_timeout.min(remaining);

            let last_error = match tokio::time::timeout(attempt_timeout, options.connect()).await
            {
                Ok(Ok(conn)) => {
                    debug!(port = endpoint.port, attempts, "MySQL accepted connection");
                    return Ok(conn);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("connect attempt timed out after {:?}", attempt_timeout),
            };

            let waited = started.elapsed();
            if waited >= self.config.ready_timeout {
                return Err(InitializerError::NotReady { waited, last_error });
            }
            debug!(port = endpoint.port, attempts, error = %last_error, "MySQL not ready yet");
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }
}

#[async_trait]
impl Initializer for MySqlInitializer {
    fn initializer_type(&self) -> &'static str {
        "mysql"
    }

    async fn run(&self, endpoint: &Credentials, init_content: Option<&str>) -> Result<()> {
        let mut conn = self.wait_until_ready(endpoint).await?;

        if let Some(content) = init_content.filter(|c| !c.trim().is_empty()) {
            conn.execute(sqlx::raw_sql(content)).await?;
            info!(
                port = endpoint.port,
                bytes = content.len(),
                "Bootstrap content applied"
            );
        }

        conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_daemon_config() {
        let config = Config {
            init_timeout: Duration::from_secs(7),
            ..Config::default()
        };

        let init_config = MySqlInitializerConfig::from_config(&config);
        assert_eq!(init_config.ready_timeout, Duration::from_secs(7));
        assert_eq!(init_config.connect_host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_not_ready() {
        // Nothing listens on port 1; connection attempts fail fast
        let initializer = MySqlInitializer::new(MySqlInitializerConfig {
            connect_host: "127.0.0.1".to_string(),
            ready_timeout: Duration::from_millis(200),
            retry_interval: Duration::from_millis(50),
            ..MySqlInitializerConfig::default()
        });
        let endpoint = Credentials {
            host: "localhost".to_string(),
            port: 1,
            username: "root".to_string(),
            password: "pw".to_string(),
        };

        let err = initializer.run(&endpoint, Some("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, InitializerError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_silent_server_bounded_by_ready_timeout() {
        // Accepts TCP but never sends the MySQL handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let initializer = MySqlInitializer::new(MySqlInitializerConfig {
            connect_host: "127.0.0.1".to_string(),
            ready_timeout: Duration::from_millis(300),
            retry_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(100),
        });
        let endpoint = Credentials {
            host: "localhost".to_string(),
            port,
            username: "root".to_string(),
            password: "pw".to_string(),
        };

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), initializer.run(&endpoint, None)).await;

        let err = outcome.expect("initializer hung past its ready timeout").unwrap_err();
        assert!(matches!(err, InitializerError::NotReady { .. }));
    }
}
