// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for scratchdb.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP front end listens on
    pub http_addr: SocketAddr,
    /// First port handed out to instances (inclusive)
    pub port_min: u16,
    /// Last port handed out to instances (inclusive)
    pub port_max: u16,
    /// Configured ceiling on concurrently starting/running instances
    pub max_instances: usize,
    /// How long a queued create request may wait for capacity
    pub admission_timeout: Duration,
    /// Maximum number of queued create requests
    pub admission_queue_max_depth: usize,
    /// Directory for rendered compose files
    pub compose_dir: PathBuf,
    /// Container runtime command, split on whitespace (e.g. `docker compose`)
    pub compose_command: Vec<String>,
    /// Database image for every instance
    pub mysql_image: String,
    /// Host name returned to clients in credentials
    pub advertised_host: String,
    /// How long the initializer waits for a fresh server to accept connections
    pub init_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5600)),
            port_min: 3306,
            port_max: 3310,
            max_instances: 5,
            admission_timeout: Duration::from_secs(300),
            admission_queue_max_depth: 64,
            compose_dir: PathBuf::from(".data/compose"),
            compose_command: vec!["docker".to_string(), "compose".to_string()],
            mysql_image: "mysql:5.7".to_string(),
            advertised_host: "localhost".to_string(),
            init_timeout: Duration::from_secs(120),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(var, reason)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `SCRATCHDB_HTTP_PORT`: front-end port (default: 5600)
    /// - `SCRATCHDB_PORT_MIN` / `SCRATCHDB_PORT_MAX`: instance port range (default: 3306-3310)
    /// - `SCRATCHDB_MAX_INSTANCES`: concurrency ceiling (default: 5)
    /// - `SCRATCHDB_ADMISSION_TIMEOUT_SECS`: queue wait limit (default: 300)
    /// - `SCRATCHDB_QUEUE_MAX_DEPTH`: queue cap (default: 64)
    /// - `SCRATCHDB_COMPOSE_DIR`: compose file directory (default: `.data/compose`)
    /// - `SCRATCHDB_COMPOSE_COMMAND`: runtime command (default: `docker compose`)
    /// - `SCRATCHDB_MYSQL_IMAGE`: database image (default: `mysql:5.7`)
    /// - `SCRATCHDB_ADVERTISED_HOST`: host in returned credentials (default: `localhost`)
    /// - `SCRATCHDB_INIT_TIMEOUT_SECS`: readiness wait for bootstrap (default: 120)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let http_port: u16 = parse_var(
            "SCRATCHDB_HTTP_PORT",
            defaults.http_addr.port(),
            "must be a valid port number",
        )?;
        let port_min: u16 = parse_var(
            "SCRATCHDB_PORT_MIN",
            defaults.port_min,
            "must be a valid port number",
        )?;
        let port_max: u16 = parse_var(
            "SCRATCHDB_PORT_MAX",
            defaults.port_max,
            "must be a valid port number",
        )?;
        let max_instances: usize = parse_var(
            "SCRATCHDB_MAX_INSTANCES",
            defaults.max_instances,
            "must be a positive integer",
        )?;
        let admission_timeout_secs: u64 = parse_var(
            "SCRATCHDB_ADMISSION_TIMEOUT_SECS",
            defaults.admission_timeout.as_secs(),
            "must be a number of seconds",
        )?;
        let admission_queue_max_depth: usize = parse_var(
            "SCRATCHDB_QUEUE_MAX_DEPTH",
            defaults.admission_queue_max_depth,
            "must be a non-negative integer",
        )?;
        let init_timeout_secs: u64 = parse_var(
            "SCRATCHDB_INIT_TIMEOUT_SECS",
            defaults.init_timeout.as_secs(),
            "must be a number of seconds",
        )?;

        let compose_dir = std::env::var("SCRATCHDB_COMPOSE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.compose_dir);

        let compose_command = match std::env::var("SCRATCHDB_COMPOSE_COMMAND") {
            Ok(raw) => {
                let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
                if parts.is_empty() {
                    return Err(ConfigError::Invalid(
                        "SCRATCHDB_COMPOSE_COMMAND",
                        "must not be empty",
                    ));
                }
                parts
            }
            Err(_) => defaults.compose_command,
        };

        let mysql_image =
            std::env::var("SCRATCHDB_MYSQL_IMAGE").unwrap_or(defaults.mysql_image);
        let advertised_host =
            std::env::var("SCRATCHDB_ADVERTISED_HOST").unwrap_or(defaults.advertised_host);

        let config = Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            port_min,
            port_max,
            max_instances,
            admission_timeout: Duration::from_secs(admission_timeout_secs),
            admission_queue_max_depth,
            compose_dir,
            compose_command,
            mysql_image,
            advertised_host,
            init_timeout: Duration::from_secs(init_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_min > self.port_max {
            return Err(ConfigError::Invalid(
                "SCRATCHDB_PORT_MIN",
                "must not be greater than SCRATCHDB_PORT_MAX",
            ));
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid(
                "SCRATCHDB_MAX_INSTANCES",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Number of ports in the configured range.
    pub fn pool_size(&self) -> usize {
        usize::from(self.port_max - self.port_min) + 1
    }

    /// The ceiling actually enforced: the configured one, capped by the pool size.
    pub fn effective_max_instances(&self) -> usize {
        self.max_instances.min(self.pool_size())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "SCRATCHDB_HTTP_PORT",
        "SCRATCHDB_PORT_MIN",
        "SCRATCHDB_PORT_MAX",
        "SCRATCHDB_MAX_INSTANCES",
        "SCRATCHDB_ADMISSION_TIMEOUT_SECS",
        "SCRATCHDB_QUEUE_MAX_DEPTH",
        "SCRATCHDB_COMPOSE_DIR",
        "SCRATCHDB_COMPOSE_COMMAND",
        "SCRATCHDB_MYSQL_IMAGE",
        "SCRATCHDB_ADVERTISED_HOST",
        "SCRATCHDB_INIT_TIMEOUT_SECS",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in ALL_VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 5600);
        assert_eq!(config.port_min, 3306);
        assert_eq!(config.port_max, 3310);
        assert_eq!(config.max_instances, 5);
        assert_eq!(config.admission_timeout, Duration::from_secs(300));
        assert_eq!(config.admission_queue_max_depth, 64);
        assert_eq!(config.compose_command, vec!["docker", "compose"]);
        assert_eq!(config.mysql_image, "mysql:5.7");
        assert_eq!(config.advertised_host, "localhost");
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("SCRATCHDB_HTTP_PORT", "8080");
        guard.set("SCRATCHDB_PORT_MIN", "4000");
        guard.set("SCRATCHDB_PORT_MAX", "4009");
        guard.set("SCRATCHDB_MAX_INSTANCES", "3");
        guard.set("SCRATCHDB_ADMISSION_TIMEOUT_SECS", "10");
        guard.set("SCRATCHDB_QUEUE_MAX_DEPTH", "2");
        guard.set("SCRATCHDB_COMPOSE_DIR", "/var/lib/scratchdb");
        guard.set("SCRATCHDB_COMPOSE_COMMAND", "docker-compose");
        guard.set("SCRATCHDB_MYSQL_IMAGE", "mysql:8.0");
        guard.set("SCRATCHDB_ADVERTISED_HOST", "db.internal");
        guard.set("SCRATCHDB_INIT_TIMEOUT_SECS", "30");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.port_min, 4000);
        assert_eq!(config.port_max, 4009);
        assert_eq!(config.max_instances, 3);
        assert_eq!(config.admission_timeout, Duration::from_secs(10));
        assert_eq!(config.admission_queue_max_depth, 2);
        assert_eq!(config.compose_dir, PathBuf::from("/var/lib/scratchdb"));
        assert_eq!(config.compose_command, vec!["docker-compose"]);
        assert_eq!(config.mysql_image, "mysql:8.0");
        assert_eq!(config.advertised_host, "db.internal");
        assert_eq!(config.init_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("SCRATCHDB_PORT_MIN", "not_a_number");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("SCRATCHDB_PORT_MIN", _)));
        assert!(err.to_string().contains("SCRATCHDB_PORT_MIN"));
    }

    #[test]
    fn test_config_inverted_range_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("SCRATCHDB_PORT_MIN", "4010");
        guard.set("SCRATCHDB_PORT_MAX", "4000");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("greater than"));
    }

    #[test]
    fn test_config_zero_instances_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("SCRATCHDB_MAX_INSTANCES", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_blank_compose_command_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("SCRATCHDB_COMPOSE_COMMAND", "   ");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_effective_max_instances_capped_by_pool() {
        let config = Config {
            port_min: 3306,
            port_max: 3307,
            max_instances: 10,
            ..Config::default()
        };

        assert_eq!(config.pool_size(), 2);
        assert_eq!(config.effective_max_instances(), 2);
    }

    #[test]
    fn test_effective_max_instances_below_pool() {
        let config = Config {
            port_min: 3306,
            port_max: 3315,
            max_instances: 4,
            ..Config::default()
        };

        assert_eq!(config.pool_size(), 10);
        assert_eq!(config.effective_max_instances(), 4);
    }
}
