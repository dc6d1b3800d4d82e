// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! docker-compose driver implementation.
//!
//! Compose files live in `{compose_dir}/docker-compose_{project}.yml` for as
//! long as the project is up; `stop` removes the file only once `down`
//! succeeded so a stuck project can still be torn down by hand.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::file::{ComposeTemplate, compose_file_path, project_name};
use crate::config::Config;
use crate::driver::{ContainerGroupDriver, DriverError, GroupSpec, Result};

/// Compose driver configuration
#[derive(Debug, Clone)]
pub struct ComposeDriverConfig {
    /// Directory for rendered compose files
    pub compose_dir: PathBuf,
    /// Runtime command, e.g. `["docker", "compose"]` or `["docker-compose"]`
    pub command: Vec<String>,
    /// Template for each instance
    pub template: ComposeTemplate,
}

impl ComposeDriverConfig {
    /// Build the driver configuration from the daemon configuration.
    pub fn from_config(config: &Config) -> Self {
        // Absolute path so the runtime resolves the file regardless of its cwd
        let compose_dir = if config.compose_dir.is_absolute() {
            config.compose_dir.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&config.compose_dir))
                .unwrap_or_else(|_| config.compose_dir.clone())
        };

        Self {
            compose_dir,
            command: config.compose_command.clone(),
            template: ComposeTemplate {
                image: config.mysql_image.clone(),
            },
        }
    }
}

/// Driver that runs each instance as its own compose project.
pub struct ComposeDriver {
    config: ComposeDriverConfig,
}

impl ComposeDriver {
    /// Create a new compose driver
    pub fn new(config: ComposeDriverConfig) -> Self {
        Self { config }
    }

    /// Path of the compose file for a container group.
    pub fn file_for(&self, container_group_id: &str) -> PathBuf {
        compose_file_path(&self.config.compose_dir, container_group_id)
    }

    /// Write the rendered compose file for a group, returning its project name and path.
    pub async fn write_compose_file(&self, spec: &GroupSpec) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.config.compose_dir).await?;

        let project = project_name(spec.port);
        let path = self.file_for(&project);
        let yaml = self.config.template.render(spec).to_yaml()?;
        fs::write(&path, yaml).await?;

        debug!(project = %project, path = %path.display(), "Wrote compose file");
        Ok((project, path))
    }

    /// Run the compose command for one project.
    async fn compose(&self, file: &Path, project: &str, args: &[&str]) -> Result<()> {
        let (program, base_args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| DriverError::Other("empty compose command".to_string()))?;

        let output = Command::new(program)
            .args(base_args)
            .arg("-f")
            .arg(file)
            .arg("-p")
            .arg(project)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DriverError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Group IDs become file names; only accept what `project_name` produces.
fn is_valid_group_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl ContainerGroupDriver for ComposeDriver {
    fn driver_type(&self) -> &'static str {
        "compose"
    }

    async fn start(&self, spec: &GroupSpec) -> Result<String> {
        let (project, path) = self.write_compose_file(spec).await?;

        info!(project = %project, port = spec.port, "Starting compose project");

        if let Err(e) = self.compose(&path, &project, &["up", "-d"]).await {
            // up -d can leave half-created containers behind
            if let Err(down_err) = self.compose(&path, &project, &["down", "-v"]).await {
                warn!(project = %project, error = %down_err, "Cleanup after failed start also failed");
            } else if let Err(rm_err) = fs::remove_file(&path).await {
                warn!(project = %project, error = %rm_err, "Failed to remove compose file");
            }
            return Err(e);
        }

        Ok(project)
    }

    async fn stop(&self, container_group_id: &str) -> Result<()> {
        if !is_valid_group_id(container_group_id) {
            return Err(DriverError::UnknownGroup(container_group_id.to_string()));
        }

        let path = self.file_for(container_group_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DriverError::UnknownGroup(container_group_id.to_string()));
        }

        info!(project = %container_group_id, "Stopping compose project");
        self.compose(&path, container_group_id, &["down", "-v"])
            .await?;

        fs::remove_file(&path).await?;
        Ok(())
    }
}
