// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compose file rendering.
//!
//! Each instance gets its own compose project with a single MySQL service
//! and a named data volume, so `down -v` wipes everything the instance wrote.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::driver::{GroupSpec, Result};

/// Port MySQL listens on inside the container.
pub const MYSQL_CONTAINER_PORT: u16 = 3306;

/// Compose document (docker-compose.yml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Services keyed by name.
    pub services: BTreeMap<String, ComposeService>,
    /// Named volumes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ComposeVolume>,
}

/// One service of a compose project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image reference.
    pub image: String,
    /// Published ports in `host:container` form.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Volume mounts in `name:path` form.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// Named volume declaration (driver defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeVolume {}

impl ComposeFile {
    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Template every instance's compose file is rendered from.
#[derive(Debug, Clone)]
pub struct ComposeTemplate {
    /// Database image.
    pub image: String,
}

impl Default for ComposeTemplate {
    fn default() -> Self {
        Self {
            image: "mysql:5.7".to_string(),
        }
    }
}

impl ComposeTemplate {
    /// Render the compose document for one instance.
    pub fn render(&self, spec: &GroupSpec) -> ComposeFile {
        let service_name = format!("mysql_{}", spec.port);
        let volume_name = format!("mysql_data_{}", spec.port);

        let mut environment = BTreeMap::new();
        environment.insert(
            "MYSQL_ROOT_PASSWORD".to_string(),
            spec.root_password.clone(),
        );

        let service = ComposeService {
            image: self.image.clone(),
            ports: vec![format!("{}:{}", spec.port, MYSQL_CONTAINER_PORT)],
            environment,
            volumes: vec![format!("{}:/var/lib/mysql", volume_name)],
        };

        ComposeFile {
            services: BTreeMap::from([(service_name, service)]),
            volumes: BTreeMap::from([(volume_name, ComposeVolume::default())]),
        }
    }
}

/// Compose project name (the container group ID) for a port.
pub fn project_name(port: u16) -> String {
    format!("scratchdb_{}", port)
}

/// Location of the compose file for a project.
pub fn compose_file_path(compose_dir: &Path, project: &str) -> PathBuf {
    compose_dir.join(format!("docker-compose_{}.yml", project))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> GroupSpec {
        GroupSpec {
            port: 3307,
            root_password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_render_publishes_port_and_password() {
        let file = ComposeTemplate::default().render(&spec());

        let service = file.services.get("mysql_3307").unwrap();
        assert_eq!(service.image, "mysql:5.7");
        assert_eq!(service.ports, vec!["3307:3306"]);
        assert_eq!(
            service.environment.get("MYSQL_ROOT_PASSWORD").map(String::as_str),
            Some("hunter2")
        );
        assert_eq!(service.volumes, vec!["mysql_data_3307:/var/lib/mysql"]);
        assert!(file.volumes.contains_key("mysql_data_3307"));
    }

    #[test]
    fn test_render_uses_template_image() {
        let template = ComposeTemplate {
            image: "mysql:8.0".to_string(),
        };
        let file = template.render(&spec());

        assert_eq!(file.services["mysql_3307"].image, "mysql:8.0");
    }

    #[test]
    fn test_yaml_round_trips() {
        let file = ComposeTemplate::default().render(&spec());

        let yaml = file.to_yaml().unwrap();
        assert!(yaml.contains("mysql_3307"));
        assert!(yaml.contains("3307:3306"));

        let parsed: ComposeFile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn test_project_and_file_naming() {
        assert_eq!(project_name(3306), "scratchdb_3306");
        assert_eq!(
            compose_file_path(Path::new("/tmp/compose"), "scratchdb_3306"),
            PathBuf::from("/tmp/compose/docker-compose_scratchdb_3306.yml")
        );
    }
}
