// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! docker-compose container group driver.
//!
//! Renders one compose project per instance and drives it with the
//! container runtime's `up` / `down` commands.

mod driver;
mod file;

pub use driver::{ComposeDriver, ComposeDriverConfig};
pub use file::{
    ComposeFile, ComposeService, ComposeTemplate, ComposeVolume, compose_file_path, project_name,
};
