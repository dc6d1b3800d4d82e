// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container group drivers - how one instance is brought up and torn down.

pub mod compose;
pub mod mock;
mod traits;

pub use mock::MockDriver;
pub use traits::*;
