// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Event buses, aggregate storage and the plugin registry.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Concrete adapters behind the domain contracts

pub mod event_bus;
pub mod plugin_registry;
pub mod plugins;
pub mod repositories;
