// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Resource model types and the pure engines that operate on them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, property nodes, events, query options

pub mod aggregate;
pub mod authorization;
pub mod context;
pub mod events;
pub mod odata;
pub mod plugin;
pub mod property;
pub mod repository;
pub mod resource_tree;
pub mod server_config;
