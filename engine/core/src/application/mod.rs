// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Orchestration on top of the domain: the command pipeline, the property
//! resolver, the built-in commands, the bus observers and the per-request
//! resource handler.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Turn requests and internal calls into committed events

pub mod aggregate_store;
pub mod collections;
pub mod command;
pub mod command_pipeline;
pub mod engine;
pub mod http_commands;
pub mod internal_commands;
pub mod resolver;
pub mod resource_handler;
pub mod static_properties;
pub mod tree_observer;

pub use engine::RedfishEngine;
