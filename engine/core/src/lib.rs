// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Redfish Resource Domain Engine
//!
//! Event-sourced resource store behind a Redfish/OData management API.
//!
//! # Architecture
//!
//! - **domain:** aggregates, property nodes, events, the resource tree and the
//!   OData query engine
//! - **application:** command pipeline, property resolver, built-in commands
//!   and the per-request resource handler
//! - **infrastructure:** event bus and waiter, in-memory repository, plugin
//!   registry and built-in plugins
//! - **presentation:** axum routes for resources, internal commands and SSE

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
