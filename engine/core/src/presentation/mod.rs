// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that translates requests into engine calls. No resource
//! logic lives here; everything is delegated to
//! [`crate::application::RedfishEngine`].
//!
//! | Route | Description |
//! |-------|-------------|
//! | `{prefix}`, `{prefix}/{*path}` | Redfish resources, any method |
//! | `POST /api/internal/command/{name}` | internal commands, JSON or XML body |
//! | `GET /events` | Server-Sent Events from the main bus |
//! | `GET /health`, `GET /status` | diagnostics |

pub mod api;

pub use api::router;
