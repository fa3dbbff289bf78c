// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::aggregate::AggregateId;

/// Correlation id tying an HTTP-dispatched command to its completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything published on the engine's buses.
///
/// Lifecycle and property events are buffered on the aggregate and published
/// only after a successful save. `HttpCommandProcessed` goes straight to the
/// results bus once its command finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceEvent {
    ResourceCreated {
        id: AggregateId,
        resource_uri: String,
        collection: bool,
        created_at: DateTime<Utc>,
    },
    ResourceRemoved {
        id: AggregateId,
        resource_uri: String,
        removed_at: DateTime<Utc>,
    },
    PropertiesUpdated {
        id: AggregateId,
        resource_uri: String,
        changed: Vec<String>,
        updated_at: DateTime<Utc>,
    },
    PropertyMetaUpdated {
        id: AggregateId,
        resource_uri: String,
        changed: Vec<String>,
        updated_at: DateTime<Utc>,
    },
    PropertyRemoved {
        id: AggregateId,
        resource_uri: String,
        property: String,
        removed_at: DateTime<Utc>,
    },
    CollectionMemberAdded {
        id: AggregateId,
        resource_uri: String,
        member_uri: String,
        count: usize,
        added_at: DateTime<Utc>,
    },
    CollectionMemberRemoved {
        id: AggregateId,
        resource_uri: String,
        member_uri: String,
        count: usize,
        removed_at: DateTime<Utc>,
    },
    HttpCommandProcessed {
        command_id: CommandId,
        status: u16,
        results: Value,
        headers: BTreeMap<String, String>,
        processed_at: DateTime<Utc>,
    },
    /// Arbitrary named event handed in by a backend caller.
    Injected {
        name: String,
        data: Value,
        injected_at: DateTime<Utc>,
    },
}

impl ResourceEvent {
    /// Wire name used on the SSE stream.
    pub fn name(&self) -> &str {
        match self {
            ResourceEvent::ResourceCreated { .. } => "ResourceCreated",
            ResourceEvent::ResourceRemoved { .. } => "ResourceRemoved",
            ResourceEvent::PropertiesUpdated { .. } => "PropertiesUpdated",
            ResourceEvent::PropertyMetaUpdated { .. } => "PropertyMetaUpdated",
            ResourceEvent::PropertyRemoved { .. } => "PropertyRemoved",
            ResourceEvent::CollectionMemberAdded { .. } => "CollectionMemberAdded",
            ResourceEvent::CollectionMemberRemoved { .. } => "CollectionMemberRemoved",
            ResourceEvent::HttpCommandProcessed { .. } => "HttpCommandProcessed",
            ResourceEvent::Injected { name, .. } => name,
        }
    }

    pub fn resource_uri(&self) -> Option<&str> {
        match self {
            ResourceEvent::ResourceCreated { resource_uri, .. }
            | ResourceEvent::ResourceRemoved { resource_uri, .. }
            | ResourceEvent::PropertiesUpdated { resource_uri, .. }
            | ResourceEvent::PropertyMetaUpdated { resource_uri, .. }
            | ResourceEvent::PropertyRemoved { resource_uri, .. }
            | ResourceEvent::CollectionMemberAdded { resource_uri, .. }
            | ResourceEvent::CollectionMemberRemoved { resource_uri, .. } => Some(resource_uri),
            ResourceEvent::HttpCommandProcessed { .. } | ResourceEvent::Injected { .. } => None,
        }
    }

    pub fn command_id(&self) -> Option<CommandId> {
        match self {
            ResourceEvent::HttpCommandProcessed { command_id, .. } => Some(*command_id),
            _ => None,
        }
    }

    pub fn is_http_result(&self) -> bool {
        matches!(self, ResourceEvent::HttpCommandProcessed { .. })
    }

    /// Payload for the SSE stream.
    pub fn data(&self) -> Value {
        match self {
            ResourceEvent::Injected { data, .. } => data.clone(),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }
}
