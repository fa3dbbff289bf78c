// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Aggregate
//!
//! One aggregate per addressable resource. The aggregate owns the property
//! tree, the privilege table and the buffer of events produced by commands
//! that have not been saved yet.
//!
//! ## Locks
//!
//! | Lock | Guards | Held by |
//! |------|--------|---------|
//! | `state` (RwLock) | everything in [`AggregateState`] | commands, resolver, store |
//! | `commands` (Mutex) | load→handle→save sequence | command pipeline |
//!
//! The `state` lock always comes before any per-node lock inside the
//! property tree.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::domain::events::ResourceEvent;
use crate::domain::property::{PathUpdate, PropertyNode};

/// Plugin hint used when a resource does not declare its own.
pub const DEFAULT_PLUGIN: &str = "RedfishResource";

/// Keys owned by the aggregate itself; callers can never overwrite them.
pub const IMMUTABLE_PROPERTIES: [&str; 3] = ["@odata.id", "@odata.type", "@odata.context"];

pub const MEMBERS: &str = "Members";
pub const MEMBERS_COUNT: &str = "Members@odata.count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateId(pub Uuid);

impl AggregateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(AggregateError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Everything needed to bring a resource into existence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(rename = "ResourceURI")]
    pub resource_uri: String,
    #[serde(rename = "Type", default)]
    pub odata_type: Option<String>,
    #[serde(rename = "Context", default)]
    pub odata_context: Option<String>,
    #[serde(rename = "Plugin", default)]
    pub plugin: Option<String>,
    #[serde(rename = "DefaultFilter", default)]
    pub default_filter: Option<String>,
    #[serde(rename = "Headers", default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP method → privileges, any one of which grants access.
    #[serde(rename = "Privileges", default)]
    pub privileges: HashMap<String, Vec<String>>,
    #[serde(rename = "Collection", default)]
    pub collection: bool,
    #[serde(rename = "Properties", default)]
    pub properties: Map<String, Value>,
    /// Property name → `{GET: {...}, PATCH: {...}}` directives.
    #[serde(rename = "Meta", default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("resource {0} already created")]
    AlreadyCreated(String),

    #[error("aggregate has not been created")]
    NotCreated,

    #[error("resource URI must be absolute: {0}")]
    InvalidUri(String),

    #[error("property {0} is managed by the resource and cannot be changed")]
    ImmutableProperty(String),

    #[error("{0} is not a collection")]
    NotACollection(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

/// Mutable state of one resource.
#[derive(Debug)]
pub struct AggregateState {
    id: AggregateId,
    created: bool,
    pub resource_uri: String,
    pub plugin: String,
    pub default_filter: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub privileges: HashMap<String, Vec<String>>,
    pub collection: bool,
    pub properties: PropertyNode,
    pending: Vec<ResourceEvent>,
    last_access: HashMap<HttpMethod, DateTime<Utc>>,
}

impl AggregateState {
    fn new(id: AggregateId) -> Self {
        Self {
            id,
            created: false,
            resource_uri: String::new(),
            plugin: DEFAULT_PLUGIN.to_string(),
            default_filter: None,
            headers: BTreeMap::new(),
            privileges: HashMap::new(),
            collection: false,
            properties: PropertyNode::empty_object(),
            pending: Vec::new(),
            last_access: HashMap::new(),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Initialize the resource. Only the first call on an aggregate succeeds.
    pub fn create(&mut self, definition: ResourceDefinition) -> Result<(), AggregateError> {
        if self.created {
            return Err(AggregateError::AlreadyCreated(self.resource_uri.clone()));
        }
        if !definition.resource_uri.starts_with('/') {
            return Err(AggregateError::InvalidUri(definition.resource_uri));
        }

        let mut properties = definition.properties;
        for key in IMMUTABLE_PROPERTIES {
            properties.remove(key);
        }
        let mut root = PropertyNode::from_json(Value::Object(properties));
        root.insert(
            "@odata.id",
            PropertyNode::Scalar(Value::String(escape_uri(&definition.resource_uri))),
        );
        if let Some(odata_type) = definition.odata_type {
            root.insert("@odata.type", PropertyNode::Scalar(Value::String(odata_type)));
        }
        if let Some(context) = definition.odata_context {
            root.insert("@odata.context", PropertyNode::Scalar(Value::String(context)));
        }
        root.apply_meta(&definition.meta);

        self.created = true;
        self.resource_uri = definition.resource_uri;
        self.plugin = definition.plugin.unwrap_or_else(|| DEFAULT_PLUGIN.to_string());
        self.default_filter = definition.default_filter;
        self.headers = definition.headers;
        self.privileges = definition.privileges;
        self.collection = definition.collection;
        self.properties = root;
        if self.collection {
            self.ensure_collection();
        }

        self.pending.push(ResourceEvent::ResourceCreated {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            collection: self.collection,
            created_at: Utc::now(),
        });
        let dynamic = self.dynamic_properties();
        if !dynamic.is_empty() {
            self.pending.push(ResourceEvent::PropertyMetaUpdated {
                id: self.id,
                resource_uri: self.resource_uri.clone(),
                changed: dynamic,
                updated_at: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn remove(&mut self) -> Result<(), AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        self.pending.push(ResourceEvent::ResourceRemoved {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            removed_at: Utc::now(),
        });
        Ok(())
    }

    /// Deep-merge a property document. Immutable keys are ignored.
    pub fn update_properties(&mut self, mut properties: Map<String, Value>) -> Result<Vec<String>, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        for key in IMMUTABLE_PROPERTIES {
            properties.remove(key);
        }
        let changed: Vec<String> = properties
            .keys()
            .filter(|key| !key.ends_with(crate::domain::property::META_SUFFIX))
            .cloned()
            .collect();
        self.properties
            .merge(PropertyNode::from_json(Value::Object(properties)));
        if self.collection {
            self.recount_members();
        }
        self.record_update(changed.clone());
        Ok(changed)
    }

    /// Set existing leaves addressed by `/`-separated paths. Unknown paths are
    /// skipped.
    pub fn update_paths(&mut self, updates: Map<String, Value>) -> Result<Vec<String>, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        let mut changed = Vec::new();
        for (path, value) in updates {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if segments.first().is_some_and(|head| IMMUTABLE_PROPERTIES.contains(head)) {
                warn!(resource = %self.resource_uri, path = %path, "Refusing to update immutable property");
                continue;
            }
            if self.collection && segments.first() == Some(&MEMBERS_COUNT) {
                warn!(resource = %self.resource_uri, path = %path, "Member count is derived, skipping update");
                continue;
            }
            match self.properties.set_path(&segments, value) {
                PathUpdate::Set => changed.push(path),
                PathUpdate::Missing => {
                    warn!(resource = %self.resource_uri, path = %path, "Property path not found, skipping update")
                }
                PathUpdate::Busy => {
                    warn!(resource = %self.resource_uri, path = %path, "Property is being resolved, skipping update")
                }
            }
        }
        if self.collection {
            self.recount_members();
        }
        self.record_update(changed.clone());
        Ok(changed)
    }

    pub fn remove_property(&mut self, name: &str) -> Result<bool, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        if IMMUTABLE_PROPERTIES.contains(&name) {
            return Err(AggregateError::ImmutableProperty(name.to_string()));
        }
        if self.collection && name == MEMBERS_COUNT {
            return Err(AggregateError::ImmutableProperty(name.to_string()));
        }
        if self.properties.remove(name).is_none() {
            return Ok(false);
        }
        if self.collection {
            // Dropping the member list empties the collection.
            self.ensure_collection();
        }
        self.pending.push(ResourceEvent::PropertyRemoved {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            property: name.to_string(),
            removed_at: Utc::now(),
        });
        Ok(true)
    }

    /// Attach directives to existing or new top-level properties.
    pub fn apply_meta(&mut self, meta: &Map<String, Value>) -> Result<Vec<String>, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        let changed = self.properties.apply_meta(meta);
        if !changed.is_empty() {
            self.pending.push(ResourceEvent::PropertyMetaUpdated {
                id: self.id,
                resource_uri: self.resource_uri.clone(),
                changed: changed.clone(),
                updated_at: Utc::now(),
            });
        }
        Ok(changed)
    }

    /// Make sure `Members` and its count exist.
    pub fn ensure_collection(&mut self) {
        self.collection = true;
        if self.properties.get(MEMBERS).is_none() {
            self.properties
                .insert(MEMBERS, PropertyNode::Array(Vec::new()));
        }
        self.recount_members();
    }

    /// Append a member link. Returns `false` if it was already present.
    pub fn add_member(&mut self, member_uri: &str) -> Result<bool, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        self.ensure_collection();
        let link = escape_uri(member_uri);
        let resource_uri = self.resource_uri.clone();
        let Some(PropertyNode::Array(members)) = self
            .properties
            .as_object_mut()
            .and_then(|map| map.get_mut(MEMBERS))
        else {
            return Err(AggregateError::NotACollection(resource_uri));
        };
        if members.iter().any(|m| member_link(m).as_deref() == Some(link.as_str())) {
            return Ok(false);
        }
        members.push(PropertyNode::from_json(
            serde_json::json!({ "@odata.id": link }),
        ));
        let count = self.recount_members();
        self.pending.push(ResourceEvent::CollectionMemberAdded {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            member_uri: member_uri.to_string(),
            count,
            added_at: Utc::now(),
        });
        Ok(true)
    }

    pub fn remove_member(&mut self, member_uri: &str) -> Result<bool, AggregateError> {
        if !self.created {
            return Err(AggregateError::NotCreated);
        }
        let link = escape_uri(member_uri);
        let resource_uri = self.resource_uri.clone();
        let Some(PropertyNode::Array(members)) = self
            .properties
            .as_object_mut()
            .and_then(|map| map.get_mut(MEMBERS))
        else {
            return Err(AggregateError::NotACollection(resource_uri));
        };
        let before = members.len();
        members.retain(|m| member_link(m).as_deref() != Some(link.as_str()));
        if members.len() == before {
            return Ok(false);
        }
        let count = self.recount_members();
        self.pending.push(ResourceEvent::CollectionMemberRemoved {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            member_uri: member_uri.to_string(),
            count,
            removed_at: Utc::now(),
        });
        Ok(true)
    }

    /// Member links in order.
    pub fn members(&self) -> Vec<String> {
        match self.properties.get(MEMBERS) {
            Some(PropertyNode::Array(members)) => members.iter().filter_map(member_link).collect(),
            _ => Vec::new(),
        }
    }

    pub fn member_count(&self) -> Option<u64> {
        match self.properties.get(MEMBERS_COUNT) {
            Some(PropertyNode::Scalar(value)) => value.as_u64(),
            _ => None,
        }
    }

    /// Count and member array are always written together.
    fn recount_members(&mut self) -> usize {
        let count = match self.properties.get(MEMBERS) {
            Some(PropertyNode::Array(members)) => members.len(),
            _ => return 0,
        };
        self.properties
            .insert(MEMBERS_COUNT, PropertyNode::Scalar(Value::from(count)));
        count
    }

    fn record_update(&mut self, changed: Vec<String>) {
        if changed.is_empty() {
            return;
        }
        self.pending.push(ResourceEvent::PropertiesUpdated {
            id: self.id,
            resource_uri: self.resource_uri.clone(),
            changed,
            updated_at: Utc::now(),
        });
    }

    fn dynamic_properties(&self) -> Vec<String> {
        self.properties
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(_, node)| matches!(node, PropertyNode::Dynamic(_)))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Privileges that grant `method`. Empty means nobody is allowed.
    pub fn required_privileges(&self, method: HttpMethod) -> &[String] {
        self.privileges
            .get(method.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pending_events(&self) -> &[ResourceEvent] {
        &self.pending
    }

    /// Queue an event produced outside the helpers above.
    pub fn push_event(&mut self, event: ResourceEvent) {
        self.pending.push(event);
    }

    pub fn take_pending(&mut self) -> Vec<ResourceEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn record_access(&mut self, method: HttpMethod) {
        self.last_access.insert(method, Utc::now());
    }

    pub fn last_access(&self, method: HttpMethod) -> Option<DateTime<Utc>> {
        self.last_access.get(&method).copied()
    }
}

/// Shared handle to one resource.
#[derive(Debug)]
pub struct Aggregate {
    id: AggregateId,
    state: RwLock<AggregateState>,
    commands: Mutex<()>,
}

impl Aggregate {
    /// Zero-value aggregate: identity known, nothing created yet.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            state: RwLock::new(AggregateState::new(id)),
            commands: Mutex::new(()),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, AggregateState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, AggregateState> {
        self.state.write().await
    }

    /// Serializes commands against this aggregate.
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.commands.lock().await
    }
}

/// Percent-encode each path segment of a resource URI.
pub fn escape_uri(uri: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return uri.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear();
        segments.extend(uri.split('/').filter(|s| !s.is_empty()));
    }
    url.path().to_string()
}

fn member_link(node: &PropertyNode) -> Option<String> {
    match node.get("@odata.id") {
        Some(PropertyNode::Scalar(Value::String(link))) => Some(link.clone()),
        _ => None,
    }
}
