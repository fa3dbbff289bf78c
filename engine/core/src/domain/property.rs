// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Property Nodes
//!
//! Recursive value representation backing every resource.
//!
//! | Variant | Holds | Resolution |
//! |---------|-------|------------|
//! | `Scalar` | a JSON primitive | returned as-is |
//! | `Object` | named children | children resolved independently |
//! | `Array` | ordered children | children resolved in order |
//! | `Dynamic` | meta directives + cached value | plugin named by the directive |
//!
//! A JSON document becomes a node tree through [`PropertyNode::from_json`].
//! Keys ending in `@meta` are not properties themselves; they carry the
//! GET/PATCH directives of the sibling property with the same prefix and turn
//! that sibling into a `Dynamic` node.
//!
//! ## Locking
//!
//! The owning aggregate guards the whole tree with a reader-writer lock. Each
//! `Dynamic` node carries its own async mutex for the cached value. Always
//! acquire the aggregate lock first. The synchronous mutators below use
//! `try_lock` on dynamic nodes and rely on the caller holding the aggregate
//! write lock, which excludes any resolver holding a node lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, MutexGuard};

/// Suffix marking a meta companion key in a property document.
pub const META_SUFFIX: &str = "@meta";

/// Which directive of a dynamic node applies to a resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMode {
    Get,
    Patch,
}

impl ResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveMode::Get => "GET",
            ResolveMode::Patch => "PATCH",
        }
    }
}

/// One GET or PATCH directive from a `@meta` companion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDirective {
    /// Plugin to invoke. `None` means "the plugin registered under the
    /// owning resource's URI".
    pub plugin: Option<String>,
    /// A missing plugin fails the whole request instead of omitting the property.
    pub mandatory: bool,
    /// Every other key of the directive, handed to the plugin untouched.
    pub args: Map<String, Value>,
}

impl MetaDirective {
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut args = map.clone();
        let plugin = match args.remove("plugin") {
            Some(Value::String(name)) => Some(name),
            _ => None,
        };
        let mandatory = matches!(args.remove("mandatory"), Some(Value::Bool(true)));
        Some(Self {
            plugin,
            mandatory,
            args,
        })
    }

    fn to_value(&self) -> Value {
        let mut map = self.args.clone();
        if let Some(plugin) = &self.plugin {
            map.insert("plugin".to_string(), Value::String(plugin.clone()));
        }
        if self.mandatory {
            map.insert("mandatory".to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

/// Directives of a dynamic node, keyed by mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMeta {
    pub get: Option<MetaDirective>,
    pub patch: Option<MetaDirective>,
}

impl PropertyMeta {
    pub fn from_value(value: &Value) -> Self {
        Self {
            get: value.get("GET").and_then(MetaDirective::from_value),
            patch: value.get("PATCH").and_then(MetaDirective::from_value),
        }
    }

    pub fn directive(&self, mode: ResolveMode) -> Option<&MetaDirective> {
        match mode {
            ResolveMode::Get => self.get.as_ref(),
            ResolveMode::Patch => self.patch.as_ref(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(get) = &self.get {
            map.insert("GET".to_string(), get.to_value());
        }
        if let Some(patch) = &self.patch {
            map.insert("PATCH".to_string(), patch.to_value());
        }
        Value::Object(map)
    }
}

/// Mutable part of a dynamic node.
#[derive(Debug, Default)]
pub struct DynamicState {
    pub cached: Option<PropertyNode>,
    /// Discard `cached` after it has been read once.
    pub ephemeral: bool,
}

#[derive(Debug)]
pub struct DynamicNode {
    meta: PropertyMeta,
    state: Mutex<DynamicState>,
}

impl DynamicNode {
    pub fn new(meta: PropertyMeta, initial: Option<PropertyNode>) -> Arc<Self> {
        Arc::new(Self {
            meta,
            state: Mutex::new(DynamicState {
                cached: initial,
                ephemeral: false,
            }),
        })
    }

    pub fn meta(&self) -> &PropertyMeta {
        &self.meta
    }

    pub async fn lock(&self) -> MutexGuard<'_, DynamicState> {
        self.state.lock().await
    }

    /// Stable identity of this node, used for cycle detection.
    pub fn identity(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    fn take_cached(&self) -> Option<PropertyNode> {
        self.state.try_lock().ok().and_then(|mut state| state.cached.take())
    }
}

/// Recursive property value.
/// Outcome of [`PropertyNode::set_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathUpdate {
    Set,
    Missing,
    /// The target is a dynamic node whose state is locked by a resolution.
    Busy,
}

#[derive(Debug)]
pub enum PropertyNode {
    Scalar(Value),
    Object(BTreeMap<String, PropertyNode>),
    Array(Vec<PropertyNode>),
    Dynamic(Arc<DynamicNode>),
}

impl Default for PropertyNode {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl PropertyNode {
    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    pub fn dynamic(meta: PropertyMeta, initial: Option<PropertyNode>) -> Self {
        Self::Dynamic(DynamicNode::new(meta, initial))
    }

    /// Build a node tree from a JSON document, folding `<key>@meta`
    /// companions into dynamic nodes.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            other => Self::Scalar(other),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let mut children = BTreeMap::new();
        let mut metas = Vec::new();
        for (key, value) in map {
            match key.strip_suffix(META_SUFFIX) {
                Some(name) if !name.is_empty() => metas.push((name.to_string(), value)),
                _ => {
                    children.insert(key, Self::from_json(value));
                }
            }
        }
        for (name, meta) in metas {
            let initial = children.remove(&name);
            children.insert(name, Self::dynamic(PropertyMeta::from_value(&meta), initial));
        }
        Self::Object(children)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, PropertyNode>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, PropertyNode>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyNode> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Insert a child. Returns `false` when this node is not an object.
    pub fn insert(&mut self, key: impl Into<String>, node: PropertyNode) -> bool {
        match self.as_object_mut() {
            Some(map) => {
                map.insert(key.into(), node);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyNode> {
        self.as_object_mut().and_then(|map| map.remove(key))
    }

    /// Walk a `/`-separated path through objects and array indices.
    pub fn get_path(&self, path: &[&str]) -> Option<&PropertyNode> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        let child = match self {
            Self::Object(map) => map.get(*head),
            Self::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }?;
        child.get_path(rest)
    }

    fn get_path_mut(&mut self, path: &[&str]) -> Option<&mut PropertyNode> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        let child = match self {
            Self::Object(map) => map.get_mut(*head),
            Self::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }?;
        child.get_path_mut(rest)
    }

    /// Replace the value of an existing leaf. A dynamic leaf keeps its
    /// directives and only has its cached value replaced.
    pub fn set_path(&mut self, path: &[&str], value: Value) -> PathUpdate {
        let Some(target) = self.get_path_mut(path) else {
            return PathUpdate::Missing;
        };
        match target {
            Self::Dynamic(dynamic) => match dynamic.state.try_lock() {
                Ok(mut state) => {
                    state.cached = Some(Self::from_json(value));
                    state.ephemeral = false;
                    PathUpdate::Set
                }
                // Held by an in-flight resolution of the same node.
                Err(_) => PathUpdate::Busy,
            },
            other => {
                *other = Self::from_json(value);
                PathUpdate::Set
            }
        }
    }

    /// Deep-merge `other` into `self`: objects merge key by key, anything
    /// else is replaced.
    pub fn merge(&mut self, other: PropertyNode) {
        match (self, other) {
            (Self::Object(mine), Self::Object(theirs)) => {
                for (key, node) in theirs {
                    match mine.get_mut(&key) {
                        Some(existing) => existing.merge(node),
                        None => {
                            mine.insert(key, node);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }

    /// Attach directives to top-level children. An existing dynamic child
    /// keeps its cached value. Returns the names that gained new directives.
    pub fn apply_meta(&mut self, meta: &Map<String, Value>) -> Vec<String> {
        let Some(map) = self.as_object_mut() else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (name, directives) in meta {
            let initial = match map.remove(name) {
                Some(Self::Dynamic(existing)) => existing.take_cached(),
                Some(node) => Some(node),
                None => None,
            };
            map.insert(
                name.clone(),
                Self::dynamic(PropertyMeta::from_value(directives), initial),
            );
            changed.push(name.clone());
        }
        changed
    }

    pub fn has_dynamic(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Dynamic(_) => true,
            Self::Object(map) => map.values().any(Self::has_dynamic),
            Self::Array(items) => items.iter().any(Self::has_dynamic),
        }
    }

    /// Synchronous, non-consuming view of the tree. Dynamic nodes report their
    /// cached value (or null when empty or busy); ephemeral caches are kept.
    pub fn snapshot(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, node)| (key.clone(), node.snapshot()))
                    .collect(),
            ),
            Self::Array(items) => Value::Array(items.iter().map(Self::snapshot).collect()),
            Self::Dynamic(dynamic) => match dynamic.state.try_lock() {
                Ok(state) => state.cached.as_ref().map(Self::snapshot).unwrap_or(Value::Null),
                Err(_) => Value::Null,
            },
        }
    }

    /// Reduce the tree to plain JSON. Reading an ephemeral dynamic node
    /// discards its cached value.
    pub fn flatten(&self) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            match self {
                Self::Scalar(value) => value.clone(),
                Self::Object(map) => {
                    let mut out = Map::new();
                    for (key, node) in map {
                        out.insert(key.clone(), node.flatten().await);
                    }
                    Value::Object(out)
                }
                Self::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for node in items {
                        out.push(node.flatten().await);
                    }
                    Value::Array(out)
                }
                Self::Dynamic(dynamic) => {
                    let mut state = dynamic.lock().await;
                    let value = match &state.cached {
                        Some(node) => node.flatten().await,
                        None => Value::Null,
                    };
                    if state.ephemeral {
                        state.cached = None;
                    }
                    value
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_companion_becomes_dynamic() {
        let node = PropertyNode::from_json(json!({
            "PowerState": "On",
            "PowerState@meta": {"GET": {"plugin": "power", "key": "state"}},
            "Name": "System"
        }));

        let map = node.as_object().unwrap();
        assert_eq!(map.len(), 2);
        let PropertyNode::Dynamic(dynamic) = &map["PowerState"] else {
            panic!("expected dynamic node");
        };
        let get = dynamic.meta().get.as_ref().unwrap();
        assert_eq!(get.plugin.as_deref(), Some("power"));
        assert_eq!(get.args["key"], json!("state"));
        assert!(dynamic.meta().patch.is_none());
        assert_eq!(node.snapshot()["PowerState"], json!("On"));
    }

    #[test]
    fn test_meta_without_value_starts_empty() {
        let node = PropertyNode::from_json(json!({
            "Reading@meta": {"GET": {"plugin": "sensor", "mandatory": true}}
        }));
        let PropertyNode::Dynamic(dynamic) = node.get("Reading").unwrap() else {
            panic!("expected dynamic node");
        };
        assert!(dynamic.meta().get.as_ref().unwrap().mandatory);
        assert_eq!(node.snapshot()["Reading"], Value::Null);
    }

    #[test]
    fn test_merge_is_deep_for_objects() {
        let mut node = PropertyNode::from_json(json!({
            "Status": {"State": "Enabled", "Health": "OK"},
            "Tags": [1, 2]
        }));
        node.merge(PropertyNode::from_json(json!({
            "Status": {"Health": "Critical"},
            "Tags": [3]
        })));

        assert_eq!(
            node.snapshot(),
            json!({"Status": {"State": "Enabled", "Health": "Critical"}, "Tags": [3]})
        );
    }

    #[test]
    fn test_set_path_only_touches_existing_leaves() {
        let mut node = PropertyNode::from_json(json!({
            "Status": {"Health": "OK"},
            "Members": [{"Name": "a"}]
        }));

        assert_eq!(node.set_path(&["Status", "Health"], json!("Warning")), PathUpdate::Set);
        assert_eq!(node.set_path(&["Members", "0", "Name"], json!("b")), PathUpdate::Set);
        assert_eq!(node.set_path(&["Status", "Missing"], json!(1)), PathUpdate::Missing);

        let snapshot = node.snapshot();
        assert_eq!(snapshot["Status"]["Health"], json!("Warning"));
        assert_eq!(snapshot["Members"][0]["Name"], json!("b"));
        assert!(snapshot["Status"].get("Missing").is_none());
    }

    #[tokio::test]
    async fn test_set_path_reports_locked_dynamic_leaf() {
        let mut node = PropertyNode::from_json(json!({
            "AssetTag": "a",
            "AssetTag@meta": {"GET": {"plugin": "kv"}}
        }));
        let Some(PropertyNode::Dynamic(dynamic)) = node.get("AssetTag") else {
            panic!("AssetTag should be dynamic");
        };
        let dynamic = dynamic.clone();

        let guard = dynamic.lock().await;
        assert_eq!(node.set_path(&["AssetTag"], json!("b")), PathUpdate::Busy);
        drop(guard);
        assert_eq!(node.set_path(&["AssetTag"], json!("b")), PathUpdate::Set);
        assert_eq!(node.snapshot()["AssetTag"], json!("b"));
    }

    #[test]
    fn test_apply_meta_keeps_existing_value() {
        let mut node = PropertyNode::from_json(json!({"AssetTag": "rack-7"}));
        let changed = node.apply_meta(
            json!({"AssetTag": {"PATCH": {"plugin": "kv"}}})
                .as_object()
                .unwrap(),
        );
        assert_eq!(changed, vec!["AssetTag".to_string()]);
        assert_eq!(node.snapshot()["AssetTag"], json!("rack-7"));
        assert!(node.has_dynamic());
    }

    #[tokio::test]
    async fn test_flatten_discards_ephemeral_cache() {
        let node = PropertyNode::dynamic(PropertyMeta::default(), None);
        let PropertyNode::Dynamic(dynamic) = &node else {
            unreachable!()
        };
        {
            let mut state = dynamic.lock().await;
            state.cached = Some(PropertyNode::Scalar(json!(42)));
            state.ephemeral = true;
        }

        assert_eq!(node.flatten().await, json!(42));
        assert_eq!(node.flatten().await, Value::Null);
    }

    #[test]
    fn test_meta_round_trips_to_json() {
        let raw = json!({"GET": {"plugin": "kv", "key": "x"}, "PATCH": {"plugin": "kv", "mandatory": true}});
        let meta = PropertyMeta::from_value(&raw);
        assert_eq!(meta.to_value(), raw);
    }
}
