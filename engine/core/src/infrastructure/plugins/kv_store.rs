// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-write plugin keeping values in a shared map.
//!
//! The key is the directive's `key` argument, or `<resource>#<property>` when
//! absent. A key that was never written reads back as the node's previous
//! value.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::domain::plugin::{PluginError, PluginFactory, PropertyReader, PropertyRequest, PropertyWriter};
use crate::domain::property::PropertyNode;

pub const PLUGIN_NAME: &str = "kv";

#[derive(Clone, Default)]
pub struct KvStore {
    values: Arc<DashMap<String, Value>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Factory handing out plugins that share this store.
    pub fn factory(&self) -> PluginFactory {
        let store = self.clone();
        PluginFactory::read_write(move || KvPlugin {
            store: store.clone(),
        })
    }
}

pub struct KvPlugin {
    store: KvStore,
}

fn key_for(request: &PropertyRequest) -> String {
    match request.args.get("key").and_then(Value::as_str) {
        Some(key) => key.to_string(),
        None => format!("{}#{}", request.resource_uri, request.property),
    }
}

#[async_trait]
impl PropertyReader for KvPlugin {
    async fn read(&self, request: &PropertyRequest) -> Result<PropertyNode, PluginError> {
        let value = self
            .store
            .get(&key_for(request))
            .or_else(|| request.cached.clone())
            .unwrap_or(Value::Null);
        Ok(PropertyNode::from_json(value))
    }
}

#[async_trait]
impl PropertyWriter for KvPlugin {
    async fn write(&self, request: &PropertyRequest, value: &Value) -> Result<PropertyNode, PluginError> {
        self.store.set(key_for(request), value.clone());
        Ok(PropertyNode::from_json(value.clone()))
    }
}
