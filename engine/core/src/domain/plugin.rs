// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Property Plugins
//!
//! Contracts for the pluggable resolvers named by `@meta` directives.
//!
//! A plugin declares at registration time which operations it supports by
//! the factory variant it registers with. The resolver then dispatches with a
//! `match` on [`PluginInstance`] instead of probing an instance for
//! capabilities at request time.
//!
//! | Capability | Trait | Used for |
//! |------------|-------|----------|
//! | read | [`PropertyReader`] | GET directives (and PATCH fallback) |
//! | read + write | [`PropertyPlugin`] | PATCH directives |
//! | close | `on_close` hook on the registration | resource teardown |

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::property::{PropertyNode, ResolveMode};

/// What a plugin is asked to resolve.
#[derive(Debug, Clone)]
pub struct PropertyRequest {
    pub resource_uri: String,
    /// `/`-separated path of the property inside the resource.
    pub property: String,
    pub mode: ResolveMode,
    /// Directive arguments other than `plugin` and `mandatory`.
    pub args: Map<String, Value>,
    /// Value held by the node before this resolution, if any.
    pub cached: Option<Value>,
    pub username: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin does not support {0}")]
    Unsupported(&'static str),

    #[error("plugin failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PropertyReader: Send + Sync {
    async fn read(&self, request: &PropertyRequest) -> Result<PropertyNode, PluginError>;
}

#[async_trait]
pub trait PropertyWriter: Send + Sync {
    /// Apply `value` to the backing state and return what the property now holds.
    async fn write(&self, request: &PropertyRequest, value: &Value) -> Result<PropertyNode, PluginError>;
}

/// Read-write plugin.
pub trait PropertyPlugin: PropertyReader + PropertyWriter {}

impl<T: PropertyReader + PropertyWriter> PropertyPlugin for T {}

/// Fresh plugin handle, tagged with what it can do.
#[derive(Clone)]
pub enum PluginInstance {
    ReadOnly(Arc<dyn PropertyReader>),
    ReadWrite(Arc<dyn PropertyPlugin>),
}

impl PluginInstance {
    pub fn can_write(&self) -> bool {
        matches!(self, PluginInstance::ReadWrite(_))
    }

    pub async fn read(&self, request: &PropertyRequest) -> Result<PropertyNode, PluginError> {
        match self {
            PluginInstance::ReadOnly(reader) => reader.read(request).await,
            PluginInstance::ReadWrite(plugin) => plugin.read(request).await,
        }
    }

    pub async fn write(&self, request: &PropertyRequest, value: &Value) -> Result<PropertyNode, PluginError> {
        match self {
            PluginInstance::ReadOnly(_) => Err(PluginError::Unsupported("write")),
            PluginInstance::ReadWrite(plugin) => plugin.write(request, value).await,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginInstance::ReadOnly(_) => f.write_str("PluginInstance::ReadOnly"),
            PluginInstance::ReadWrite(_) => f.write_str("PluginInstance::ReadWrite"),
        }
    }
}

/// Constructor registered under a plugin name.
#[derive(Clone)]
pub enum PluginFactory {
    ReadOnly(Arc<dyn Fn() -> Arc<dyn PropertyReader> + Send + Sync>),
    ReadWrite(Arc<dyn Fn() -> Arc<dyn PropertyPlugin> + Send + Sync>),
}

impl PluginFactory {
    pub fn read_only<F, P>(factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: PropertyReader + 'static,
    {
        Self::ReadOnly(Arc::new(move || Arc::new(factory()) as Arc<dyn PropertyReader>))
    }

    pub fn read_write<F, P>(factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: PropertyPlugin + 'static,
    {
        Self::ReadWrite(Arc::new(move || Arc::new(factory()) as Arc<dyn PropertyPlugin>))
    }

    pub fn instantiate(&self) -> PluginInstance {
        match self {
            PluginFactory::ReadOnly(make) => PluginInstance::ReadOnly(make()),
            PluginFactory::ReadWrite(make) => PluginInstance::ReadWrite(make()),
        }
    }
}

/// Full registration: factory plus optional teardown hook.
#[derive(Clone)]
pub struct PluginRegistration {
    pub factory: PluginFactory,
    pub on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl PluginRegistration {
    pub fn new(factory: PluginFactory) -> Self {
        Self {
            factory,
            on_close: None,
        }
    }

    pub fn with_close<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }
}
