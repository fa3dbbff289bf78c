// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Property Meta Resolver
//!
//! Walks a property tree and asks plugins for the value of every dynamic
//! node that carries a directive for the current mode, producing plain JSON.
//!
//! ## Bounds
//!
//! | Limit | Setting | On breach |
//! |-------|---------|-----------|
//! | children of one node in flight | `resolver.max_fanout` | queued |
//! | plugin calls in flight, all requests | `resolver.max_concurrent_plugins` | queued until the request deadline |
//! | nesting depth | `resolver.max_depth` | branch omitted |
//! | single plugin call | `resolver.plugin_timeout_ms` and the request deadline | property omitted |
//!
//! A dynamic node reached again below itself is omitted instead of resolved.
//!
//! ## Failure isolation
//!
//! An unregistered plugin, a plugin error, a panic inside a plugin or a
//! plugin timeout only drops the affected property. Two conditions fail the
//! whole resolution: cancellation of the request and an unavailable plugin on
//! a directive marked `mandatory`.
//!
//! ## Caching
//!
//! A read result is kept on the node as an ephemeral cached value: plugins
//! see it as `cached` on their next call, and a pass with no directive for
//! its mode serves it once. A written value is kept until replaced.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::domain::context::CallContext;
use crate::domain::plugin::{PluginInstance, PropertyRequest};
use crate::domain::property::{PropertyNode, ResolveMode};
use crate::domain::server_config::ResolverSettings;
use crate::infrastructure::plugin_registry::PluginRegistry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("property resolution cancelled")]
    Cancelled,

    #[error("mandatory plugin '{plugin}' unavailable for property '{property}'")]
    MandatoryPlugin { plugin: String, property: String },
}

/// One resolution pass over a resource.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub resource_uri: &'a str,
    pub mode: ResolveMode,
    /// Parsed PATCH document, mirrored key by key down the tree.
    pub body: Option<&'a Value>,
    pub username: Option<&'a str>,
    pub call: &'a CallContext,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub value: Value,
    /// Paths of the properties a plugin accepted a write for.
    pub written: Vec<String>,
}

struct Scope<'a> {
    resource_uri: &'a str,
    username: Option<&'a str>,
    call: &'a CallContext,
    written: parking_lot::Mutex<Vec<String>>,
}

impl<'a> Scope<'a> {
    fn new(request: &ResolveRequest<'a>) -> Self {
        Self {
            resource_uri: request.resource_uri,
            username: request.username,
            call: request.call,
            written: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

pub struct PropertyResolver {
    registry: Arc<PluginRegistry>,
    settings: ResolverSettings,
    permits: Arc<Semaphore>,
}

impl PropertyResolver {
    pub fn new(registry: Arc<PluginRegistry>, settings: ResolverSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_plugins.max(1)));
        Self {
            registry,
            settings,
            permits,
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Resolve and flatten a whole tree.
    pub async fn resolve(&self, root: &PropertyNode, request: ResolveRequest<'_>) -> Result<Resolution, ResolveError> {
        let scope = Scope::new(&request);
        let value = self
            .resolve_node(root, String::new(), request.mode, request.body, 0, Vec::new(), &scope)
            .await?
            .unwrap_or(Value::Null);
        Ok(Resolution {
            value,
            written: scope.written.into_inner(),
        })
    }

    /// Resolve the single property at `path`; `None` when absent or omitted.
    pub async fn resolve_path(
        &self,
        root: &PropertyNode,
        path: &[&str],
        request: ResolveRequest<'_>,
    ) -> Result<Option<Value>, ResolveError> {
        let Some(node) = root.get_path(path) else {
            return Ok(None);
        };
        let scope = Scope::new(&request);
        self.resolve_node(node, path.join("/"), request.mode, request.body, 0, Vec::new(), &scope)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_node<'a>(
        &'a self,
        node: &'a PropertyNode,
        path: String,
        mode: ResolveMode,
        body: Option<&'a Value>,
        depth: usize,
        ancestors: Vec<usize>,
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Option<Value>, ResolveError>> {
        Box::pin(async move {
            if scope.call.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            if depth > self.settings.max_depth {
                warn!(resource = %scope.resource_uri, property = %path, "Property nesting too deep, omitting");
                return Ok(None);
            }

            match node {
                PropertyNode::Scalar(value) => Ok(Some(value.clone())),

                PropertyNode::Object(map) => {
                    let pending: Vec<BoxFuture<'a, (&'a String, Result<Option<Value>, ResolveError>)>> = map
                        .iter()
                        .map(|(key, child)| {
                            let child_path = join_path(&path, key);
                            let child_body = body.and_then(|b| b.get(key));
                            let ancestors = ancestors.clone();
                            async move {
                                let value = self
                                    .resolve_node(child, child_path, mode, child_body, depth + 1, ancestors, scope)
                                    .await;
                                (key, value)
                            }
                            .boxed()
                        })
                        .collect();
                    let children: Vec<(&String, Result<Option<Value>, ResolveError>)> = futures::stream::iter(pending)
                        .buffer_unordered(self.settings.max_fanout.max(1))
                        .collect()
                        .await;

                    let mut out = Map::new();
                    for (key, value) in children {
                        if let Some(value) = value? {
                            out.insert(key.clone(), value);
                        }
                    }
                    Ok(Some(Value::Object(out)))
                }

                PropertyNode::Array(items) => {
                    let pending: Vec<BoxFuture<'a, Result<Option<Value>, ResolveError>>> = items
                        .iter()
                        .enumerate()
                        .map(|(index, child)| {
                            let child_path = join_path(&path, &index.to_string());
                            let child_body = body.and_then(|b| b.get(index));
                            self.resolve_node(child, child_path, mode, child_body, depth + 1, ancestors.clone(), scope)
                        })
                        .collect();
                    let children: Vec<Result<Option<Value>, ResolveError>> = futures::stream::iter(pending)
                        .buffered(self.settings.max_fanout.max(1))
                        .collect()
                        .await;

                    let mut out = Vec::with_capacity(children.len());
                    for value in children {
                        out.push(value?.unwrap_or(Value::Null));
                    }
                    Ok(Some(Value::Array(out)))
                }

                PropertyNode::Dynamic(dynamic) => {
                    let identity = dynamic.identity();
                    if ancestors.contains(&identity) {
                        warn!(resource = %scope.resource_uri, property = %path, "Dynamic property refers to itself, omitting");
                        return Ok(None);
                    }
                    let mut ancestors = ancestors;
                    ancestors.push(identity);

                    let meta = dynamic.meta();
                    let (directive, write_value) = match (mode, body, meta.patch.as_ref()) {
                        (ResolveMode::Patch, Some(value), Some(patch)) => (Some(patch), Some(value)),
                        _ => (meta.get.as_ref(), None),
                    };

                    let mut state = dynamic.lock().await;

                    let Some(directive) = directive else {
                        let value = match &state.cached {
                            Some(cached) => {
                                self.resolve_node(cached, path, ResolveMode::Get, None, depth + 1, ancestors, scope)
                                    .await?
                            }
                            None => None,
                        };
                        if state.ephemeral {
                            state.cached = None;
                        }
                        return Ok(value);
                    };

                    let plugin_name = directive
                        .plugin
                        .clone()
                        .unwrap_or_else(|| scope.resource_uri.to_string());
                    let plugin = match self.registry.instantiate(&plugin_name) {
                        Ok(plugin) => plugin,
                        Err(_) if directive.mandatory => {
                            return Err(ResolveError::MandatoryPlugin {
                                plugin: plugin_name,
                                property: path,
                            });
                        }
                        Err(e) => {
                            warn!(
                                resource = %scope.resource_uri,
                                property = %path,
                                error = %e,
                                "Orphan property, plugin not registered"
                            );
                            return Ok(None);
                        }
                    };

                    let request = PropertyRequest {
                        resource_uri: scope.resource_uri.to_string(),
                        property: path.clone(),
                        mode: if write_value.is_some() {
                            ResolveMode::Patch
                        } else {
                            ResolveMode::Get
                        },
                        args: directive.args.clone(),
                        cached: state.cached.as_ref().map(PropertyNode::snapshot),
                        username: scope.username.map(str::to_string),
                    };

                    let Some(result) = self
                        .invoke(&plugin_name, &plugin, &request, write_value, scope.call)
                        .await?
                    else {
                        return Ok(None);
                    };

                    let value = self
                        .resolve_node(&result, path.clone(), ResolveMode::Get, None, depth + 1, ancestors, scope)
                        .await?;

                    state.cached = value.clone().map(PropertyNode::from_json);
                    state.ephemeral = write_value.is_none();
                    if write_value.is_some() {
                        scope.written.lock().push(path);
                    }
                    Ok(value)
                }
            }
        })
    }

    /// One bounded, panic-contained plugin call. `Ok(None)` means the call
    /// failed and the property should be omitted.
    async fn invoke(
        &self,
        name: &str,
        plugin: &PluginInstance,
        request: &PropertyRequest,
        write_value: Option<&Value>,
        call: &CallContext,
    ) -> Result<Option<PropertyNode>, ResolveError> {
        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| ResolveError::Cancelled)?,
            _ = call.cancelled() => return Err(ResolveError::Cancelled),
            _ = tokio::time::sleep_until(call.deadline()) => return Err(ResolveError::Cancelled),
        };

        let budget = self.settings.plugin_timeout().min(call.remaining());
        let call_plugin = async {
            match write_value {
                Some(value) => plugin.write(request, value).await,
                None => plugin.read(request).await,
            }
        };

        match tokio::time::timeout(budget, AssertUnwindSafe(call_plugin).catch_unwind()).await {
            Ok(Ok(Ok(node))) => Ok(Some(node)),
            Ok(Ok(Err(e))) => {
                warn!(plugin = %name, property = %request.property, error = %e, "Plugin failed, omitting property");
                record_failure(name);
                Ok(None)
            }
            Ok(Err(panic)) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(plugin = %name, property = %request.property, reason = %reason, "Plugin panicked, omitting property");
                record_failure(name);
                Ok(None)
            }
            Err(_) => {
                if call.is_cancelled() {
                    return Err(ResolveError::Cancelled);
                }
                warn!(plugin = %name, property = %request.property, timeout_ms = budget.as_millis() as u64, "Plugin timed out, omitting property");
                record_failure(name);
                Ok(None)
            }
        }
    }
}

fn record_failure(plugin: &str) {
    metrics::counter!("redfish_plugin_failures_total", "plugin" => plugin.to_string()).increment(1);
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}/{key}")
    }
}
