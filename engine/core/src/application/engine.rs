// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Composition root.
//!
//! [`RedfishEngine`] owns one instance of every collaborator and wires the
//! observers onto the main bus in a fixed order: resource tree, collection
//! membership, static properties. The tree observer must run first so that
//! later observers already see the new mapping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::application::aggregate_store::AggregateStore;
use crate::application::collections::CollectionMembership;
use crate::application::command::{Command, CommandError, CommandRegistry, HttpBody, HttpResult};
use crate::application::command_pipeline::CommandPipeline;
use crate::application::http_commands::register_http_commands;
use crate::application::internal_commands::{
    register_internal_commands, CreateResource, InjectEvent, Internal, INTERNAL_PREFIX,
};
use crate::application::resolver::PropertyResolver;
use crate::application::resource_handler::{HandlerError, ResourceHandler, ResourceRequest, ResourceResponse};
use crate::application::static_properties::StaticPropertiesObserver;
use crate::application::tree_observer::ResourceTreeObserver;
use crate::domain::aggregate::{AggregateId, ResourceDefinition};
use crate::domain::context::CallContext;
use crate::domain::repository::AggregateRepository;
use crate::domain::resource_tree::ResourceTree;
use crate::domain::server_config::ServerConfig;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::plugin_registry::{PluginRegistry, RegistryError};
use crate::infrastructure::plugins::{register_builtin, KvStore};
use crate::infrastructure::repositories::InMemoryAggregateRepository;

pub struct RedfishEngine {
    config: ServerConfig,
    tree: Arc<ResourceTree>,
    repository: Arc<dyn AggregateRepository>,
    bus: EventBus,
    plugins: Arc<PluginRegistry>,
    kv: KvStore,
    commands: Arc<CommandRegistry>,
    pipeline: Arc<CommandPipeline>,
    handler: Arc<ResourceHandler>,
    collections: Arc<CollectionMembership>,
    started_at: Instant,
}

impl RedfishEngine {
    /// Engine over the in-memory repository.
    pub fn new(config: ServerConfig) -> Result<Self, RegistryError> {
        Self::with_repository(config, Arc::new(InMemoryAggregateRepository::new()))
    }

    /// Fails only on duplicate registrations, which are startup bugs.
    pub fn with_repository(config: ServerConfig, repository: Arc<dyn AggregateRepository>) -> Result<Self, RegistryError> {
        let queue_len = config.events.waiter_queue_len;
        let bus = EventBus::new("main", queue_len);
        let results = EventBus::new("results", queue_len);
        let tree = Arc::new(ResourceTree::new());

        let plugins = Arc::new(PluginRegistry::new());
        let kv = KvStore::new();
        register_builtin(&plugins, &kv)?;

        let commands = Arc::new(CommandRegistry::new());
        register_http_commands(&commands)?;
        register_internal_commands(&commands)?;

        let store = Arc::new(AggregateStore::new(repository.clone(), bus.clone()));
        let resolver = Arc::new(PropertyResolver::new(plugins.clone(), config.resolver.clone()));
        let pipeline = Arc::new(CommandPipeline::new(store.clone(), results, resolver.clone()));

        let timeout = config.server.request_timeout();
        bus.subscribe(Arc::new(ResourceTreeObserver::new(
            tree.clone(),
            repository.clone(),
            plugins.clone(),
        )));
        let collections = Arc::new(CollectionMembership::new(Arc::downgrade(&pipeline), timeout));
        bus.subscribe(collections.clone());
        let static_properties =
            StaticPropertiesObserver::new(Arc::downgrade(&pipeline), &config.static_properties, timeout);
        if !static_properties.is_empty() {
            bus.subscribe(Arc::new(static_properties));
        }

        let handler = Arc::new(ResourceHandler::new(
            tree.clone(),
            store,
            commands.clone(),
            pipeline.clone(),
            resolver,
            bus.clone(),
            config.server.clone(),
        ));

        info!(
            plugins = plugins.names().len(),
            commands = commands.names().len(),
            "Resource engine initialized"
        );

        Ok(Self {
            config,
            tree,
            repository,
            bus,
            plugins,
            kv,
            commands,
            pipeline,
            handler,
            collections,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    pub fn repository(&self) -> &Arc<dyn AggregateRepository> {
        &self.repository
    }

    /// Main bus carrying committed resource events.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn results_bus(&self) -> &EventBus {
        self.pipeline.results_bus()
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn pipeline(&self) -> &Arc<CommandPipeline> {
        &self.pipeline
    }

    pub fn handler(&self) -> &Arc<ResourceHandler> {
        &self.handler
    }

    pub fn collections(&self) -> &Arc<CollectionMembership> {
        &self.collections
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn handle(&self, request: ResourceRequest) -> Result<ResourceResponse, HandlerError> {
        self.handler.handle(request).await
    }

    /// Dispatch under the configured request deadline with no caller identity.
    pub async fn dispatch(&self, command: Box<dyn Command>) -> Result<Option<HttpResult>, CommandError> {
        let call = CallContext::with_timeout(self.config.server.request_timeout());
        self.pipeline.dispatch(command, &call, None).await
    }

    /// Run an internal command by name, with or without the `internal:`
    /// prefix, decoding its payload from `body`.
    pub async fn run_internal(&self, name: &str, body: &HttpBody) -> Result<Option<HttpResult>, CommandError> {
        let name = if name.starts_with(INTERNAL_PREFIX) {
            name.to_string()
        } else {
            format!("{INTERNAL_PREFIX}{name}")
        };
        let mut command = self
            .commands
            .instantiate(&name)
            .map_err(|e| CommandError::Invalid(e.to_string()))?;
        if !body.is_empty() {
            command.parse_http_body(body)?;
        }
        self.dispatch(command).await
    }

    pub async fn create_resource(&self, definition: ResourceDefinition) -> Result<AggregateId, CommandError> {
        let id = AggregateId::new();
        self.dispatch(Internal::boxed(CreateResource { id, definition })).await?;
        Ok(id)
    }

    /// Create every configured seed resource, in order.
    pub async fn seed_resources(&self) -> Result<usize, CommandError> {
        for definition in self.config.resources.clone() {
            let uri = definition.resource_uri.clone();
            let id = self.create_resource(definition).await?;
            info!(uri = %uri, aggregate_id = %id, "Seeded resource");
        }
        Ok(self.config.resources.len())
    }

    /// Publish the configured startup events. Failures are logged and skipped.
    pub async fn inject_startup_events(&self) -> usize {
        let mut injected = 0;
        for event in &self.config.startup_events {
            let command = Internal::boxed(InjectEvent {
                name: event.name.clone(),
                data: event.data.clone(),
            });
            match self.dispatch(command).await {
                Ok(_) => injected += 1,
                Err(e) => warn!(event = %event.name, error = %e, "Startup event injection failed"),
            }
        }
        injected
    }

    /// Seed resources, then announce startup.
    pub async fn start(&self) -> Result<(), CommandError> {
        let seeded = self.seed_resources().await?;
        let injected = self.inject_startup_events().await;
        info!(seeded, injected, resources = self.tree.len(), "Resource engine started");
        Ok(())
    }
}
