// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Resource Tree Observer
//
// The only writer of the resource tree. Mappings follow committed lifecycle
// events:
// - ResourceCreated: forget whatever aggregate held the URI, then map it
// - ResourceRemoved: drop the aggregate, unmap the URI if it still points at
//   that aggregate, and close a plugin registered under the URI

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::events::ResourceEvent;
use crate::domain::repository::AggregateRepository;
use crate::domain::resource_tree::ResourceTree;
use crate::infrastructure::event_bus::EventHandler;
use crate::infrastructure::plugin_registry::PluginRegistry;

pub struct ResourceTreeObserver {
    tree: Arc<ResourceTree>,
    repository: Arc<dyn AggregateRepository>,
    plugins: Arc<PluginRegistry>,
}

impl ResourceTreeObserver {
    pub fn new(tree: Arc<ResourceTree>, repository: Arc<dyn AggregateRepository>, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            tree,
            repository,
            plugins,
        }
    }
}

#[async_trait]
impl EventHandler for ResourceTreeObserver {
    async fn handle(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::ResourceCreated { id, resource_uri, .. } => {
                if let Some(previous) = self.tree.lookup_exact(resource_uri).filter(|prev| prev != id) {
                    info!(uri = %resource_uri, old = %previous, new = %id, "Replacing resource at existing URI");
                    if let Err(e) = self.repository.remove(previous).await {
                        warn!(aggregate_id = %previous, error = %e, "Failed to drop replaced aggregate");
                    }
                }
                self.tree.set_mapping(resource_uri, *id);
                info!(uri = %resource_uri, aggregate_id = %id, "Resource mapped");
            }
            ResourceEvent::ResourceRemoved { id, resource_uri, .. } => {
                if let Err(e) = self.repository.remove(*id).await {
                    warn!(aggregate_id = %id, error = %e, "Failed to drop removed aggregate");
                }
                if self.tree.delete_mapping(resource_uri, *id) {
                    info!(uri = %resource_uri, aggregate_id = %id, "Resource unmapped");
                }
                self.plugins.close(resource_uri);
            }
            _ => {}
        }
    }
}
