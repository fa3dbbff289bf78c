// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::application::command_pipeline::CommandPipeline;
use crate::application::internal_commands::{Internal, UpdateProperties};
use crate::domain::context::CallContext;
use crate::domain::events::ResourceEvent;
use crate::domain::server_config::StaticProperties;
use crate::infrastructure::event_bus::EventHandler;

/// Merges configured properties into a resource as soon as it is created.
pub struct StaticPropertiesObserver {
    pipeline: Weak<CommandPipeline>,
    mappings: HashMap<String, Map<String, Value>>,
    timeout: Duration,
}

impl StaticPropertiesObserver {
    pub fn new(pipeline: Weak<CommandPipeline>, mappings: &[StaticProperties], timeout: Duration) -> Self {
        let mut merged: HashMap<String, Map<String, Value>> = HashMap::new();
        for mapping in mappings {
            merged
                .entry(mapping.uri.clone())
                .or_default()
                .extend(mapping.properties.clone());
        }
        Self {
            pipeline,
            mappings: merged,
            timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[async_trait]
impl EventHandler for StaticPropertiesObserver {
    async fn handle(&self, event: &ResourceEvent) {
        let ResourceEvent::ResourceCreated { id, resource_uri, .. } = event else {
            return;
        };
        let Some(properties) = self.mappings.get(resource_uri) else {
            return;
        };
        let Some(pipeline) = self.pipeline.upgrade() else {
            return;
        };
        info!(uri = %resource_uri, count = properties.len(), "Applying static properties");
        let command = Internal::boxed(UpdateProperties {
            id: *id,
            properties: properties.clone(),
        });
        if let Err(e) = pipeline
            .dispatch(command, &CallContext::with_timeout(self.timeout), None)
            .await
        {
            warn!(uri = %resource_uri, error = %e, "Static property update failed");
        }
    }
}
