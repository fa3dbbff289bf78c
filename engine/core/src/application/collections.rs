// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Automatic collection membership.
//!
//! A resource created directly below a live collection is added to that
//! collection's `Members`; removing it takes it out again. Collections are
//! remembered from their own `ResourceCreated` event, so members created
//! before their collection are not picked up.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::application::command::Command;
use crate::application::command_pipeline::CommandPipeline;
use crate::application::internal_commands::{AddCollectionMember, Internal, RemoveCollectionMember};
use crate::domain::aggregate::AggregateId;
use crate::domain::context::CallContext;
use crate::domain::events::ResourceEvent;
use crate::infrastructure::event_bus::EventHandler;

pub struct CollectionMembership {
    pipeline: Weak<CommandPipeline>,
    collections: DashMap<String, AggregateId>,
    timeout: Duration,
}

impl CollectionMembership {
    pub fn new(pipeline: Weak<CommandPipeline>, timeout: Duration) -> Self {
        Self {
            pipeline,
            collections: DashMap::new(),
            timeout,
        }
    }

    pub fn is_collection(&self, uri: &str) -> bool {
        self.collections.contains_key(uri)
    }

    fn parent_collection(&self, uri: &str) -> Option<AggregateId> {
        let (parent, _) = uri.trim_end_matches('/').rsplit_once('/')?;
        if parent.is_empty() {
            return None;
        }
        self.collections.get(parent).map(|entry| *entry.value())
    }

    async fn dispatch(&self, command: Box<dyn Command>) {
        let Some(pipeline) = self.pipeline.upgrade() else {
            return;
        };
        let call = CallContext::with_timeout(self.timeout);
        if let Err(e) = pipeline.dispatch(command, &call, None).await {
            warn!(error = %e, "Collection membership update failed");
        }
    }
}

#[async_trait]
impl EventHandler for CollectionMembership {
    async fn handle(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::ResourceCreated {
                id,
                resource_uri,
                collection,
                ..
            } => {
                if *collection {
                    self.collections.insert(resource_uri.clone(), *id);
                }
                if let Some(parent) = self.parent_collection(resource_uri) {
                    debug!(member = %resource_uri, collection = %parent, "Adding collection member");
                    self.dispatch(Internal::boxed(AddCollectionMember {
                        id: parent,
                        member_uri: resource_uri.clone(),
                    }))
                    .await;
                }
            }
            ResourceEvent::ResourceRemoved { id, resource_uri, .. } => {
                self.collections
                    .remove_if(resource_uri, |_, current| current == id);
                if let Some(parent) = self.parent_collection(resource_uri) {
                    debug!(member = %resource_uri, collection = %parent, "Removing collection member");
                    self.dispatch(Internal::boxed(RemoveCollectionMember {
                        id: parent,
                        member_uri: resource_uri.clone(),
                    }))
                    .await;
                }
            }
            _ => {}
        }
    }
}
