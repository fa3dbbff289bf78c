// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Command Pipeline - load → handle → commit → publish
//
// Per command:
// 1. load the target aggregate (synthesized when unknown)
// 2. take the aggregate's command lock when the command is serialized
// 3. run the command
// 4. persist and drain the pending buffer (skipped when the command does not save)
// 5. release the command lock
// 6. publish the drained events on the main bus, in order
// 7. publish the HTTP result, if any, on the results bus
//
// Observers run inside step 6 and may dispatch further commands, so no
// aggregate lock may be held there.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::application::aggregate_store::AggregateStore;
use crate::application::command::{Command, CommandContext, CommandError, HttpResult};
use crate::application::resolver::PropertyResolver;
use crate::domain::authorization::Principal;
use crate::domain::context::CallContext;
use crate::domain::events::ResourceEvent;
use crate::infrastructure::event_bus::EventBus;

pub struct CommandPipeline {
    store: Arc<AggregateStore>,
    results: EventBus,
    resolver: Arc<PropertyResolver>,
}

impl CommandPipeline {
    pub fn new(store: Arc<AggregateStore>, results: EventBus, resolver: Arc<PropertyResolver>) -> Self {
        Self {
            store,
            results,
            resolver,
        }
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    pub fn results_bus(&self) -> &EventBus {
        &self.results
    }

    /// Run `command` to completion. The returned result has already been
    /// published on the results bus when the command carries a correlation id.
    pub async fn dispatch(
        &self,
        command: Box<dyn Command>,
        call: &CallContext,
        principal: Option<Principal>,
    ) -> Result<Option<HttpResult>, CommandError> {
        let aggregate = match command.aggregate_id() {
            Some(id) => Some(self.store.load(id).await?),
            None => None,
        };
        debug!(
            command = command.command_type(),
            aggregate_id = ?command.aggregate_id(),
            command_id = ?command.command_id(),
            "Dispatching command"
        );

        let guard = match &aggregate {
            Some(aggregate) if command.serialized() => Some(aggregate.lock_commands().await),
            _ => None,
        };

        let ctx = CommandContext {
            call: call.clone(),
            resolver: self.resolver.clone(),
            principal,
        };
        let output = match command.handle(aggregate.as_ref(), &ctx).await {
            Ok(output) => output,
            Err(e) => {
                if let Some(aggregate) = &aggregate {
                    let discarded = aggregate.write().await.take_pending();
                    if !discarded.is_empty() {
                        debug!(count = discarded.len(), "Discarding events of failed command");
                    }
                }
                warn!(command = command.command_type(), error = %e, "Command rejected");
                return Err(e);
            }
        };

        let events = match &aggregate {
            Some(aggregate) if command.should_save() => self.store.commit(aggregate, output.events).await?,
            _ => output.events,
        };
        drop(guard);

        self.store.publish(events).await;

        if let (Some(command_id), Some(result)) = (command.command_id(), &output.result) {
            self.results
                .publish(ResourceEvent::HttpCommandProcessed {
                    command_id,
                    status: result.status,
                    results: result.results.clone(),
                    headers: result.headers.clone(),
                    processed_at: Utc::now(),
                })
                .await;
        }
        Ok(output.result)
    }
}
