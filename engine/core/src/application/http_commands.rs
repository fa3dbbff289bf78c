// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Default commands behind each HTTP verb.
//!
//! Registered as `http:RedfishResource:<METHOD>`. A resource can override any
//! of them by registering `<ResourceURI>:<METHOD>` or `<Plugin>:<METHOD>`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::application::command::{
    error_body, Command, CommandContext, CommandError, CommandOutput, CommandRegistry, HttpBody, HttpResult,
};
use crate::application::resolver::ResolveRequest;
use crate::domain::aggregate::{Aggregate, AggregateId, HttpMethod};
use crate::domain::events::{CommandId, ResourceEvent};
use crate::domain::property::ResolveMode;
use crate::infrastructure::plugin_registry::RegistryError;

pub const HTTP_COMMAND_PREFIX: &str = "http:RedfishResource";

/// Short alias still accepted in the command search list.
pub const LEGACY_COMMAND_PREFIX: &str = "R";

pub fn http_command_name(method: HttpMethod) -> String {
    format!("{HTTP_COMMAND_PREFIX}:{method}")
}

/// Ids the dispatcher hands to every HTTP command.
#[derive(Debug, Clone, Copy, Default)]
struct Correlation {
    command_id: Option<CommandId>,
    aggregate_id: Option<AggregateId>,
}

fn target<'a>(aggregate: Option<&'a Arc<Aggregate>>, command: &str) -> Result<&'a Arc<Aggregate>, CommandError> {
    aggregate.ok_or_else(|| CommandError::MissingAggregate(command.to_string()))
}

fn username(ctx: &CommandContext) -> Option<&str> {
    ctx.principal.as_ref().map(|p| p.username.as_str())
}

pub struct HttpGet {
    name: String,
    ids: Correlation,
}

impl HttpGet {
    pub fn new() -> Self {
        Self {
            name: http_command_name(HttpMethod::Get),
            ids: Correlation::default(),
        }
    }
}

impl Default for HttpGet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for HttpGet {
    fn command_type(&self) -> &str {
        &self.name
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.ids.aggregate_id
    }

    fn command_id(&self) -> Option<CommandId> {
        self.ids.command_id
    }

    fn set_ids(&mut self, command_id: CommandId, aggregate_id: AggregateId) {
        self.ids = Correlation {
            command_id: Some(command_id),
            aggregate_id: Some(aggregate_id),
        };
    }

    fn serialized(&self) -> bool {
        false
    }

    fn should_save(&self) -> bool {
        false
    }

    async fn handle(&self, aggregate: Option<&Arc<Aggregate>>, ctx: &CommandContext) -> Result<CommandOutput, CommandError> {
        let aggregate = target(aggregate, &self.name)?;
        let state = aggregate.read().await;
        if !state.is_created() {
            return Err(CommandError::NotFound(aggregate.id()));
        }
        let resolution = ctx
            .resolver
            .resolve(
                &state.properties,
                ResolveRequest {
                    resource_uri: &state.resource_uri,
                    mode: ResolveMode::Get,
                    body: None,
                    username: username(ctx),
                    call: &ctx.call,
                },
            )
            .await?;
        Ok(CommandOutput::reply(HttpResult::ok(resolution.value)))
    }
}

/// PATCH: hands the request document to the PATCH directives of the
/// resource. A body that does not parse is reported next to the unchanged
/// resource instead of failing the request.
pub struct HttpPatch {
    name: String,
    ids: Correlation,
    body: Option<Result<Value, String>>,
}

impl HttpPatch {
    pub fn new() -> Self {
        Self {
            name: http_command_name(HttpMethod::Patch),
            ids: Correlation::default(),
            body: None,
        }
    }
}

impl Default for HttpPatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for HttpPatch {
    fn command_type(&self) -> &str {
        &self.name
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.ids.aggregate_id
    }

    fn command_id(&self) -> Option<CommandId> {
        self.ids.command_id
    }

    fn set_ids(&mut self, command_id: CommandId, aggregate_id: AggregateId) {
        self.ids = Correlation {
            command_id: Some(command_id),
            aggregate_id: Some(aggregate_id),
        };
    }

    fn parse_http_body(&mut self, body: &HttpBody) -> Result<(), CommandError> {
        let parsed = if body.is_empty() {
            Err("request body is empty".to_string())
        } else {
            serde_json::from_slice::<Value>(&body.bytes)
                .map_err(|e| e.to_string())
                .and_then(|doc| match doc {
                    Value::Object(_) => Ok(doc),
                    _ => Err("request body must be a JSON object".to_string()),
                })
        };
        self.body = Some(parsed);
        Ok(())
    }

    async fn handle(&self, aggregate: Option<&Arc<Aggregate>>, ctx: &CommandContext) -> Result<CommandOutput, CommandError> {
        let aggregate = target(aggregate, &self.name)?;
        let state = aggregate.read().await;
        if !state.is_created() {
            return Err(CommandError::NotFound(aggregate.id()));
        }

        let document = match &self.body {
            Some(Ok(document)) => Ok(document),
            Some(Err(reason)) => Err(reason.clone()),
            None => Err("request body is empty".to_string()),
        };

        let request = ResolveRequest {
            resource_uri: &state.resource_uri,
            mode: ResolveMode::Get,
            body: None,
            username: username(ctx),
            call: &ctx.call,
        };

        match document {
            Ok(document) => {
                let resolution = ctx
                    .resolver
                    .resolve(
                        &state.properties,
                        ResolveRequest {
                            mode: ResolveMode::Patch,
                            body: Some(document),
                            ..request
                        },
                    )
                    .await?;
                let mut output = CommandOutput::reply(HttpResult::ok(resolution.value));
                if !resolution.written.is_empty() {
                    output = output.with_event(ResourceEvent::PropertiesUpdated {
                        id: aggregate.id(),
                        resource_uri: state.resource_uri.clone(),
                        changed: resolution.written,
                        updated_at: Utc::now(),
                    });
                }
                Ok(output)
            }
            Err(reason) => {
                let resolution = ctx.resolver.resolve(&state.properties, request).await?;
                let mut value = resolution.value;
                if let (Value::Object(map), Value::Object(mut annotation)) =
                    (&mut value, error_body("Base.1.0.MalformedJSON", reason))
                {
                    if let Some(error) = annotation.remove("error") {
                        map.insert("error".to_string(), error);
                    }
                }
                Ok(CommandOutput::reply(HttpResult::ok(value).with_status(400)))
            }
        }
    }
}

pub struct HttpDelete {
    name: String,
    ids: Correlation,
}

impl HttpDelete {
    pub fn new() -> Self {
        Self {
            name: http_command_name(HttpMethod::Delete),
            ids: Correlation::default(),
        }
    }
}

impl Default for HttpDelete {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for HttpDelete {
    fn command_type(&self) -> &str {
        &self.name
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.ids.aggregate_id
    }

    fn command_id(&self) -> Option<CommandId> {
        self.ids.command_id
    }

    fn set_ids(&mut self, command_id: CommandId, aggregate_id: AggregateId) {
        self.ids = Correlation {
            command_id: Some(command_id),
            aggregate_id: Some(aggregate_id),
        };
    }

    async fn handle(&self, aggregate: Option<&Arc<Aggregate>>, _ctx: &CommandContext) -> Result<CommandOutput, CommandError> {
        let aggregate = target(aggregate, &self.name)?;
        let mut state = aggregate.write().await;
        if !state.is_created() {
            return Err(CommandError::NotFound(aggregate.id()));
        }
        state.remove()?;
        Ok(CommandOutput::reply(HttpResult::ok(json!({}))))
    }
}

/// Answers 501 for verbs the engine deliberately leaves to overrides.
pub struct HttpNotImplemented {
    name: String,
    method: HttpMethod,
    ids: Correlation,
}

impl HttpNotImplemented {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            name: http_command_name(method),
            method,
            ids: Correlation::default(),
        }
    }
}

#[async_trait]
impl Command for HttpNotImplemented {
    fn command_type(&self) -> &str {
        &self.name
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.ids.aggregate_id
    }

    fn command_id(&self) -> Option<CommandId> {
        self.ids.command_id
    }

    fn set_ids(&mut self, command_id: CommandId, aggregate_id: AggregateId) {
        self.ids = Correlation {
            command_id: Some(command_id),
            aggregate_id: Some(aggregate_id),
        };
    }

    fn serialized(&self) -> bool {
        false
    }

    fn should_save(&self) -> bool {
        false
    }

    async fn handle(&self, _aggregate: Option<&Arc<Aggregate>>, _ctx: &CommandContext) -> Result<CommandOutput, CommandError> {
        let body = error_body(
            "Base.1.0.ActionNotSupported",
            format!("{} is not implemented for this resource", self.method),
        );
        Ok(CommandOutput::reply(HttpResult::ok(body).with_status(501)))
    }
}

pub fn register_http_commands(registry: &CommandRegistry) -> Result<(), RegistryError> {
    registry.register(http_command_name(HttpMethod::Get), || Box::new(HttpGet::new()))?;
    registry.register(http_command_name(HttpMethod::Patch), || Box::new(HttpPatch::new()))?;
    registry.register(http_command_name(HttpMethod::Delete), || Box::new(HttpDelete::new()))?;
    for method in [HttpMethod::Put, HttpMethod::Post, HttpMethod::Head, HttpMethod::Options] {
        registry.register(http_command_name(method), move || Box::new(HttpNotImplemented::new(method)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolver::PropertyResolver;
    use crate::domain::aggregate::ResourceDefinition;
    use crate::domain::context::CallContext;
    use crate::domain::server_config::ResolverSettings;
    use crate::infrastructure::plugin_registry::PluginRegistry;
    use crate::infrastructure::plugins::{register_builtin, KvStore};
    use std::time::Duration;

    async fn fixture() -> (Arc<Aggregate>, CommandContext) {
        let registry = Arc::new(PluginRegistry::new());
        register_builtin(&registry, &KvStore::new()).unwrap();
        let ctx = CommandContext {
            call: CallContext::with_timeout(Duration::from_secs(2)),
            resolver: Arc::new(PropertyResolver::new(registry, ResolverSettings::default())),
            principal: None,
        };
        let aggregate = Arc::new(Aggregate::new(AggregateId::new()));
        aggregate
            .write()
            .await
            .create(ResourceDefinition {
                resource_uri: "/redfish/v1/Systems/1".to_string(),
                properties: json!({
                    "Name": "System",
                    "AssetTag": "rack-7",
                    "AssetTag@meta": {"GET": {"plugin": "kv"}, "PATCH": {"plugin": "kv"}}
                })
                .as_object()
                .cloned()
                .unwrap(),
                ..Default::default()
            })
            .unwrap();
        aggregate.write().await.take_pending();
        (aggregate, ctx)
    }

    #[tokio::test]
    async fn test_patch_emits_update_for_written_properties() {
        let (aggregate, ctx) = fixture().await;
        let mut patch = HttpPatch::new();
        patch
            .parse_http_body(&HttpBody::json(&json!({"AssetTag": "rack-9"})))
            .unwrap();
        let output = patch.handle(Some(&aggregate), &ctx).await.unwrap();

        let result = output.result.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.results["AssetTag"], json!("rack-9"));
        assert!(matches!(
            output.events.as_slice(),
            [ResourceEvent::PropertiesUpdated { changed, .. }] if changed == &vec!["AssetTag".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_malformed_patch_reports_error_and_keeps_properties() {
        let (aggregate, ctx) = fixture().await;
        let mut patch = HttpPatch::new();
        patch
            .parse_http_body(&HttpBody {
                content_type: Some("application/json".to_string()),
                bytes: bytes::Bytes::from_static(b"{\"AssetTag\": "),
            })
            .unwrap();
        let output = patch.handle(Some(&aggregate), &ctx).await.unwrap();

        let result = output.result.unwrap();
        assert_eq!(result.status, 400);
        assert_eq!(result.results["AssetTag"], json!("rack-7"));
        assert_eq!(result.results["Name"], json!("System"));
        assert_eq!(result.results["error"]["code"], json!("Base.1.0.MalformedJSON"));
        assert!(output.events.is_empty());
    }

    #[tokio::test]
    async fn test_delete_queues_removal() {
        let (aggregate, ctx) = fixture().await;
        let output = HttpDelete::new().handle(Some(&aggregate), &ctx).await.unwrap();
        assert_eq!(output.result.unwrap().results, json!({}));
        assert!(matches!(
            aggregate.read().await.pending_events(),
            [ResourceEvent::ResourceRemoved { .. }]
        ));
    }

    #[tokio::test]
    async fn test_unimplemented_verbs_answer_501() {
        let (aggregate, ctx) = fixture().await;
        let output = HttpNotImplemented::new(HttpMethod::Put)
            .handle(Some(&aggregate), &ctx)
            .await
            .unwrap();
        assert_eq!(output.result.unwrap().status, 501);
    }
}
