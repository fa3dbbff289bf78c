// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Internal Commands
//!
//! Commands for trusted backend callers, registered as `internal:<Name>`.
//! They bypass the per-resource privilege table and accept JSON or XML
//! bodies.
//!
//! | Name | Payload |
//! |------|---------|
//! | `RedfishResource:Create` | `ID`, `ResourceURI`, `Type`, `Context`, `Privileges`, `Headers`, `Plugin`, `DefaultFilter`, `Collection`, `Properties`, `Meta` |
//! | `RedfishResource:Remove` | `ID` |
//! | `RedfishResourceProperties:Update` | `ID`, `Properties` (deep merge) |
//! | `RedfishResourceProperties:Update:2` | `ID`, `Properties` (`a/b/c` → value) |
//! | `RedfishResourceProperties:Remove` | `ID`, `Property` |
//! | `RedfishResourceMeta:Update` | `ID`, `Meta` |
//! | `RedfishResourceCollection:AddMember` | `ID`, `MemberURI` |
//! | `RedfishResourceCollection:RemoveMember` | `ID`, `MemberURI` |
//! | `Event:Inject` | `name`, `data` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::application::command::{
    decode_body, Command, CommandContext, CommandError, CommandOutput, CommandRegistry, HttpBody, HttpResult,
};
use crate::domain::aggregate::{Aggregate, AggregateId, ResourceDefinition};
use crate::domain::authorization::{AuthorizationContext, AuthorizationVerdict};
use crate::domain::events::ResourceEvent;
use crate::infrastructure::plugin_registry::RegistryError;

pub const INTERNAL_PREFIX: &str = "internal:";

/// Payload-level contract of an internal command.
#[async_trait]
pub trait InternalCommand: DeserializeOwned + Default + Send + Sync + 'static {
    const NAME: &'static str;

    fn target(&self) -> Option<AggregateId>;

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError>;
}

/// Adapter turning an [`InternalCommand`] payload into a dispatchable command.
pub struct Internal<T> {
    name: String,
    inner: T,
}

impl<T: InternalCommand> Internal<T> {
    pub fn new(inner: T) -> Self {
        Self {
            name: format!("{INTERNAL_PREFIX}{}", T::NAME),
            inner,
        }
    }

    pub fn boxed(inner: T) -> Box<dyn Command> {
        Box::new(Self::new(inner))
    }

    pub fn payload(&self) -> &T {
        &self.inner
    }
}

impl<T: InternalCommand> Default for Internal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[async_trait]
impl<T: InternalCommand> Command for Internal<T> {
    fn command_type(&self) -> &str {
        &self.name
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.inner.target()
    }

    fn authorize(&self, _ctx: &AuthorizationContext) -> AuthorizationVerdict {
        AuthorizationVerdict::Authorized
    }

    fn parse_http_body(&mut self, body: &HttpBody) -> Result<(), CommandError> {
        self.inner = decode_body(body)?;
        Ok(())
    }

    async fn handle(&self, aggregate: Option<&Arc<Aggregate>>, _ctx: &CommandContext) -> Result<CommandOutput, CommandError> {
        self.inner.apply(aggregate).await
    }
}

fn require<'a>(aggregate: Option<&'a Arc<Aggregate>>, name: &str) -> Result<&'a Arc<Aggregate>, CommandError> {
    aggregate.ok_or_else(|| CommandError::MissingAggregate(name.to_string()))
}

fn done(id: AggregateId, detail: Value) -> CommandOutput {
    let mut results = json!({"ID": id});
    if let (Value::Object(map), Value::Object(extra)) = (&mut results, detail) {
        map.extend(extra);
    }
    CommandOutput::reply(HttpResult::ok(results))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateResource {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(flatten)]
    pub definition: ResourceDefinition,
}

#[async_trait]
impl InternalCommand for CreateResource {
    const NAME: &'static str = "RedfishResource:Create";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let aggregate = require(aggregate, Self::NAME)?;
        aggregate.write().await.create(self.definition.clone())?;
        Ok(done(self.id, json!({"ResourceURI": self.definition.resource_uri})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoveResource {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
}

#[async_trait]
impl InternalCommand for RemoveResource {
    const NAME: &'static str = "RedfishResource:Remove";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        require(aggregate, Self::NAME)?.write().await.remove()?;
        Ok(done(self.id, json!({})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProperties {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "Properties", default)]
    pub properties: Map<String, Value>,
}

#[async_trait]
impl InternalCommand for UpdateProperties {
    const NAME: &'static str = "RedfishResourceProperties:Update";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let changed = require(aggregate, Self::NAME)?
            .write()
            .await
            .update_properties(self.properties.clone())?;
        Ok(done(self.id, json!({"Changed": changed})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePropertyPaths {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "Properties", default)]
    pub properties: Map<String, Value>,
}

#[async_trait]
impl InternalCommand for UpdatePropertyPaths {
    const NAME: &'static str = "RedfishResourceProperties:Update:2";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let changed = require(aggregate, Self::NAME)?
            .write()
            .await
            .update_paths(self.properties.clone())?;
        Ok(done(self.id, json!({"Changed": changed})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoveProperty {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "Property")]
    pub property: String,
}

#[async_trait]
impl InternalCommand for RemoveProperty {
    const NAME: &'static str = "RedfishResourceProperties:Remove";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let removed = require(aggregate, Self::NAME)?
            .write()
            .await
            .remove_property(&self.property)?;
        Ok(done(self.id, json!({"Removed": removed})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMeta {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "Meta", default)]
    pub meta: Map<String, Value>,
}

#[async_trait]
impl InternalCommand for UpdateMeta {
    const NAME: &'static str = "RedfishResourceMeta:Update";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let changed = require(aggregate, Self::NAME)?
            .write()
            .await
            .apply_meta(&self.meta)?;
        Ok(done(self.id, json!({"Changed": changed})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddCollectionMember {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "MemberURI")]
    pub member_uri: String,
}

#[async_trait]
impl InternalCommand for AddCollectionMember {
    const NAME: &'static str = "RedfishResourceCollection:AddMember";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let added = require(aggregate, Self::NAME)?
            .write()
            .await
            .add_member(&self.member_uri)?;
        Ok(done(self.id, json!({"Added": added})))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoveCollectionMember {
    #[serde(rename = "ID", default)]
    pub id: AggregateId,
    #[serde(rename = "MemberURI")]
    pub member_uri: String,
}

#[async_trait]
impl InternalCommand for RemoveCollectionMember {
    const NAME: &'static str = "RedfishResourceCollection:RemoveMember";

    fn target(&self) -> Option<AggregateId> {
        Some(self.id)
    }

    async fn apply(&self, aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        let removed = require(aggregate, Self::NAME)?
            .write()
            .await
            .remove_member(&self.member_uri)?;
        Ok(done(self.id, json!({"Removed": removed})))
    }
}

/// Publish an arbitrary named event on the main bus.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InjectEvent {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Data", default)]
    pub data: Value,
}

#[async_trait]
impl InternalCommand for InjectEvent {
    const NAME: &'static str = "Event:Inject";

    fn target(&self) -> Option<AggregateId> {
        None
    }

    async fn apply(&self, _aggregate: Option<&Arc<Aggregate>>) -> Result<CommandOutput, CommandError> {
        if self.name.is_empty() {
            return Err(CommandError::Invalid("injected events need a name".to_string()));
        }
        Ok(
            CommandOutput::reply(HttpResult::ok(json!({"Injected": self.name}))).with_event(ResourceEvent::Injected {
                name: self.name.clone(),
                data: self.data.clone(),
                injected_at: Utc::now(),
            }),
        )
    }
}

fn register<T: InternalCommand>(registry: &CommandRegistry) -> Result<(), RegistryError> {
    registry.register(format!("{INTERNAL_PREFIX}{}", T::NAME), || Box::new(Internal::<T>::default()))
}

pub fn register_internal_commands(registry: &CommandRegistry) -> Result<(), RegistryError> {
    register::<CreateResource>(registry)?;
    register::<RemoveResource>(registry)?;
    register::<UpdateProperties>(registry)?;
    register::<UpdatePropertyPaths>(registry)?;
    register::<RemoveProperty>(registry)?;
    register::<UpdateMeta>(registry)?;
    register::<AddCollectionMember>(registry)?;
    register::<RemoveCollectionMember>(registry)?;
    register::<InjectEvent>(registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_every_internal_command_is_registered() {
        let registry = CommandRegistry::new();
        register_internal_commands(&registry).unwrap();
        for name in [
            "internal:RedfishResource:Create",
            "internal:RedfishResourceProperties:Update:2",
            "internal:RedfishResourceCollection:RemoveMember",
            "internal:Event:Inject",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_create_payload_decodes_definition() {
        let mut command = Internal::<CreateResource>::default();
        let id = AggregateId::new();
        command
            .parse_http_body(&HttpBody::json(&json!({
                "ID": id,
                "ResourceURI": "/redfish/v1/Chassis/1",
                "Type": "#Chassis.v1_6_0.Chassis",
                "Collection": false,
                "Privileges": {"GET": ["Login"]},
                "Properties": {"Id": "1"}
            })))
            .unwrap();
        assert_eq!(command.aggregate_id(), Some(id));
        assert_eq!(command.payload().definition.resource_uri, "/redfish/v1/Chassis/1");
        assert_eq!(
            command.payload().definition.odata_type.as_deref(),
            Some("#Chassis.v1_6_0.Chassis")
        );
    }

    #[test]
    fn test_inject_accepts_xml() {
        let mut command = Internal::<InjectEvent>::default();
        command
            .parse_http_body(&HttpBody {
                content_type: Some("text/xml".to_string()),
                bytes: Bytes::from_static(b"<Event><name>FanFailed</name></Event>"),
            })
            .unwrap();
        assert_eq!(command.payload().name, "FanFailed");
        assert!(command.aggregate_id().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_created_aggregate() {
        let aggregate = Arc::new(Aggregate::new(AggregateId::new()));
        let command = UpdateProperties {
            id: aggregate.id(),
            properties: Map::new(),
        };
        assert!(matches!(
            command.apply(Some(&aggregate)).await,
            Err(CommandError::Invalid(_))
        ));
    }
}
