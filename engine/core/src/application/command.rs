// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Commands
//!
//! A command is the only way an aggregate changes. The pipeline loads the
//! target aggregate, hands it to [`Command::handle`], persists and then
//! publishes whatever the command left in the aggregate's pending buffer.
//! Commands never publish themselves.
//!
//! Optional capabilities are trait methods with inert defaults:
//!
//! | Method | Capability |
//! |--------|------------|
//! | [`Command::set_ids`] | accepts the dispatcher's correlation and aggregate ids |
//! | [`Command::authorize`] | inspects the caller and may decide authorization itself |
//! | [`Command::parse_http_body`] | decodes its own request body |
//! | [`Command::serialized`] | runs under the aggregate's command lock |

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::resolver::{PropertyResolver, ResolveError};
use crate::domain::aggregate::{Aggregate, AggregateError, AggregateId};
use crate::domain::authorization::{AuthorizationContext, AuthorizationVerdict, Principal};
use crate::domain::context::CallContext;
use crate::domain::events::{CommandId, ResourceEvent};
use crate::domain::repository::RepositoryError;
use crate::infrastructure::plugin_registry::RegistryError;

/// Raw request body plus how it is encoded.
#[derive(Debug, Clone, Default)]
pub struct HttpBody {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl HttpBody {
    pub fn json(value: &Value) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            bytes: Bytes::from(value.to_string()),
        }
    }

    pub fn is_xml(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("xml"))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decode a body as JSON, or as XML when the content type says so.
pub fn decode_body<T: DeserializeOwned>(body: &HttpBody) -> Result<T, CommandError> {
    if body.is_xml() {
        let text = std::str::from_utf8(&body.bytes)
            .map_err(|e| CommandError::MalformedBody(e.to_string()))?;
        quick_xml::de::from_str(text).map_err(|e| CommandError::MalformedBody(e.to_string()))
    } else {
        serde_json::from_slice(&body.bytes).map_err(|e| CommandError::MalformedBody(e.to_string()))
    }
}

/// Reply carried back to a waiting HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResult {
    pub status: u16,
    pub results: Value,
    pub headers: BTreeMap<String, String>,
}

impl HttpResult {
    pub fn ok(results: Value) -> Self {
        Self {
            status: 200,
            results,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// What a command produced besides aggregate mutations.
#[derive(Debug, Default)]
pub struct CommandOutput {
    /// Published on the results bus once the command is committed.
    pub result: Option<HttpResult>,
    /// Events not tied to aggregate state, committed with the pending buffer.
    pub events: Vec<ResourceEvent>,
}

impl CommandOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(result: HttpResult) -> Self {
        Self {
            result: Some(result),
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: ResourceEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Collaborators available to a running command.
pub struct CommandContext {
    pub call: CallContext,
    pub resolver: Arc<PropertyResolver>,
    /// Caller on whose behalf an HTTP command runs.
    pub principal: Option<Principal>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("resource already created: {0}")]
    AlreadyCreated(String),

    #[error("aggregate not found: {0}")]
    NotFound(AggregateId),

    #[error("command {0} needs a target aggregate")]
    MissingAggregate(String),

    #[error("malformed command body: {0}")]
    MalformedBody(String),

    #[error("invalid command: {0}")]
    Invalid(String),

    #[error("property resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<AggregateError> for CommandError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::AlreadyCreated(uri) => CommandError::AlreadyCreated(uri),
            other => CommandError::Invalid(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn command_type(&self) -> &str;

    /// Target aggregate. `None` for commands that only emit events.
    fn aggregate_id(&self) -> Option<AggregateId>;

    /// Correlation id of an HTTP-dispatched command.
    fn command_id(&self) -> Option<CommandId> {
        None
    }

    fn set_ids(&mut self, _command_id: CommandId, _aggregate_id: AggregateId) {}

    fn authorize(&self, _ctx: &AuthorizationContext) -> AuthorizationVerdict {
        AuthorizationVerdict::CheckPrivileges
    }

    fn parse_http_body(&mut self, _body: &HttpBody) -> Result<(), CommandError> {
        Ok(())
    }

    /// Commands that only read may run alongside each other.
    fn serialized(&self) -> bool {
        true
    }

    /// Persist the aggregate after the command ran.
    fn should_save(&self) -> bool {
        true
    }

    async fn handle(&self, aggregate: Option<&Arc<Aggregate>>, ctx: &CommandContext) -> Result<CommandOutput, CommandError>;
}

/// Redfish-style error document.
pub fn error_body(code: &str, message: impl Into<String>) -> Value {
    let message = message.into();
    json!({
        "error": {
            "code": code,
            "message": message,
            "@Message.ExtendedInfo": [{
                "MessageId": code,
                "Message": message,
            }]
        }
    })
}

pub type CommandFactory = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Name → constructor map for every dispatchable command.
#[derive(Default)]
pub struct CommandRegistry {
    factories: RwLock<HashMap<String, CommandFactory>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            return Err(RegistryError::Duplicate { kind: "Command", name });
        }
        debug!(command = %name, "Registered command");
        factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Command>, RegistryError> {
        let factories = self.factories.read();
        factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "Command",
                name: name.to_string(),
            })
    }

    /// First name in `search` that has a registered constructor.
    pub fn instantiate_first(&self, search: &[String]) -> Option<(String, Box<dyn Command>)> {
        search
            .iter()
            .find_map(|name| self.instantiate(name).ok().map(|cmd| (name.clone(), cmd)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}
