// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Resource Handler - one HTTP request against the resource tree
//
// 1. map the URI to an aggregate (404)
// 2. pick the first registered command from the search chain (400)
// 3. authorize, letting the command decide first (405)
// 4. answer conditional requests from the resolved @odata.etag (304/412)
// 5. listen for the completion event, then parse the body and dispatch
// 6. wait for the completion event under the request deadline (500)
// 7. apply OData query options to GET results
// 8. wait for a Location target to exist, then build headers

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::application::aggregate_store::AggregateStore;
use crate::application::command::{error_body, CommandError, CommandRegistry, HttpBody};
use crate::application::command_pipeline::CommandPipeline;
use crate::application::http_commands::{http_command_name, LEGACY_COMMAND_PREFIX};
use crate::application::resolver::{PropertyResolver, ResolveRequest};
use crate::domain::aggregate::{Aggregate, HttpMethod};
use crate::domain::authorization::{AuthorizationContext, AuthorizationVerdict, Principal, QueryOptions};
use crate::domain::context::CallContext;
use crate::domain::events::{CommandId, ResourceEvent};
use crate::domain::odata::apply_query;
use crate::domain::property::ResolveMode;
use crate::domain::resource_tree::ResourceTree;
use crate::domain::server_config::HttpSettings;
use crate::infrastructure::event_bus::{EventBus, WaitError};

pub const ETAG_PROPERTY: &str = "@odata.etag";

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Could not find URL: {0}")]
    NotFound(String),

    #[error("could not create command for {method} {uri}")]
    CommandResolution { method: HttpMethod, uri: String },

    #[error("Problems parsing http request: {0}")]
    MalformedBody(String),

    #[error("Not authorized to {method} this resource")]
    Unauthorized { method: HttpMethod },

    #[error("ETag does not match")]
    PreconditionFailed,

    #[error("command {command} rejected: {reason}")]
    Rejected { command: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::NotFound(_) => 404,
            HandlerError::CommandResolution { .. } => 400,
            HandlerError::MalformedBody(_) => 400,
            HandlerError::Unauthorized { .. } => 405,
            HandlerError::PreconditionFailed => 412,
            HandlerError::Rejected { .. } => 400,
            HandlerError::Timeout(_) => 500,
            HandlerError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::NotFound(_) => "Base.1.0.ResourceMissingAtURI",
            HandlerError::CommandResolution { .. } => "Base.1.0.ActionNotSupported",
            HandlerError::MalformedBody(_) => "Base.1.0.MalformedJSON",
            HandlerError::Unauthorized { .. } => "Base.1.0.InsufficientPrivilege",
            HandlerError::PreconditionFailed => "Base.1.0.PreconditionFailed",
            HandlerError::Rejected { .. } => "Base.1.0.GeneralError",
            HandlerError::Timeout(_) | HandlerError::Internal(_) => "Base.1.0.InternalError",
        }
    }

    /// Redfish error document for this failure.
    pub fn to_body(&self) -> Value {
        error_body(self.code(), self.to_string())
    }

    fn from_command(command: &str, err: CommandError) -> Self {
        match err {
            CommandError::NotFound(id) => HandlerError::NotFound(id.to_string()),
            CommandError::MalformedBody(reason) => HandlerError::MalformedBody(reason),
            CommandError::Repository(e) => HandlerError::Internal(e.to_string()),
            other => HandlerError::Rejected {
                command: command.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Everything the handler needs from an incoming request.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: String,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub body: HttpBody,
    pub principal: Principal,
}

impl ResourceRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, principal: Principal) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            if_match: None,
            if_none_match: None,
            body: HttpBody::default(),
            principal,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_body(mut self, body: HttpBody) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// `None` for 304.
    pub body: Option<Value>,
}

pub struct ResourceHandler {
    tree: Arc<ResourceTree>,
    store: Arc<AggregateStore>,
    commands: Arc<CommandRegistry>,
    pipeline: Arc<CommandPipeline>,
    resolver: Arc<PropertyResolver>,
    bus: EventBus,
    settings: HttpSettings,
}

impl ResourceHandler {
    pub fn new(
        tree: Arc<ResourceTree>,
        store: Arc<AggregateStore>,
        commands: Arc<CommandRegistry>,
        pipeline: Arc<CommandPipeline>,
        resolver: Arc<PropertyResolver>,
        bus: EventBus,
        settings: HttpSettings,
    ) -> Self {
        Self {
            tree,
            store,
            commands,
            pipeline,
            resolver,
            bus,
            settings,
        }
    }

    pub async fn handle(&self, request: ResourceRequest) -> Result<ResourceResponse, HandlerError> {
        let command_id = CommandId::new();
        let method = request.method;
        let span = info_span!(
            "resource_request",
            method = %method,
            uri = %request.path,
            command_id = %command_id
        );
        let outcome = self.process(request, command_id).instrument(span).await;

        let status = match &outcome {
            Ok(response) => response.status,
            Err(e) => e.status(),
        };
        metrics::counter!(
            "redfish_requests_total",
            "method" => method.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
        outcome
    }

    async fn process(&self, request: ResourceRequest, command_id: CommandId) -> Result<ResourceResponse, HandlerError> {
        let call = CallContext::with_timeout(self.settings.request_timeout());
        let method = request.method;

        let id = self
            .tree
            .lookup(&request.path)
            .ok_or_else(|| HandlerError::NotFound(request.path.clone()))?;
        let aggregate = self
            .store
            .find(id)
            .await
            .map_err(|e| HandlerError::Internal(e.to_string()))?
            .ok_or_else(|| HandlerError::NotFound(request.path.clone()))?;

        let (search, default_filter, required, resource_headers) = {
            let state = aggregate.read().await;
            let search = vec![
                format!("{}:{method}", state.resource_uri),
                format!("{}:{method}", state.plugin),
                http_command_name(method),
                format!("{LEGACY_COMMAND_PREFIX}:{method}"),
            ];
            (
                search,
                state.default_filter.clone(),
                state.required_privileges(method).to_vec(),
                state.headers.clone(),
            )
        };

        let (command_type, mut command) =
            self.commands
                .instantiate_first(&search)
                .ok_or_else(|| HandlerError::CommandResolution {
                    method,
                    uri: request.path.clone(),
                })?;
        command.set_ids(command_id, id);
        debug!(command = %command_type, "Command selected");

        let query = (method == HttpMethod::Get).then(|| match default_filter.as_deref() {
            Some(filter) if request.query.is_empty() && !filter.is_empty() => QueryOptions::parse(filter),
            _ => QueryOptions::parse(&request.query),
        });
        let auth = AuthorizationContext::new(request.principal.clone(), query);
        let authorized = match command.authorize(&auth) {
            AuthorizationVerdict::Authorized => true,
            AuthorizationVerdict::Unauthorized => false,
            AuthorizationVerdict::CheckPrivileges => auth.principal.holds_any(&required),
        };
        if !authorized {
            return Err(HandlerError::Unauthorized { method });
        }

        if request.if_none_match.is_some() || request.if_match.is_some() {
            if let Some(etag) = self.current_etag(&aggregate, &auth.principal, &call).await {
                if request.if_none_match.as_deref() == Some(etag.as_str()) {
                    return Ok(ResourceResponse {
                        status: 304,
                        headers: BTreeMap::from([("ETag".to_string(), etag)]),
                        body: None,
                    });
                }
                if request.if_match.as_deref().is_some_and(|m| m != etag) {
                    return Err(HandlerError::PreconditionFailed);
                }
            }
        }

        let mut listener = self
            .pipeline
            .results_bus()
            .listen(move |event| event.command_id() == Some(command_id));

        command
            .parse_http_body(&request.body)
            .map_err(|e| HandlerError::from_command(&command_type, e))?;

        self.pipeline
            .dispatch(command, &call, Some(auth.principal.clone()))
            .await
            .map_err(|e| HandlerError::from_command(&command_type, e))?;

        let event = listener.wait(&call).await.map_err(|e| match e {
            WaitError::TimedOut => HandlerError::Timeout(format!("command {command_id}")),
            other => HandlerError::Internal(other.to_string()),
        })?;
        listener.close();

        let ResourceEvent::HttpCommandProcessed {
            status,
            mut results,
            headers: result_headers,
            ..
        } = event
        else {
            return Err(HandlerError::Internal("unexpected completion event".to_string()));
        };

        if let Some(query) = &auth.query {
            results = apply_query(results, query, &request.path);
        }

        if let Some(location) = result_headers.get("Location") {
            self.await_location(location, &call).await?;
        }

        let mut headers = self.standard_headers();
        headers.extend(resource_headers);
        headers.extend(result_headers);
        if let Some(etag) = results.get(ETAG_PROPERTY).and_then(Value::as_str) {
            headers.insert("ETag".to_string(), etag.to_string());
        }

        aggregate.write().await.record_access(method);

        Ok(ResourceResponse {
            status,
            headers,
            body: Some(results),
        })
    }

    async fn current_etag(&self, aggregate: &Arc<Aggregate>, principal: &Principal, call: &CallContext) -> Option<String> {
        let state = aggregate.read().await;
        let request = ResolveRequest {
            resource_uri: &state.resource_uri,
            mode: ResolveMode::Get,
            body: None,
            username: Some(&principal.username),
            call,
        };
        match self.resolver.resolve_path(&state.properties, &[ETAG_PROPERTY], request).await {
            Ok(value) => value.and_then(|v| v.as_str().map(str::to_string)),
            Err(e) => {
                warn!(error = %e, "Could not resolve ETag");
                None
            }
        }
    }

    /// Block until `location` is in the tree. Listens first so a creation
    /// landing between the check and the wait is not missed.
    async fn await_location(&self, location: &str, call: &CallContext) -> Result<(), HandlerError> {
        let path = location.to_string();
        let mut listener = self.bus.listen(move |event| {
            matches!(event, ResourceEvent::ResourceCreated { resource_uri, .. } if *resource_uri == path)
        });
        if self.tree.lookup(location).is_some() {
            return Ok(());
        }
        debug!(location = %location, "Waiting for Location resource");
        match listener.wait(call).await {
            Ok(_) => Ok(()),
            Err(WaitError::TimedOut) => Err(HandlerError::Timeout(format!("Location {location}"))),
            Err(e) => Err(HandlerError::Internal(e.to_string())),
        }
    }

    fn standard_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("OData-Version".to_string(), "4.0".to_string()),
            ("Content-Type".to_string(), "application/json; charset=utf-8".to_string()),
            (
                "Strict-Transport-Security".to_string(),
                "max-age=63072000; includeSubDomains".to_string(),
            ),
            ("X-Content-Type-Options".to_string(), "nosniff".to_string()),
            ("Server".to_string(), self.settings.server_name.clone()),
        ])
    }
}
