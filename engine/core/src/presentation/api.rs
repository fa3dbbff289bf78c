// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tokio_stream::{Stream, StreamExt};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::application::command::{error_body, CommandError, HttpBody};
use crate::application::resource_handler::{ResourceRequest, ResourceResponse};
use crate::application::RedfishEngine;
use crate::domain::aggregate::HttpMethod;
use crate::domain::authorization::Principal;

/// Largest request body accepted on any route.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub fn router(engine: Arc<RedfishEngine>) -> Router {
    let prefix = engine.config().server.path_prefix.trim_end_matches('/').to_string();

    let mut router = Router::new().route(&format!("{prefix}/{{*path}}"), any(resource_handler));
    router = if prefix.is_empty() {
        router.route("/", any(resource_handler))
    } else {
        router
            .route(&prefix, any(resource_handler))
            .route(&format!("{prefix}/"), any(resource_handler))
    };

    router
        .route("/api/internal/command/{name}", post(internal_command_handler))
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn body_of(headers: &HeaderMap, bytes: bytes::Bytes) -> HttpBody {
    HttpBody {
        content_type: header(headers, CONTENT_TYPE),
        bytes,
    }
}

fn json_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn into_response(outcome: ResourceResponse) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match outcome.body {
        Some(body) => (status, body.to_string()).into_response(),
        None => status.into_response(),
    };
    let headers = response.headers_mut();
    for (name, value) in outcome.headers {
        match (HeaderName::from_str(&name), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping unrepresentable response header"),
        }
    }
    response
}

async fn resource_handler(State(engine): State<Arc<RedfishEngine>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(method) = HttpMethod::from_str(parts.method.as_str()) else {
        return json_response(
            501,
            error_body(
                "Base.1.0.ActionNotSupported",
                format!("{} is not supported", parts.method),
            ),
        );
    };
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return json_response(400, error_body("Base.1.0.MalformedJSON", e.to_string())),
    };
    let principal = parts
        .extensions
        .get::<Principal>()
        .cloned()
        .unwrap_or_else(|| engine.config().authorization.default_principal());

    let request = ResourceRequest {
        method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().unwrap_or_default().to_string(),
        if_match: header(&parts.headers, HeaderName::from_static("if-match")),
        if_none_match: header(&parts.headers, HeaderName::from_static("if-none-match")),
        body: body_of(&parts.headers, bytes),
        principal,
    };

    match engine.handle(request).await {
        Ok(outcome) => into_response(outcome),
        Err(e) => {
            debug!(error = %e, "Resource request failed");
            json_response(e.status(), e.to_body())
        }
    }
}

async fn internal_command_handler(
    State(engine): State<Arc<RedfishEngine>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    bytes: bytes::Bytes,
) -> Response {
    match engine.run_internal(&name, &body_of(&headers, bytes)).await {
        Ok(Some(result)) => json_response(result.status, result.results),
        Ok(None) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(e) => {
            let status = match &e {
                CommandError::AlreadyCreated(_) => 409,
                CommandError::NotFound(_) => 404,
                CommandError::Repository(_) => 500,
                _ => 400,
            };
            warn!(command = %name, error = %e, "Internal command failed");
            json_response(status, error_body("Base.1.0.GeneralError", e.to_string()))
        }
    }
}

async fn events_handler(
    State(engine): State<Arc<RedfishEngine>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = engine.bus().listen(|_| true).map(|event| {
        let frame = json!({"name": event.name(), "data": event.data()});
        Ok(Event::default().data(frame.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health_handler(State(engine): State<Arc<RedfishEngine>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": engine.uptime().as_secs(),
    }))
}

async fn status_handler(State(engine): State<Arc<RedfishEngine>>) -> Json<Value> {
    let aggregates = match engine.repository().count().await {
        Ok(count) => json!(count),
        Err(e) => {
            warn!(error = %e, "Could not count aggregates");
            Value::Null
        }
    };
    Json(json!({
        "resources": engine.tree().len(),
        "aggregates": aggregates,
        "plugins": engine.plugins().names(),
        "uptime_seconds": engine.uptime().as_secs(),
    }))
}
