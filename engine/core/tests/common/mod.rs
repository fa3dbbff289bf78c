// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the router-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use redfish_core::application::RedfishEngine;
use redfish_core::domain::aggregate::{AggregateId, ResourceDefinition};
use redfish_core::domain::server_config::ServerConfig;
use redfish_core::presentation::router;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct Harness {
    pub engine: Arc<RedfishEngine>,
    pub app: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let engine = Arc::new(RedfishEngine::new(config).unwrap());
        let app = router(engine.clone());
        Self { engine, app }
    }

    pub async fn create(&self, definition: Value) -> AggregateId {
        let definition: ResourceDefinition = serde_json::from_value(definition).unwrap();
        self.engine.create_resource(definition).await.unwrap()
    }

    pub async fn send(&self, method: &str, uri: &str, headers: &[(&str, &str)], body: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send("GET", uri, &[], None).await
    }

    pub async fn patch(&self, uri: &str, body: &str) -> TestResponse {
        self.send("PATCH", uri, &[("content-type", "application/json")], Some(body))
            .await
    }
}

/// Privileges used by most fixtures: GET for `Login`, writes for
/// `ConfigureComponents`.
pub fn standard_privileges() -> Value {
    json!({
        "GET": ["Login"],
        "PATCH": ["ConfigureComponents"],
        "DELETE": ["ConfigureComponents"],
        "POST": ["ConfigureComponents"],
        "PUT": ["ConfigureComponents"]
    })
}

pub fn systems_collection() -> Value {
    json!({
        "ResourceURI": "/redfish/v1/Systems",
        "Type": "#ComputerSystemCollection.ComputerSystemCollection",
        "Context": "/redfish/v1/$metadata#ComputerSystemCollection.ComputerSystemCollection",
        "Collection": true,
        "Privileges": standard_privileges(),
        "Properties": {"Name": "Computer System Collection"}
    })
}

pub fn system(id: &str) -> Value {
    json!({
        "ResourceURI": format!("/redfish/v1/Systems/{id}"),
        "Type": "#ComputerSystem.v1_1_0.ComputerSystem",
        "Context": "/redfish/v1/$metadata#ComputerSystem.ComputerSystem",
        "Privileges": standard_privileges(),
        "Properties": {
            "Id": id,
            "Name": format!("System {id}"),
            "Description": "Test system",
            "AssetTag": "",
            "AssetTag@meta": {
                "GET": {"plugin": "kv", "key": format!("asset-tag-{id}")},
                "PATCH": {"plugin": "kv", "key": format!("asset-tag-{id}")}
            },
            "Status": {"State": "Enabled", "Health": "OK"},
            "Oem": {"Vendor": {"Serial": "X1"}}
        }
    })
}
