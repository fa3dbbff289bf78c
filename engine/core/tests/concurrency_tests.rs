// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Many requests in flight at once must each get back their own result.

mod common;

use axum::http::StatusCode;
use futures::future::join_all;
use serde_json::json;

use common::{system, systems_collection, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_gets() {
    let harness = Harness::new();
    harness.create(systems_collection()).await;
    for n in 0..10 {
        harness.create(system(&n.to_string())).await;
    }

    let responses = join_all((0..100).map(|i| {
        let harness = &harness;
        async move {
            let uri = format!("/redfish/v1/Systems/{}", i % 10);
            (i % 10, harness.get(&uri).await)
        }
    }))
    .await;

    for (n, response) in responses {
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["Id"], json!(n.to_string()));
    }
    assert_eq!(harness.engine.tree().len(), 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_patches_get_their_own_results() {
    let harness = Harness::new();
    for n in 0..100 {
        harness.create(system(&n.to_string())).await;
    }

    let responses = join_all((0..100).map(|n| {
        let harness = &harness;
        async move {
            let body = json!({"AssetTag": format!("tag-{n}")}).to_string();
            let uri = format!("/redfish/v1/Systems/{n}");
            (n, harness.patch(&uri, &body).await)
        }
    }))
    .await;

    for (n, response) in responses {
        assert_eq!(response.status, StatusCode::OK, "PATCH of system {n}");
        assert_eq!(response.body["Id"], json!(n.to_string()));
        assert_eq!(response.body["AssetTag"], json!(format!("tag-{n}")));
    }
    for n in [0, 42, 99] {
        assert_eq!(
            harness.engine.kv().get(&format!("asset-tag-{n}")),
            Some(json!(format!("tag-{n}")))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_patches_to_one_resource_settle() {
    let harness = Harness::new();
    harness.create(system("1")).await;

    let responses = join_all((0..20).map(|n| {
        let harness = &harness;
        async move {
            let body = json!({"AssetTag": format!("v{n}")}).to_string();
            harness.patch("/redfish/v1/Systems/1", &body).await
        }
    }))
    .await;

    assert!(responses.iter().all(|r| r.status == StatusCode::OK));
    let last = harness.get("/redfish/v1/Systems/1").await;
    let value = last.body["AssetTag"].as_str().unwrap().to_string();
    assert!(value.starts_with('v'));
    assert_eq!(harness.engine.kv().get("asset-tag-1"), Some(json!(value)));
}
