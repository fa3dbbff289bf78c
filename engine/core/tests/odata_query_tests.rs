// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! OData query options applied through the HTTP surface.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{standard_privileges, system, Harness};

fn log_entries(default_filter: Option<&str>) -> Value {
    let members: Vec<Value> = [
        ("1", "OK", "2024-01-01T00:00:00Z"),
        ("2", "Warning", "2024-01-02T00:00:00Z"),
        ("3", "Critical", "2024-01-03T00:00:00Z"),
        ("4", "OK", "2024-01-04T00:00:00Z"),
        ("5", "Fatal", "2024-01-05T00:00:00Z"),
    ]
    .iter()
    .map(|(id, severity, created)| {
        json!({
            "@odata.id": format!("/redfish/v1/Managers/1/LogServices/Sel/Entries/{id}"),
            "Id": id,
            "Severity": severity,
            "Created": created,
            "Message": format!("entry {id}")
        })
    })
    .collect();

    let mut definition = json!({
        "ResourceURI": "/redfish/v1/Managers/1/LogServices/Sel/Entries",
        "Type": "#LogEntryCollection.LogEntryCollection",
        "Privileges": standard_privileges(),
        "Properties": {
            "Name": "SEL Entries",
            "Members": members,
            "Members@odata.count": 5
        }
    });
    if let Some(filter) = default_filter {
        definition["DefaultFilter"] = json!(filter);
    }
    definition
}

fn ids(body: &Value) -> Vec<String> {
    body["Members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["Id"].as_str().unwrap().to_string())
        .collect()
}

const ENTRIES: &str = "/redfish/v1/Managers/1/LogServices/Sel/Entries";

#[tokio::test]
async fn test_severity_filter_orders_by_rank() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let response = harness
        .get(&format!("{ENTRIES}?$filter=Severity%20gt%20Warning"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(ids(&response.body), vec!["3", "5"]);
    assert_eq!(response.body["Members@odata.count"], json!(2));
}

#[tokio::test]
async fn test_equality_filter_and_conjunction() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let ok = harness.get(&format!("{ENTRIES}?$filter=Severity%20eq%20OK")).await;
    assert_eq!(ids(&ok.body), vec!["1", "4"]);

    let both = harness
        .get(&format!(
            "{ENTRIES}?$filter=Severity%20eq%20OK%20and%20Created%20gt%202024-01-02T00:00:00Z"
        ))
        .await;
    assert_eq!(ids(&both.body), vec!["4"]);
}

#[tokio::test]
async fn test_paging_adds_next_link() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let first = harness.get(&format!("{ENTRIES}?$top=2")).await;
    assert_eq!(ids(&first.body), vec!["1", "2"]);
    assert_eq!(first.body["Members@odata.count"], json!(5));
    let next = first.body["Members@odata.nextLink"].as_str().unwrap().to_string();
    assert!(next.starts_with(ENTRIES));
    assert!(next.contains("%24skip=2"));
    assert!(next.contains("%24top=2"));

    let last = harness.get(&format!("{ENTRIES}?$skip=4&$top=2")).await;
    assert_eq!(ids(&last.body), vec!["5"]);
    assert!(last.body.get("Members@odata.nextLink").is_none());
}

#[tokio::test]
async fn test_skip_past_end_yields_empty_page() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let response = harness.get(&format!("{ENTRIES}?$skip=10")).await;
    assert_eq!(response.body["Members"], json!([]));
}

#[tokio::test]
async fn test_default_filter_applies_only_without_query() {
    let harness = Harness::new();
    harness
        .create(log_entries(Some("$filter=Severity eq Critical")))
        .await;

    let defaulted = harness.get(ENTRIES).await;
    assert_eq!(ids(&defaulted.body), vec!["3"]);

    let explicit = harness.get(&format!("{ENTRIES}?$top=10")).await;
    assert_eq!(ids(&explicit.body).len(), 5);
}

#[tokio::test]
async fn test_select_keeps_requested_and_fixed_properties() {
    let harness = Harness::new();
    harness.create(system("1")).await;

    let response = harness
        .get("/redfish/v1/Systems/1?$select=Status/Health")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["Status"], json!({"Health": "OK"}));
    assert_eq!(response.body["Name"], json!("System 1"));
    assert_eq!(response.body["@odata.id"], json!("/redfish/v1/Systems/1"));
    assert!(response.body.get("AssetTag").is_none());
    assert!(response.body.get("Oem").is_none());
}

#[tokio::test]
async fn test_negative_select_removes_paths() {
    let harness = Harness::new();
    harness.create(system("1")).await;

    let response = harness.get("/redfish/v1/Systems/1?$select=!Oem").await;

    assert!(response.body.get("Oem").is_none());
    assert_eq!(response.body["AssetTag"], json!(""));
}

#[tokio::test]
async fn test_query_options_ignored_for_patch() {
    let harness = Harness::new();
    harness.create(system("1")).await;

    let response = harness
        .patch("/redfish/v1/Systems/1?$select=Name", r#"{"AssetTag": "x"}"#)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["AssetTag"], json!("x"));
    assert!(response.body.get("Oem").is_some());
}

#[tokio::test]
async fn test_top_and_skip_window() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let page = harness.get(&format!("{ENTRIES}?$top=2&$skip=1")).await;

    assert_eq!(ids(&page.body), vec!["2", "3"]);
    let next = page.body["Members@odata.nextLink"].as_str().unwrap();
    assert!(next.contains("%24skip=3"));
    assert!(next.contains("%24top=2"));
}

#[tokio::test]
async fn test_select_name_keeps_fixed_set_only() {
    let harness = Harness::new();
    harness.create(system("1")).await;

    let response = harness.get("/redfish/v1/Systems/1?$select=Name").await;

    let mut keys: Vec<&str> = response
        .body
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["@odata.context", "@odata.id", "@odata.type", "Description", "Id", "Name"]
    );
}

#[tokio::test]
async fn test_oversized_top_is_answered() {
    let harness = Harness::new();
    harness.create(log_entries(None)).await;

    let response = harness
        .get(&format!("{ENTRIES}?$skip=1&$top={}", usize::MAX))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(ids(&response.body), vec!["2", "3", "4", "5"]);
    assert!(response.body.get("Members@odata.nextLink").is_none());
}
