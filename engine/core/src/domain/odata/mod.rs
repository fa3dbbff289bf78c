// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # OData Query Engine
//!
//! Applied to already-resolved results, in this order:
//!
//! | Step | Option | Scope |
//! |------|--------|-------|
//! | 1 | `$filter` | `Members` of collections, recomputes the count |
//! | 2 | `$skip` / `$top` | `Members` of collections, adds a next-link |
//! | 3 | `$select` | whole result |

pub mod filter;
pub mod pagination;
pub mod select;

use serde_json::Value;

use crate::domain::authorization::QueryOptions;

pub use filter::{filter_members, Filter, FilterError, FilterOp};
pub use pagination::{apply_collection_options, NEXT_LINK};
pub use select::{Selection, ALWAYS_SELECTED};

/// Run every query option against `result`. `path` is the request path used
/// for next-links.
pub fn apply_query(mut result: Value, query: &QueryOptions, path: &str) -> Value {
    if let Value::Object(map) = &mut result {
        apply_collection_options(map, query, path);
    }
    Selection::parse(&query.select).apply(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_pipeline_on_log_collection() {
        let result = json!({
            "@odata.id": "/redfish/v1/Managers/1/LogServices/Sel/Entries",
            "Name": "SEL",
            "Description": "System event log",
            "Members": [
                {"Id": "1", "Severity": "OK"},
                {"Id": "2", "Severity": "Critical"},
                {"Id": "3", "Severity": "Fatal"},
                {"Id": "4", "Severity": "Warning"}
            ],
            "Members@odata.count": 4
        });
        let query = QueryOptions::parse("$filter=Severity gt Warning&$select=Members");
        let out = apply_query(result, &query, "/redfish/v1/Managers/1/LogServices/Sel/Entries");

        assert_eq!(out["Members@odata.count"], json!(2));
        let ids: Vec<&str> = out["Members"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["Id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(out["Name"], json!("SEL"));
    }
}
