// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collection query options: `$filter`, `$skip`, `$top` and next-link synthesis.

use serde_json::{Map, Value};

use crate::domain::aggregate::{MEMBERS, MEMBERS_COUNT};
use crate::domain::authorization::QueryOptions;
use crate::domain::odata::filter::filter_members;

pub const NEXT_LINK: &str = "Members@odata.nextLink";

/// Apply the collection options to a resolved result. Results without a
/// `Members` array are left alone.
///
/// Filtering rewrites `Members@odata.count`; paging does not.
pub fn apply_collection_options(result: &mut Map<String, Value>, query: &QueryOptions, path: &str) {
    if query.top.is_none() && query.skip.is_none() && query.filter.is_none() {
        return;
    }
    let mut members = match result.get_mut(MEMBERS) {
        Some(Value::Array(members)) => std::mem::take(members),
        _ => return,
    };

    if let Some(filter) = &query.filter {
        members = filter_members(filter, members);
    }
    result.insert(MEMBERS_COUNT.to_string(), Value::from(members.len()));

    let len = members.len();
    let skip = query.skip.unwrap_or(0);
    let begin = skip.min(len);
    let mut end = len;

    if let Some(top) = query.top.filter(|top| *top > 0) {
        // A page reaching past the end, including one whose bound overflows,
        // has no next link.
        if let Some(stop) = begin.checked_add(top).filter(|stop| *stop < len) {
            end = stop;
            result.insert(
                NEXT_LINK.to_string(),
                Value::String(next_link(path, &query.params, stop, top)),
            );
        }
    }

    let page: Vec<Value> = members.drain(begin..end).collect();
    result.insert(MEMBERS.to_string(), Value::Array(page));
}

/// Original query with `$skip`/`$top` replaced (or appended).
fn next_link(path: &str, params: &[(String, String)], skip: usize, top: usize) -> String {
    let skip = skip.to_string();
    let top = top.to_string();
    let mut seen_skip = false;
    let mut seen_top = false;
    let mut query = url::form_urlencoded::Serializer::new(String::new());

    for (key, value) in params {
        match key.as_str() {
            "$skip" if !seen_skip => {
                seen_skip = true;
                query.append_pair(key, &skip);
            }
            "$top" if !seen_top => {
                seen_top = true;
                query.append_pair(key, &top);
            }
            "$skip" | "$top" => {}
            _ => {
                query.append_pair(key, value);
            }
        }
    }
    if !seen_skip {
        query.append_pair("$skip", &skip);
    }
    if !seen_top {
        query.append_pair("$top", &top);
    }
    format!("{}?{}", path, query.finish())
}
