// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `$select` projection.
//!
//! Selectors are `/`-separated paths whose segments may contain `*`
//! wildcards. Each segment is compiled into an anchored regular expression
//! with every other metacharacter escaped. A select list made only of
//! `!path` entries removes those paths instead.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Top-level keys that survive any positive selection.
pub const ALWAYS_SELECTED: [&str; 4] = ["Id", "Name", "Description", "AttributeRegistry"];

/// Upper bound on a single selector; longer ones are ignored.
const MAX_SELECTOR_LEN: usize = 256;

#[derive(Debug, Clone, Default)]
pub enum Selection {
    #[default]
    All,
    Include(Vec<Vec<Regex>>),
    Exclude(Vec<Vec<String>>),
}

impl Selection {
    pub fn parse(selectors: &[String]) -> Self {
        let (negative, positive): (Vec<&String>, Vec<&String>) =
            selectors.iter().partition(|s| s.starts_with('!'));

        if positive.is_empty() {
            let paths: Vec<Vec<String>> = negative
                .iter()
                .map(|s| split_path(&s[1..]).into_iter().map(str::to_string).collect())
                .filter(|p: &Vec<String>| !p.is_empty())
                .collect();
            return if paths.is_empty() {
                Selection::All
            } else {
                Selection::Exclude(paths)
            };
        }

        let matchers: Vec<Vec<Regex>> = positive
            .iter()
            .filter(|s| s.len() <= MAX_SELECTOR_LEN)
            .filter_map(|s| compile_path(s))
            .collect();
        Selection::Include(matchers)
    }

    pub fn apply(&self, value: Value) -> Value {
        match self {
            Selection::All => value,
            Selection::Include(paths) => {
                let refs: Vec<&[Regex]> = paths.iter().map(Vec::as_slice).collect();
                include(value, &refs, true)
            }
            Selection::Exclude(paths) => {
                let mut value = value;
                for path in paths {
                    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                    exclude(&mut value, &segments);
                }
                value
            }
        }
    }
}

fn split_path(selector: &str) -> Vec<&str> {
    selector.split('/').filter(|s| !s.is_empty()).collect()
}

fn compile_path(selector: &str) -> Option<Vec<Regex>> {
    let segments = split_path(selector);
    if segments.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        let pattern = format!("^{}$", regex::escape(segment).replace(r"\*", ".*"));
        match Regex::new(&pattern) {
            Ok(re) => out.push(re),
            Err(e) => {
                debug!(selector = %selector, error = %e, "Ignoring unusable $select entry");
                return None;
            }
        }
    }
    Some(out)
}

fn include(value: Value, paths: &[&[Regex]], top_level: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                if top_level && (ALWAYS_SELECTED.contains(&key.as_str()) || key.contains('@')) {
                    out.insert(key, child);
                    continue;
                }
                let mut whole = false;
                let mut nested: Vec<&[Regex]> = Vec::new();
                for path in paths {
                    let Some((head, rest)) = path.split_first() else {
                        continue;
                    };
                    if head.is_match(&key) {
                        if rest.is_empty() {
                            whole = true;
                        } else {
                            nested.push(rest);
                        }
                    }
                }
                if whole {
                    out.insert(key, child);
                } else if !nested.is_empty() {
                    out.insert(key, include(child, &nested, false));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| include(item, paths, top_level))
                .collect(),
        ),
        other => other,
    }
}

fn exclude(value: &mut Value, path: &[&str]) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    match value {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*head);
            } else if let Some(child) = map.get_mut(*head) {
                exclude(child, rest);
            }
        }
        Value::Array(items) => {
            for item in items {
                exclude(item, path);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource() -> Value {
        json!({
            "@odata.id": "/redfish/v1/Systems/1",
            "@odata.type": "#ComputerSystem.v1_5_0.ComputerSystem",
            "Id": "1",
            "Name": "System",
            "Description": "Main board",
            "AttributeRegistry": "BiosAttributeRegistry",
            "Members@odata.count": 0,
            "Status": {"State": "Enabled", "Health": "OK"},
            "Oem": {"Vendor": {"Serial": "X"}},
            "Links": {"Chassis": [{"@odata.id": "/redfish/v1/Chassis/1"}]}
        })
    }

    fn sel(list: &[&str]) -> Selection {
        Selection::parse(&list.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_select_name_keeps_only_fixed_set() {
        let projected = sel(&["Name"]).apply(resource());
        let mut keys: Vec<&str> = projected.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "@odata.id",
                "@odata.type",
                "AttributeRegistry",
                "Description",
                "Id",
                "Members@odata.count",
                "Name"
            ]
        );
    }

    #[test]
    fn test_nested_path_selection() {
        let projected = sel(&["Status/Health"]).apply(resource());
        assert_eq!(projected["Status"], json!({"Health": "OK"}));
        assert!(projected.get("Oem").is_none());
    }

    #[test]
    fn test_wildcard_is_the_only_metacharacter() {
        let projected = sel(&["Sta*"]).apply(resource());
        assert_eq!(projected["Status"]["State"], json!("Enabled"));

        // "." must not act as a regex wildcard.
        let projected = sel(&["S.atus"]).apply(resource());
        assert!(projected.get("Status").is_none());

        // Anchored: "Link" does not select "Links".
        let projected = sel(&["Link"]).apply(resource());
        assert!(projected.get("Links").is_none());
    }

    #[test]
    fn test_selection_descends_into_arrays() {
        let value = json!({"Id": "x", "Items": [{"A": 1, "B": 2}, {"A": 3, "B": 4}]});
        let projected = sel(&["Items/A"]).apply(value);
        assert_eq!(projected["Items"], json!([{"A": 1}, {"A": 3}]));
    }

    #[test]
    fn test_negative_only_excludes() {
        let projected = sel(&["!Oem", "!Status/State"]).apply(resource());
        assert!(projected.get("Oem").is_none());
        assert_eq!(projected["Status"], json!({"Health": "OK"}));
        assert_eq!(projected["Name"], json!("System"));
    }

    #[test]
    fn test_mixed_select_ignores_negatives() {
        let projected = sel(&["Oem", "!Oem"]).apply(resource());
        assert!(projected.get("Oem").is_some());
        assert!(projected.get("Status").is_none());
    }

    #[test]
    fn test_empty_select_keeps_everything() {
        assert_eq!(sel(&[]).apply(resource()), resource());
    }
}
