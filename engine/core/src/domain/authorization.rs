// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-request authorization context and OData query options.

use serde::{Deserialize, Serialize};

/// Page size applied when a request does not carry `$top`.
pub const DEFAULT_TOP: usize = 50;

/// Authenticated caller, as established by whatever sits in front of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub privileges: Vec<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>, privileges: Vec<String>) -> Self {
        Self {
            username: username.into(),
            privileges,
            licenses: Vec::new(),
        }
    }

    /// True when any held privilege appears in `required`.
    pub fn holds_any(&self, required: &[String]) -> bool {
        self.privileges.iter().any(|p| required.contains(p))
    }
}

/// Parsed `$top`/`$skip`/`$filter`/`$select` plus the raw parameters they
/// came from, kept for next-link synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub filter: Option<String>,
    pub select: Vec<String>,
    pub params: Vec<(String, String)>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top: Some(DEFAULT_TOP),
            skip: None,
            filter: None,
            select: Vec::new(),
            params: Vec::new(),
        }
    }
}

impl QueryOptions {
    /// Parse a raw query string. An unparseable `$top` or `$skip` disables
    /// that option rather than failing the request.
    pub fn parse(raw: &str) -> Self {
        let mut options = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "$top" => options.top = value.trim().parse().ok(),
                "$skip" => options.skip = value.trim().parse().ok(),
                "$filter" => options.filter = Some(value.to_string()),
                "$select" => options.select.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
            options.params.push((key.into_owned(), value.into_owned()));
        }
        options
    }
}

/// What a command decided after seeing the authorization context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    /// Fall through to the resource's privilege table.
    CheckPrivileges,
    Authorized,
    Unauthorized,
}

#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub principal: Principal,
    /// Only present for GET requests.
    pub query: Option<QueryOptions>,
}

impl AuthorizationContext {
    pub fn new(principal: Principal, query: Option<QueryOptions>) -> Self {
        Self { principal, query }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_query() {
        let options = QueryOptions::parse("");
        assert_eq!(options.top, Some(DEFAULT_TOP));
        assert_eq!(options.skip, None);
        assert!(options.filter.is_none());
        assert!(options.params.is_empty());
    }

    #[test]
    fn test_parse_all_options() {
        let options = QueryOptions::parse(
            "$top=2&$skip=1&$filter=Severity%20gt%20Warning&$select=Name,Status&$select=!Oem",
        );
        assert_eq!(options.top, Some(2));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.filter.as_deref(), Some("Severity gt Warning"));
        assert_eq!(options.select, vec!["Name", "Status", "!Oem"]);
        assert_eq!(options.params.len(), 5);
    }

    #[test]
    fn test_bad_top_disables_paging() {
        let options = QueryOptions::parse("$top=lots");
        assert_eq!(options.top, None);
    }

    #[test]
    fn test_privilege_intersection() {
        let principal = Principal::new("root", vec!["Login".into(), "ConfigureManager".into()]);
        assert!(principal.holds_any(&["ConfigureManager".to_string()]));
        assert!(!principal.holds_any(&["ConfigureUsers".to_string()]));
        assert!(!principal.holds_any(&[]));
    }
}
