// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `$filter` parsing and evaluation.
//!
//! Grammar is a conjunction of clauses joined by ` and `; `or` is not
//! supported. A clause is `<field> <op> <value>` with op one of
//! `eq lt gt ge le`, or `contains(<field>, <value>)`.
//!
//! Evaluation rules per field type:
//! - `Severity` compares by ordinal (OK < Warning < Critical < Fatal)
//! - `Created` compares as a timestamp
//! - any other string matches by substring containment whatever the operator
//! - integers compare numerically
//! - arrays of strings match when any element contains the value
//! - other values always match

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// Nested location of fields in log-style records.
const LOG_FIELD_PREFIX: [&str; 2] = ["Oem", "Dell"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Gt,
    Ge,
    Le,
    Contains,
}

impl FilterOp {
    const INFIX: [(&'static str, FilterOp); 5] = [
        (" eq ", FilterOp::Eq),
        (" lt ", FilterOp::Lt),
        (" gt ", FilterOp::Gt),
        (" ge ", FilterOp::Ge),
        (" le ", FilterOp::Le),
    ];

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Contains => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("filter clause has no operator: '{0}'")]
    MissingOperator(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let mut clauses = Vec::new();
        for token in expr.split(" and ") {
            let infix = FilterOp::INFIX
                .iter()
                .find(|(needle, _)| token.contains(*needle));
            if let Some((needle, op)) = infix {
                let (field, value) = token.split_once(*needle).unwrap_or((token, ""));
                clauses.push(Clause {
                    field: normalize_field(field.trim()),
                    op: *op,
                    value: normalize_value(unquote(value.trim())),
                });
            } else if token.contains("contains") {
                // A contains() without a parseable argument pair is ignored.
                if let Some((field, value)) = contains_arguments(token) {
                    clauses.push(Clause {
                        field: normalize_field(&field),
                        op: FilterOp::Contains,
                        value,
                    });
                }
            } else {
                return Err(FilterError::MissingOperator(token.to_string()));
            }
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when `record` satisfies every clause.
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        self.clauses.iter().all(|clause| clause_matches(record, clause))
    }

    /// Keep matching members in their original order. Members that are not
    /// objects cannot be filtered, so the input is returned untouched.
    pub fn apply(&self, members: Vec<Value>) -> Vec<Value> {
        if self.clauses.is_empty() || members.iter().any(|m| !m.is_object()) {
            return members;
        }
        members
            .into_iter()
            .filter(|member| member.as_object().is_some_and(|record| self.matches(record)))
            .collect()
    }
}

/// Filter a member list; malformed syntax yields no members at all.
pub fn filter_members(expr: &str, members: Vec<Value>) -> Vec<Value> {
    match Filter::parse(expr) {
        Ok(filter) => filter.apply(members),
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting malformed $filter");
            Vec::new()
        }
    }
}

fn normalize_field(field: &str) -> String {
    if field.contains("MessageID") {
        "MessageId".to_string()
    } else {
        field.to_string()
    }
}

fn normalize_value(value: &str) -> String {
    if value == "Ok" {
        "OK".to_string()
    } else {
        value.to_string()
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && matches!(bytes[0], b'\'' | b'"')
        && matches!(bytes[bytes.len() - 1], b'\'' | b'"')
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// `contains(a, b)` → `(a, b)` with whitespace and quotes trimmed.
fn contains_arguments(token: &str) -> Option<(String, String)> {
    let open = token.find(['(', '[', '{'])?;
    let close = token.rfind([')', ']', '}'])?;
    if close <= open {
        return None;
    }
    let inner = &token[open + 1..close];
    let (field, value) = inner.rsplit_once(',')?;
    Some((
        unquote(field.trim()).to_string(),
        unquote(value.trim()).to_string(),
    ))
}

fn lookup<'a>(record: &'a serde_json::Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(*first)?;
    for segment in rest {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

fn field_value<'a>(record: &'a serde_json::Map<String, Value>, field: &str) -> Option<&'a Value> {
    let path: Vec<&str> = field.split('/').collect();
    lookup(record, &path).or_else(|| {
        let mut log_path = LOG_FIELD_PREFIX.to_vec();
        log_path.push(field);
        lookup(record, &log_path)
    })
}

fn severity_rank(severity: &str) -> Option<u8> {
    match severity {
        "OK" => Some(1),
        "Warning" => Some(2),
        "Critical" => Some(3),
        "Fatal" => Some(4),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

fn clause_matches(record: &serde_json::Map<String, Value>, clause: &Clause) -> bool {
    let Some(value) = field_value(record, &clause.field) else {
        return false;
    };
    match value {
        Value::String(text) if clause.field == "Severity" => {
            match (severity_rank(text), severity_rank(&clause.value)) {
                (Some(have), Some(want)) => clause.op.accepts(have.cmp(&want)),
                _ => false,
            }
        }
        Value::String(text) if clause.field == "Created" => {
            match (parse_timestamp(text), parse_timestamp(&clause.value)) {
                (Some(have), Some(want)) => clause.op.accepts(have.cmp(&want)),
                _ => false,
            }
        }
        Value::String(text) => text.contains(clause.value.as_str()),
        Value::Number(number) => match (number.as_i64(), clause.value.parse::<i64>()) {
            (Some(have), Ok(want)) => clause.op.accepts(have.cmp(&want)),
            _ => false,
        },
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| item.contains(clause.value.as_str())),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> Vec<Value> {
        vec![
            json!({"Id": "1", "Severity": "OK", "Message": "fan ok", "Created": "2024-01-01T00:00:00Z"}),
            json!({"Id": "2", "Severity": "Critical", "Message": "psu lost", "Created": "2024-01-02T00:00:00+00:00"}),
            json!({"Id": "3", "Severity": "Warning", "Message": "fan slow", "Created": "2024-01-03T00:00:00+0000"}),
            json!({"Id": "4", "Severity": "Fatal", "Message": "cpu ierr", "Created": "2024-01-04T00:00:00Z"}),
            json!({"Id": "5", "Severity": "Critical", "Message": "temp high", "Created": "2024-01-05T00:00:00Z"}),
        ]
    }

    fn ids(members: &[Value]) -> Vec<&str> {
        members.iter().map(|m| m["Id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_severity_is_ordinal() {
        let kept = filter_members("Severity gt Warning", entries());
        assert_eq!(ids(&kept), vec!["2", "4", "5"]);

        let kept = filter_members("Severity le Warning", entries());
        assert_eq!(ids(&kept), vec!["1", "3"]);

        let kept = filter_members("Severity eq Ok", entries());
        assert_eq!(ids(&kept), vec!["1"]);
    }

    #[test]
    fn test_strings_match_by_containment_for_any_operator() {
        let kept = filter_members("Message eq fan", entries());
        assert_eq!(ids(&kept), vec!["1", "3"]);
        let kept = filter_members("Message gt fan", entries());
        assert_eq!(ids(&kept), vec!["1", "3"]);
    }

    #[test]
    fn test_created_accepts_offset_without_colon() {
        let kept = filter_members("Created ge 2024-01-03T00:00:00Z", entries());
        assert_eq!(ids(&kept), vec!["3", "4", "5"]);
        let kept = filter_members("Created lt 2024-01-02T00:00:00+0000", entries());
        assert_eq!(ids(&kept), vec!["1"]);
    }

    #[test]
    fn test_conjunction_and_contains() {
        let kept = filter_members("Severity ge Critical and contains(Message, 'temp')", entries());
        assert_eq!(ids(&kept), vec!["5"]);
    }

    #[test]
    fn test_or_is_not_supported() {
        // "or" is not an operator; the clause becomes a containment test on
        // "Critical or Severity eq Fatal" and the ordinal lookup fails.
        let kept = filter_members("Severity eq Critical or Severity eq Fatal", entries());
        assert!(kept.is_empty());
    }

    #[test]
    fn test_malformed_filter_yields_nothing() {
        assert!(filter_members("Severity Critical", entries()).is_empty());
        assert_eq!(
            Filter::parse("Severity Critical"),
            Err(FilterError::MissingOperator("Severity Critical".to_string()))
        );
    }

    #[test]
    fn test_missing_field_drops_record_and_log_fallback() {
        let members = vec![
            json!({"Id": "a", "Oem": {"Dell": {"Category": "Audit"}}}),
            json!({"Id": "b", "Status": {"Health": "OK"}}),
        ];
        let kept = filter_members("Category eq Audit", members.clone());
        assert_eq!(ids(&kept), vec!["a"]);
        let kept = filter_members("Status/Health eq OK", members);
        assert_eq!(ids(&kept), vec!["b"]);
    }

    #[test]
    fn test_numbers_arrays_and_other_types() {
        let members = vec![
            json!({"Id": "a", "Reading": 10, "Tags": ["cpu", "thermal"], "Enabled": true}),
            json!({"Id": "b", "Reading": 30, "Tags": ["psu"], "Enabled": false}),
        ];
        assert_eq!(ids(&filter_members("Reading gt 15", members.clone())), vec!["b"]);
        assert_eq!(ids(&filter_members("Tags eq therm", members.clone())), vec!["a"]);
        assert_eq!(ids(&filter_members("Enabled eq true", members)), vec!["a", "b"]);
    }

    #[test]
    fn test_message_id_alias() {
        let filter = Filter::parse("MessageID eq Base.1.0.Success").unwrap();
        assert_eq!(filter.clauses()[0].field, "MessageId");
    }
}
