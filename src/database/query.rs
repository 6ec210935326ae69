// ABOUTME: Engine-neutral query description with filters, ordering, and paging
// ABOUTME: Conditions evaluate directly against JSON rows for the in-process engine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::{Map, Value};

/// A stored row: column name to JSON value
pub type Row = Map<String, Value>;

/// Single-column predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq(String, Value),
    /// `column <> value`
    Ne(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
    /// `column > value`
    Gt(String, Value),
    /// `column >= value`
    Gte(String, Value),
    /// `column < value`
    Lt(String, Value),
    /// `column <= value`
    Lte(String, Value),
    /// `column IS NULL`
    IsNull(String),
}

impl Condition {
    /// Column the predicate reads
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Ne(c, _)
            | Self::In(c, _)
            | Self::Gt(c, _)
            | Self::Gte(c, _)
            | Self::Lt(c, _)
            | Self::Lte(c, _)
            | Self::IsNull(c) => c,
        }
    }

    /// Evaluate against a row; missing columns read as null
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => !value.is_null() && value == expected,
            Self::Ne(_, expected) => !value.is_null() && value != expected,
            Self::In(_, candidates) => !value.is_null() && candidates.contains(value),
            Self::Gt(_, bound) => compare_values(value, bound) == Some(Ordering::Greater),
            Self::Gte(_, bound) => matches!(
                compare_values(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(_, bound) => compare_values(value, bound) == Some(Ordering::Less),
            Self::Lte(_, bound) => matches!(
                compare_values(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::IsNull(_) => value.is_null(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

/// One ordering term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort by
    pub column: String,
    /// Direction
    pub direction: SortDirection,
}

/// Filters, ordering, and paging for a select
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Conjunction of predicates
    pub filters: Vec<Condition>,
    /// Ordering terms, applied in sequence
    pub order: Vec<OrderBy>,
    /// Maximum rows returned
    pub limit: Option<u64>,
    /// Rows skipped before returning
    pub offset: Option<u64>,
}

impl Query {
    /// Empty query matching every visible row
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Add an equality predicate
    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Eq(column.to_owned(), value.into()))
    }

    /// Add an ordering term
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order.push(OrderBy {
            column: column.to_owned(),
            direction,
        });
        self
    }

    /// Cap the number of rows
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip leading rows
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// True when every filter accepts the row
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Sort and page an already filtered row set
    #[must_use]
    pub fn arrange(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for term in &self.order {
                    let left = a.get(&term.column).unwrap_or(&Value::Null);
                    let right = b.get(&term.column).unwrap_or(&Value::Null);
                    let ord = compare_for_sort(left, right);
                    let ord = match term.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map_or(usize::MAX, |l| l as usize);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

/// Compare two scalar JSON values of the same kind
///
/// Returns `None` for nulls and mismatched kinds so range predicates never
/// match across types.
#[must_use]
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => {
            // Timestamps serialize with a variable number of fraction digits.
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// Nulls sort last, like PostgreSQL's default for ascending order.
fn compare_for_sort(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_ignores_nulls() {
        let r = row(json!({"code": "1000", "parent": null}));
        assert!(Condition::Eq("code".into(), json!("1000")).matches(&r));
        assert!(!Condition::Eq("parent".into(), Value::Null).matches(&r));
        assert!(Condition::IsNull("parent".into()).matches(&r));
        assert!(Condition::IsNull("missing".into()).matches(&r));
    }

    #[test]
    fn range_predicates_do_not_cross_types() {
        let r = row(json!({"amount": 500}));
        assert!(Condition::Gt("amount".into(), json!(100)).matches(&r));
        assert!(Condition::Lte("amount".into(), json!(500)).matches(&r));
        assert!(!Condition::Gt("amount".into(), json!("100")).matches(&r));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let whole = json!("2025-01-01T12:00:01Z");
        let fraction = json!("2025-01-01T12:00:01.500Z");
        assert_eq!(compare_values(&whole, &fraction), Some(Ordering::Less));
    }

    #[test]
    fn arrange_sorts_then_pages() {
        let rows = vec![
            row(json!({"code": "3000"})),
            row(json!({"code": "1000"})),
            row(json!({"code": null})),
            row(json!({"code": "2000"})),
        ];
        let query = Query::new()
            .order_by("code", SortDirection::Asc)
            .offset(1)
            .limit(2);
        let codes: Vec<_> = query
            .arrange(rows)
            .into_iter()
            .map(|r| r["code"].clone())
            .collect();
        assert_eq!(codes, vec![json!("2000"), json!("3000")]);
    }
}
