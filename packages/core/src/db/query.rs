//! Query Description
//!
//! Filters, orderings and limits for `DataStore::select`, plus the
//! in-process evaluation both bundled stores use. Filters combine with AND.
//!
//! # Ordering
//!
//! Missing/null values sort first in ascending order. Numbers compare
//! numerically, strings lexicographically (stored timestamps are fixed
//! precision, so this is chronological). Ties fall back to insertion order,
//! reversed when the primary order is descending so "newest first" holds
//! even for rows written within the same microsecond.

use crate::db::Record;
use serde_json::Value;
use std::cmp::Ordering;

/// A single row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value (numbers compare numerically)
    Eq(String, Value),
    /// Column differs from value (missing columns differ from everything)
    Neq(String, Value),
    /// Column missing or null
    IsNull(String),
    /// Column equals one of the values
    In(String, Vec<Value>),
    /// Materialized-path subtree: column equals the path or extends it with `/`
    PathPrefix(String, String),
    /// Case-insensitive substring match on a string column
    ContainsInsensitive(String, String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn one_of<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn path_prefix(column: impl Into<String>, path: impl Into<String>) -> Self {
        Self::PathPrefix(column.into(), path.into())
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::ContainsInsensitive(column.into(), needle.into())
    }

    /// Evaluate this filter against a row
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq(column, value) => record
                .get(column)
                .is_some_and(|actual| values_equal(actual, value)),
            Filter::Neq(column, value) => !record
                .get(column)
                .is_some_and(|actual| values_equal(actual, value)),
            Filter::IsNull(column) => record.get(column).map_or(true, Value::is_null),
            Filter::In(column, values) => record
                .get(column)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Filter::PathPrefix(column, prefix) => match record.get(column).and_then(Value::as_str) {
                Some(path) => is_path_within(path, prefix),
                None => false,
            },
            Filter::ContainsInsensitive(column, needle) => {
                match record.get(column).and_then(Value::as_str) {
                    Some(text) => text.to_lowercase().contains(&needle.to_lowercase()),
                    None => false,
                }
            }
        }
    }
}

/// True when every filter matches
pub fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|f| f.matches(record))
}

/// `path` is `prefix` itself or lies underneath it
///
/// A trailing `/` on the prefix is tolerated. `/a/bc` is not within `/a/b`.
pub fn is_path_within(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Descending,
        }
    }
}

/// Parameters for `DataStore::select`
///
/// An empty `Select` returns every row of the table in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn order_by_all(mut self, orders: impl IntoIterator<Item = Order>) -> Self {
        self.order.extend(orders);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the query over rows given in insertion order
    pub fn apply(&self, rows: Vec<Record>) -> Vec<Record> {
        let mut matched: Vec<(usize, Record)> = rows
            .into_iter()
            .enumerate()
            .filter(|(_, row)| matches_all(&self.filters, row))
            .collect();

        if !self.order.is_empty() {
            let newest_first = self.order[0].direction == Direction::Descending;
            matched.sort_by(|(seq_a, a), (seq_b, b)| {
                for order in &self.order {
                    let ord = compare_values(a.get(&order.column), b.get(&order.column));
                    let ord = match order.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                if newest_first {
                    seq_b.cmp(seq_a)
                } else {
                    seq_a.cmp(seq_b)
                }
            });
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        matched.into_iter().take(limit).map(|(_, row)| row).collect()
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Total order over optional JSON values used for sorting
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
