//! Literal row values
//!
//! When a formula is compiled for a single row (update or insert mode),
//! same-table field references are substituted with the actual values taken
//! from that row instead of column references. These are those values.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};

use crate::field::SelectOption;

/// A literal value taken from one row of a table
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Text(String),
    Number(BigDecimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// A duration in seconds.
    Interval(i64),
    /// A single select choice; always carried as the full structured option
    /// so references serialize as `{id, value, color}`.
    Select(SelectOption),
    /// A materialized multi-value result, e.g. a multiple select.
    TextList(Vec<String>),
}

impl RowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }
}

impl From<&str> for RowValue {
    fn from(s: &str) -> Self {
        RowValue::Text(s.to_string())
    }
}

impl From<BigDecimal> for RowValue {
    fn from(n: BigDecimal) -> Self {
        RowValue::Number(n)
    }
}

impl From<i64> for RowValue {
    fn from(n: i64) -> Self {
        RowValue::Number(BigDecimal::from(n))
    }
}

impl From<bool> for RowValue {
    fn from(b: bool) -> Self {
        RowValue::Boolean(b)
    }
}

/// One row's values, keyed by database column name (`field_{id}`)
///
/// Missing columns read as [`RowValue::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, RowValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<RowValue>) {
        self.values.insert(column.into(), value.into());
    }

    /// Builder-style variant of [`Row::set`] for test fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> RowValue {
        self.values.get(column).cloned().unwrap_or(RowValue::Null)
    }
}
