use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::QueryError;
use crate::value::{InternalValue, Value};

pub type QueryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueryError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parameters of a list operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Field name -> required value. Values are compared by [`Value::as_key`],
    /// so `1` matches `"1"`.
    pub equals: BTreeMap<String, Value>,
    /// Rows to skip.
    pub offset: Option<usize>,
    /// Maximum number of rows returned.
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Does `row` satisfy every equality filter?
    pub fn matches(&self, row: &InternalValue) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| row.get(field).is_some_and(|actual| same_value(actual, expected)))
    }
}

/// Equal values, or values with the same canonical key.
pub fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_key(), b.as_key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Storage backend contract.
///
/// Every operation takes and returns internal values, never typed entities:
/// the serializer is the only place type-specific logic lives. Errors are
/// passed through to the caller unchanged; retries, if any, belong to the
/// driver.
pub trait QueryDriver: Send + Sync {
    /// Insert a row. Returns the stored row, including generated columns.
    fn create(&self, ctx: &Context, value: InternalValue) -> QueryFuture<'_, InternalValue>;

    fn retrieve(&self, ctx: &Context, id: &Value) -> QueryFuture<'_, InternalValue>;

    /// Merge `partial` into the row. Returns the updated row.
    fn update(&self, ctx: &Context, id: &Value, partial: InternalValue)
        -> QueryFuture<'_, InternalValue>;

    fn delete(&self, ctx: &Context, id: &Value) -> QueryFuture<'_, ()>;

    fn list(&self, ctx: &Context, filter: &ListFilter) -> QueryFuture<'_, Vec<InternalValue>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_by_canonical_key() {
        let row = InternalValue::new().with("id", 1u64).with("name", "John");
        assert!(ListFilter::new().matches(&row));
        assert!(ListFilter::new().with_equals("id", "1").matches(&row));
        assert!(ListFilter::new().with_equals("name", "John").matches(&row));
        assert!(!ListFilter::new().with_equals("name", "Jane").matches(&row));
        assert!(!ListFilter::new().with_equals("age", 3).matches(&row));
    }

    #[test]
    fn null_matches_only_null() {
        let row = InternalValue::new().with("nickname", Value::Null);
        assert!(ListFilter::new().with_equals("nickname", Value::Null).matches(&row));
        assert!(!ListFilter::new().with_equals("nickname", "").matches(&row));
    }
}
