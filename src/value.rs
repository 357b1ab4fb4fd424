//! Typed column values.
//!
//! Everything a column source hands to the execution core, and everything a
//! group key is made of, is a [`Value`]. Doubles are wrapped in
//! [`OrderedFloat`] so values are hashable and totally ordered, which group
//! keys and distinct-count sets require.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single column value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Long(i64),
    Double(OrderedFloat<f64>),
    Str(String),
}

/// Declared type of one column (or of one result slot on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Long,
    Double,
    Str,
}

impl Value {
    /// Convenience constructor for doubles.
    #[must_use]
    pub fn double(v: f64) -> Self {
        Value::Double(OrderedFloat(v))
    }

    /// Convenience constructor for strings.
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// The numeric reading of this value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(v.0),
            Value::Str(_) => None,
        }
    }

    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Long(_) => ColumnType::Long,
            Value::Double(_) => ColumnType::Double,
            Value::Str(_) => ColumnType::Str,
        }
    }

    /// Ordering used by range predicates: numeric when both sides are
    /// numeric (longs and doubles compare against each other), lexicographic
    /// for strings. Mixed string/number pairs are incomparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{}", v.0),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}
