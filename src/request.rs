//! Query descriptors, as produced by an external request parser.
//!
//! The core consumes these verbatim: an ordered list of aggregations, an
//! optional group-by, an optional filter predicate tree, and a global
//! timeout. Output order always equals request order.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One requested aggregation: a function name plus its parameter map.
///
/// The only parameter every function understands is `column`, the aggregation
/// target (`*` for count-star).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub function: String,
    pub params: BTreeMap<String, String>,
}

impl AggregationSpec {
    #[must_use]
    pub fn new(function: impl Into<String>, column: impl Into<String>) -> Self {
        let mut params = BTreeMap::new();
        params.insert("column".to_string(), column.into());
        Self { function: function.into(), params }
    }

    /// The aggregation target column; `*` when absent.
    #[must_use]
    pub fn column(&self) -> &str {
        self.params.get("column").map_or("*", String::as_str)
    }

    /// Rendered name of the result slot, e.g. `count_star` or
    /// `sum_met_impressionCount`.
    #[must_use]
    pub fn result_name(&self) -> String {
        let column = self.column();
        let column = if column == "*" { "star" } else { column };
        format!("{}_{}", self.function, column)
    }
}

/// Group-by descriptor: ordered grouping columns and the top-N limit applied
/// at merge time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBySpec {
    /// Grouping columns; insertion order defines the key tuple order.
    pub columns: Vec<String>,
    /// Number of top groups kept per aggregation after merging.
    pub top_n: usize,
}

impl GroupBySpec {
    #[must_use]
    pub fn new(columns: Vec<String>, top_n: usize) -> Self {
        Self { columns, top_n }
    }
}

/// A boolean predicate tree over column values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterPredicate {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values…)`
    In { column: String, values: Vec<Value> },
    /// `low <= column <= high`; either bound may be absent. Bounds are
    /// inclusive.
    Range { column: String, low: Option<Value>, high: Option<Value> },
    And(Vec<FilterPredicate>),
    Or(Vec<FilterPredicate>),
}

/// A parsed query request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub filter: Option<FilterPredicate>,
    /// Order-preserving: result slot `i` always belongs to `aggregations[i]`.
    pub aggregations: Vec<AggregationSpec>,
    pub group_by: Option<GroupBySpec>,
    /// Wall-time bound for the inter-segment plan, in milliseconds.
    pub timeout_ms: u64,
}

impl QueryRequest {
    #[must_use]
    pub fn new(aggregations: Vec<AggregationSpec>) -> Self {
        Self { filter: None, aggregations, group_by: None, timeout_ms: 10_000 }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupBySpec) -> Self {
        self.group_by = Some(group_by);
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}
