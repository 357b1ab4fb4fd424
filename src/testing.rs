//! Testing utilities: in-memory segments and deterministic fixture data.
//!
//! The execution core only ever sees segments through the capability traits,
//! so tests (and downstream users writing their own) build fully in-memory
//! segments with [`SegmentBuilder`]. The [`fixture_segment`] dataset mirrors
//! the canonical scenario the integration tests assert against: 10001
//! documents where `column11 = "U"` matches exactly 582, and grouping by
//! `(column11, column10)` puts `("i", "")` on top with a count of 1450.

use crate::error::Result;
use crate::segment::{ColumnSource, Segment, unknown_column};
use crate::value::{ColumnType, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An in-memory column backed by a plain value vector.
pub struct MemColumn {
    values: Vec<Value>,
    dictionary: Vec<Value>,
    column_type: ColumnType,
}

impl MemColumn {
    /// Build from raw values. The dictionary is the distinct value set.
    ///
    /// # Panics
    /// Panics on an empty value vector; a segment always has documents.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        assert!(!values.is_empty(), "a column needs at least one value");
        let column_type = values[0].column_type();
        let dictionary: Vec<Value> =
            values.iter().cloned().collect::<HashSet<_>>().into_iter().collect();
        Self { values, dictionary, column_type }
    }
}

impl ColumnSource for MemColumn {
    fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn value_at(&self, doc_id: u32) -> Value {
        self.values[doc_id as usize].clone()
    }

    fn dictionary(&self) -> &[Value] {
        &self.dictionary
    }
}

/// An immutable in-memory segment.
pub struct MemSegment {
    name: String,
    total_docs: u32,
    columns: HashMap<String, Arc<MemColumn>>,
}

impl Segment for MemSegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_docs(&self) -> u32 {
        self.total_docs
    }

    fn column_source(&self, column: &str) -> Result<Arc<dyn ColumnSource>> {
        match self.columns.get(column) {
            Some(source) => Ok(Arc::clone(source) as Arc<dyn ColumnSource>),
            None => Err(unknown_column(&self.name, column)),
        }
    }
}

/// Fluent builder for in-memory segments.
///
/// ```
/// use basalt::testing::SegmentBuilder;
/// use basalt::Value;
///
/// let segment = SegmentBuilder::new("s0")
///     .column("dim", vec![Value::str("a"), Value::str("b")])
///     .column("met", vec![Value::Long(1), Value::Long(2)])
///     .build();
/// ```
pub struct SegmentBuilder {
    name: String,
    columns: Vec<(String, Vec<Value>)>,
}

impl SegmentBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: Vec::new() }
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.columns.push((name.into(), values));
        self
    }

    /// # Panics
    /// Panics when columns disagree on length or the segment is empty.
    #[must_use]
    pub fn build(self) -> Arc<MemSegment> {
        let total_docs = self.columns.first().map_or(0, |(_, values)| values.len());
        assert!(total_docs > 0, "a segment needs at least one document");
        let mut columns = HashMap::with_capacity(self.columns.len());
        for (name, values) in self.columns {
            assert_eq!(values.len(), total_docs, "column '{name}' length mismatch");
            columns.insert(name, Arc::new(MemColumn::new(values)));
        }
        Arc::new(MemSegment { name: self.name, total_docs: total_docs as u32, columns })
    }
}

/// Documents in the fixture segment.
pub const FIXTURE_TOTAL_DOCS: u32 = 10_001;
/// Documents matching `column11 = "U"` in the fixture segment.
pub const FIXTURE_U_MATCHES: u64 = 582;
/// Distinct `column12` values in the fixture segment.
pub const FIXTURE_COLUMN12_CARDINALITY: u64 = 101;

/// The fifteen largest `(column11, column10)` groups by count, descending.
/// Counts are strictly ordered, so the top-15 order is fully deterministic.
#[must_use]
pub fn fixture_top_groups() -> Vec<(&'static str, &'static str, u64)> {
    vec![
        ("i", "", 1450),
        ("D", "", 620),
        ("i", "CqC", 517),
        ("i", "QMl", 422),
        ("i", "bVnY", 365),
        ("i", "iV", 340),
        ("i", "zZe", 321),
        ("i", "xDLG", 296),
        ("i", "VsKz", 286),
        ("i", "mNh", 273),
        ("i", "ez", 271),
        ("i", "rNcu", 268),
        ("i", "EXYv", 234),
        ("i", "gpyD", 210),
        ("i", "yhq", 208),
    ]
}

const FILLER_NAMES: [&str; 17] = [
    "f00", "f01", "f02", "f03", "f04", "f05", "f06", "f07", "f08", "f09", "f10", "f11", "f12",
    "f13", "f14", "f15", "f16",
];

/// Every `(column11, column10, count)` group in the fixture, including the
/// `U` groups the canonical filter matches and the small filler groups.
fn fixture_groups() -> Vec<(&'static str, &'static str, u64)> {
    let mut groups = fixture_top_groups();
    // 582 documents with column11 = "U", spread below the top-15 cutoff.
    groups.push(("U", "u1", 194));
    groups.push(("U", "u2", 194));
    groups.push(("U", "u3", 194));
    // Filler up to 10001 documents, every group below the cutoff of 208.
    for name in FILLER_NAMES {
        groups.push(("F", name, 190));
    }
    groups.push(("F", "f17", 108));
    groups
}

/// Build the deterministic 10001-document fixture segment.
///
/// Columns: `column11`/`column10` (group-by dimensions), `column12`
/// (distinct-count dimension, 101 distinct values), `met_impressionCount`
/// (numeric metric, `(doc_id mod 977) + 1`).
#[must_use]
pub fn fixture_segment(name: impl Into<String>) -> Arc<MemSegment> {
    let mut column11 = Vec::with_capacity(FIXTURE_TOTAL_DOCS as usize);
    let mut column10 = Vec::with_capacity(FIXTURE_TOTAL_DOCS as usize);
    for (c11, c10, count) in fixture_groups() {
        for _ in 0..count {
            column11.push(Value::str(c11));
            column10.push(Value::str(c10));
        }
    }
    debug_assert_eq!(column11.len(), FIXTURE_TOTAL_DOCS as usize);
    let column12: Vec<Value> = (0..FIXTURE_TOTAL_DOCS)
        .map(|doc_id| Value::str(format!("w{}", u64::from(doc_id) % FIXTURE_COLUMN12_CARDINALITY)))
        .collect();
    let metric: Vec<Value> =
        (0..FIXTURE_TOTAL_DOCS).map(|doc_id| Value::Long(i64::from(doc_id % 977) + 1)).collect();
    SegmentBuilder::new(name)
        .column("column11", column11)
        .column("column10", column10)
        .column("column12", column12)
        .column("met_impressionCount", metric)
        .build()
}

/// `n` identical fixture segments, as the inter-segment plan consumes them.
#[must_use]
pub fn fixture_segments(n: usize) -> Vec<Arc<dyn Segment>> {
    (0..n).map(|i| fixture_segment(format!("segment_{i}")) as Arc<dyn Segment>).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_adds_up() {
        let total: u64 = fixture_groups().iter().map(|(_, _, count)| count).sum();
        assert_eq!(total, u64::from(FIXTURE_TOTAL_DOCS));
        let u_docs: u64 = fixture_groups()
            .iter()
            .filter(|(c11, _, _)| *c11 == "U")
            .map(|(_, _, count)| count)
            .sum();
        assert_eq!(u_docs, FIXTURE_U_MATCHES);
    }

    #[test]
    fn fixture_top_groups_strictly_ordered() {
        let top = fixture_top_groups();
        let counts: Vec<u64> = top.iter().map(|(_, _, c)| *c).collect();
        for pair in counts.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        // Nothing outside the top 15 reaches the cutoff.
        let cutoff = *counts.last().unwrap();
        for (c11, _, count) in fixture_groups() {
            if c11 == "U" || c11 == "F" {
                assert!(count < cutoff);
            }
        }
    }
}
