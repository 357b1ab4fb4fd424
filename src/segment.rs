//! The segment capability consumed by the execution core.
//!
//! A segment is an immutable unit of columnar storage, loaded out-of-band and
//! read-only for the lifetime of every query that touches it. The core never
//! sees the on-disk format; it only pulls values through [`ColumnSource`]
//! handles. Segments are shared across concurrently executing per-segment
//! plans, so both traits are `Send + Sync` and hold no query state.

use crate::error::{ExecError, Result};
use crate::value::{ColumnType, Value};
use std::sync::Arc;

/// Read-only access to one column of one segment.
pub trait ColumnSource: Send + Sync {
    /// Declared type of the column's values.
    fn column_type(&self) -> ColumnType;

    /// Random/sequential value lookup by document id.
    ///
    /// Callers only pass ids previously produced by a scan over the same
    /// segment, so `doc_id` is always in range.
    fn value_at(&self, doc_id: u32) -> Value;

    /// The column's dictionary: its distinct values. Filter predicates probe
    /// this before scanning so a predicate no dictionary entry satisfies can
    /// skip per-document evaluation entirely.
    fn dictionary(&self) -> &[Value];
}

/// An immutable columnar segment.
pub trait Segment: Send + Sync {
    /// Segment name, used only for diagnostics.
    fn name(&self) -> &str;

    /// Total number of documents stored in this segment.
    fn total_docs(&self) -> u32;

    /// Hand out the data-source capability for one column.
    ///
    /// Fails with [`ExecError::NotFound`] for unknown column names, which
    /// fails the one segment task that asked.
    fn column_source(&self, column: &str) -> Result<Arc<dyn ColumnSource>>;
}

/// Standard `NotFound` for an unknown column, shared by segment impls.
#[must_use]
pub fn unknown_column(segment: &str, column: &str) -> ExecError {
    ExecError::NotFound(format!("column '{column}' in segment '{segment}'"))
}
