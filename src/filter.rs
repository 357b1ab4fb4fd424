//! Filter operators: leaf predicate scans, boolean AND/OR composites, and
//! the doc-id-set operator that feeds projection.
//!
//! All of them speak the batch-synchronized scan model: every leaf walks the
//! same fixed-size document ranges, emitting one (possibly empty)
//! [`DocIdBlock`] per range, so composites can combine sibling blocks
//! positionally. The AND operator returns terminal as soon as any child does;
//! with lockstep children that is exactly when the shared range space is
//! exhausted. Children with differing batch sizes are an intentional
//! non-goal of this model, and plan construction always hands every leaf the
//! same batch size.

use crate::error::{ExecError, Result};
use crate::operator::{Block, BlockId, DocIdBlock, Operator};
use crate::request::FilterPredicate;
use crate::segment::{ColumnSource, Segment};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/* ===================== predicates ===================== */

/// A leaf predicate compiled for scanning.
#[derive(Clone, Debug)]
pub enum ScanPredicate {
    Eq(Value),
    In(HashSet<Value>),
    Range { low: Option<Value>, high: Option<Value> },
}

impl ScanPredicate {
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ScanPredicate::Eq(expected) => value == expected,
            ScanPredicate::In(values) => values.contains(value),
            ScanPredicate::Range { low, high } => {
                let above = low.as_ref().is_none_or(|l| {
                    matches!(value.compare(l), Some(Ordering::Greater | Ordering::Equal))
                });
                let below = high.as_ref().is_none_or(|h| {
                    matches!(value.compare(h), Some(Ordering::Less | Ordering::Equal))
                });
                above && below
            }
        }
    }
}

/* ===================== filter operator tree ===================== */

/// Closed set of filter operator kinds.
pub enum FilterOperator {
    Scan(ScanFilterOperator),
    And(AndFilterOperator),
    Or(OrFilterOperator),
}

impl std::fmt::Debug for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterOperator::Scan(_) => f.write_str("FilterOperator::Scan"),
            FilterOperator::And(_) => f.write_str("FilterOperator::And"),
            FilterOperator::Or(_) => f.write_str("FilterOperator::Or"),
        }
    }
}

impl FilterOperator {
    /// Compile a predicate tree into an operator tree over one segment.
    ///
    /// Every leaf gets the same `batch_size` so the tree stays
    /// batch-synchronized. Unknown columns fail here with `NotFound`.
    pub fn build(
        predicate: &FilterPredicate,
        segment: &dyn Segment,
        batch_size: usize,
    ) -> Result<FilterOperator> {
        let leaf = |column: &str, predicate: ScanPredicate| -> Result<FilterOperator> {
            let source = segment.column_source(column)?;
            Ok(FilterOperator::Scan(ScanFilterOperator::new(
                source,
                predicate,
                segment.total_docs(),
                batch_size,
            )))
        };
        match predicate {
            FilterPredicate::Eq { column, value } => leaf(column, ScanPredicate::Eq(value.clone())),
            FilterPredicate::In { column, values } => {
                leaf(column, ScanPredicate::In(values.iter().cloned().collect()))
            }
            FilterPredicate::Range { column, low, high } => leaf(
                column,
                ScanPredicate::Range { low: low.clone(), high: high.clone() },
            ),
            FilterPredicate::And(children) => {
                let children = children
                    .iter()
                    .map(|c| Self::build(c, segment, batch_size))
                    .collect::<Result<Vec<_>>>()?;
                Ok(FilterOperator::And(AndFilterOperator::new(children)))
            }
            FilterPredicate::Or(children) => {
                let children = children
                    .iter()
                    .map(|c| Self::build(c, segment, batch_size))
                    .collect::<Result<Vec<_>>>()?;
                Ok(FilterOperator::Or(OrFilterOperator::new(children)))
            }
        }
    }

    /// Typed pull used by the doc-id-set operator and by composites.
    pub fn next_doc_ids(&mut self) -> Result<Option<DocIdBlock>> {
        match self {
            FilterOperator::Scan(op) => op.next_doc_ids(),
            FilterOperator::And(op) => op.next_doc_ids(),
            FilterOperator::Or(op) => op.next_doc_ids(),
        }
    }

    /// One-line description for plan explain output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            FilterOperator::Scan(op) => op.describe(),
            FilterOperator::And(op) => format!("AndFilterOperator ({} children)", op.children.len()),
            FilterOperator::Or(op) => format!("OrFilterOperator ({} children)", op.children.len()),
        }
    }
}

impl Operator for FilterOperator {
    fn open(&mut self) -> Result<()> {
        match self {
            FilterOperator::Scan(op) => op.open(),
            FilterOperator::And(op) => op.open(),
            FilterOperator::Or(op) => op.open(),
        }
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_doc_ids()?.map(Block::DocIds))
    }

    fn next_block_at(&mut self, block_id: BlockId) -> Result<Block> {
        match self {
            FilterOperator::Scan(op) => op.next_block_at(block_id),
            FilterOperator::And(op) => op.next_block_at(block_id),
            FilterOperator::Or(op) => op.next_block_at(block_id),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            FilterOperator::Scan(op) => op.close(),
            FilterOperator::And(op) => op.close(),
            FilterOperator::Or(op) => op.close(),
        }
    }
}

/* ===================== leaf scan ===================== */

/// Evaluates one column predicate over sequential doc-id ranges of a fixed
/// batch size, reusing one working buffer across calls.
pub struct ScanFilterOperator {
    source: std::sync::Arc<dyn ColumnSource>,
    predicate: ScanPredicate,
    total_docs: u32,
    batch_size: usize,
    cursor: u32,
    scratch: Vec<u32>,
    /// Set at `open` when no dictionary entry satisfies the predicate; the
    /// scan then emits empty blocks without touching per-document values.
    dictionary_miss: bool,
    opened: bool,
}

impl ScanFilterOperator {
    #[must_use]
    pub fn new(
        source: std::sync::Arc<dyn ColumnSource>,
        predicate: ScanPredicate,
        total_docs: u32,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            predicate,
            total_docs,
            batch_size,
            cursor: 0,
            scratch: Vec::new(),
            dictionary_miss: false,
            opened: false,
        }
    }

    pub fn next_doc_ids(&mut self) -> Result<Option<DocIdBlock>> {
        self.open()?;
        if self.cursor >= self.total_docs {
            return Ok(None);
        }
        let end = (self.cursor + self.batch_size as u32).min(self.total_docs);
        self.scratch.clear();
        if !self.dictionary_miss {
            for doc_id in self.cursor..end {
                if self.predicate.matches(&self.source.value_at(doc_id)) {
                    self.scratch.push(doc_id);
                }
            }
        }
        self.cursor = end;
        Ok(Some(DocIdBlock::new(self.scratch.clone())))
    }

    fn describe(&self) -> String {
        format!("ScanFilterOperator ({:?})", self.predicate)
    }
}

impl Operator for ScanFilterOperator {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            self.cursor = 0;
            self.dictionary_miss =
                !self.source.dictionary().iter().any(|v| self.predicate.matches(v));
            self.opened = true;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_doc_ids()?.map(Block::DocIds))
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }
}

/* ===================== AND ===================== */

/// Boolean AND over two or more child filter operators.
///
/// Pulls one block from every child per call and intersects them. Returns
/// terminal as soon as any child is exhausted: once a child has no further
/// ranges, the intersection over further ranges cannot be computed from
/// returned blocks. Children must be batch-synchronized (same batch size).
pub struct AndFilterOperator {
    children: Vec<FilterOperator>,
}

impl AndFilterOperator {
    #[must_use]
    pub fn new(children: Vec<FilterOperator>) -> Self {
        Self { children }
    }

    pub fn next_doc_ids(&mut self) -> Result<Option<DocIdBlock>> {
        let mut blocks = Vec::with_capacity(self.children.len());
        for child in &mut self.children {
            match child.next_doc_ids()? {
                Some(block) => blocks.push(block),
                None => return Ok(None),
            }
        }
        let mut blocks = blocks.into_iter();
        let mut acc = match blocks.next() {
            Some(block) => block.into_inner(),
            None => return Ok(None),
        };
        for block in blocks {
            acc = intersect_sorted(&acc, block.doc_ids());
            if acc.is_empty() {
                break;
            }
        }
        Ok(Some(DocIdBlock::new(acc)))
    }
}

impl Operator for AndFilterOperator {
    fn open(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.open()?;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_doc_ids()?.map(Block::DocIds))
    }

    fn next_block_at(&mut self, _block_id: BlockId) -> Result<Block> {
        Err(ExecError::UnsupportedOperation(
            "random block access on AND filter operator",
        ))
    }

    fn close(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.close()?;
        }
        Ok(())
    }
}

/* ===================== OR ===================== */

/// Boolean OR over two or more child filter operators.
///
/// Unions sibling blocks; a child returning terminal contributes nothing
/// further, and the OR itself is terminal only once every child is.
pub struct OrFilterOperator {
    children: Vec<FilterOperator>,
    exhausted: Vec<bool>,
}

impl OrFilterOperator {
    #[must_use]
    pub fn new(children: Vec<FilterOperator>) -> Self {
        let exhausted = vec![false; children.len()];
        Self { children, exhausted }
    }

    pub fn next_doc_ids(&mut self) -> Result<Option<DocIdBlock>> {
        let mut merged: Vec<u32> = Vec::new();
        let mut produced = false;
        for (child, exhausted) in self.children.iter_mut().zip(self.exhausted.iter_mut()) {
            if *exhausted {
                continue;
            }
            match child.next_doc_ids()? {
                Some(block) => {
                    produced = true;
                    merged.extend_from_slice(block.doc_ids());
                }
                None => *exhausted = true,
            }
        }
        if !produced {
            return Ok(None);
        }
        merged.sort_unstable();
        merged.dedup();
        Ok(Some(DocIdBlock::new(merged)))
    }
}

impl Operator for OrFilterOperator {
    fn open(&mut self) -> Result<()> {
        self.exhausted.fill(false);
        for child in &mut self.children {
            child.open()?;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_doc_ids()?.map(Block::DocIds))
    }

    fn next_block_at(&mut self, _block_id: BlockId) -> Result<Block> {
        Err(ExecError::UnsupportedOperation(
            "random block access on OR filter operator",
        ))
    }

    fn close(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.close()?;
        }
        Ok(())
    }
}

/* ===================== doc-id-set ===================== */

/// Scans a segment under an optional filter tree and yields batches of
/// matching document ids, counting how many it emitted.
///
/// With no filter it walks every document in fixed-size ranges.
pub struct DocIdSetOperator {
    filter: Option<FilterOperator>,
    total_docs: u32,
    batch_size: usize,
    cursor: u32,
    docs_scanned: u64,
    opened: bool,
}

impl DocIdSetOperator {
    #[must_use]
    pub fn new(filter: Option<FilterOperator>, total_docs: u32, batch_size: usize) -> Self {
        Self { filter, total_docs, batch_size, cursor: 0, docs_scanned: 0, opened: false }
    }

    /// Matching documents emitted so far.
    #[must_use]
    pub fn docs_scanned(&self) -> u64 {
        self.docs_scanned
    }

    #[must_use]
    pub fn total_docs(&self) -> u32 {
        self.total_docs
    }

    pub fn next_doc_ids(&mut self) -> Result<Option<DocIdBlock>> {
        self.open()?;
        let block = match &mut self.filter {
            Some(filter) => filter.next_doc_ids()?,
            None => {
                if self.cursor >= self.total_docs {
                    None
                } else {
                    let end = (self.cursor + self.batch_size as u32).min(self.total_docs);
                    let ids: Vec<u32> = (self.cursor..end).collect();
                    self.cursor = end;
                    Some(DocIdBlock::new(ids))
                }
            }
        };
        if let Some(block) = &block {
            self.docs_scanned += block.len() as u64;
        }
        Ok(block)
    }

    /// One-line description for plan explain output.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.filter {
            Some(filter) => format!(
                "DocIdSetOperator (batch: {})\n        {}",
                self.batch_size,
                filter.describe()
            ),
            None => format!("DocIdSetOperator (batch: {}, full scan)", self.batch_size),
        }
    }
}

impl Operator for DocIdSetOperator {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            self.cursor = 0;
            self.docs_scanned = 0;
            if let Some(filter) = &mut self.filter {
                filter.open()?;
            }
            self.opened = true;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_doc_ids()?.map(Block::DocIds))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(filter) = &mut self.filter {
            filter.close()?;
        }
        self.opened = false;
        Ok(())
    }
}

/// Intersection of two ascending doc-id slices.
fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
