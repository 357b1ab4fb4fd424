//! Projection: materializing column values for a batch of document ids.
//!
//! The projection operator resolves its column sources once, then turns each
//! [`DocIdBlock`] pulled from the doc-id-set operator into one aligned
//! [`ProjectionBlock`]. A replicated wrapper lets several aggregation
//! consumers share a single projection without re-triggering the
//! materialization work.

use crate::error::Result;
use crate::filter::DocIdSetOperator;
use crate::operator::{Block, Operator, ProjectionBlock};
use crate::segment::{ColumnSource, Segment};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Materializes the requested columns for each doc-id batch.
pub struct ProjectionOperator {
    doc_ids: DocIdSetOperator,
    /// Resolved once at construction; order is the first-seen request order.
    columns: Vec<(String, Arc<dyn ColumnSource>)>,
    seq: u64,
    current: Option<ProjectionBlock>,
    opened: bool,
}

impl ProjectionOperator {
    /// Resolve `columns` against the segment and wrap the doc-id source.
    /// Unknown columns fail with `NotFound`.
    pub fn new(
        segment: &dyn Segment,
        columns: &[String],
        doc_ids: DocIdSetOperator,
    ) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|name| Ok((name.clone(), segment.column_source(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { doc_ids, columns, seq: 0, current: None, opened: false })
    }

    /// The most recently produced block, if any.
    #[must_use]
    pub fn current(&self) -> Option<&ProjectionBlock> {
        self.current.as_ref()
    }

    /// Matching documents pulled through so far.
    #[must_use]
    pub fn docs_scanned(&self) -> u64 {
        self.doc_ids.docs_scanned()
    }

    #[must_use]
    pub fn total_docs(&self) -> u32 {
        self.doc_ids.total_docs()
    }

    /// Pull the next doc-id batch and materialize it.
    pub fn advance(&mut self) -> Result<Option<ProjectionBlock>> {
        self.open()?;
        match self.doc_ids.next_doc_ids()? {
            Some(ids) => {
                let doc_ids = Arc::new(ids.into_inner());
                let mut columns = HashMap::with_capacity(self.columns.len());
                for (name, source) in &self.columns {
                    let values: Vec<Value> =
                        doc_ids.iter().map(|&doc_id| source.value_at(doc_id)).collect();
                    columns.insert(name.clone(), values);
                }
                self.seq += 1;
                let block = ProjectionBlock::new(self.seq, doc_ids, Arc::new(columns));
                self.current = Some(block.clone());
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// One-line description for plan explain output.
    #[must_use]
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|(n, _)| n.as_str()).collect();
        format!(
            "ProjectionOperator (columns: [{}])\n      {}",
            names.join(", "),
            self.doc_ids.describe()
        )
    }
}

impl Operator for ProjectionOperator {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            self.doc_ids.open()?;
            self.seq = 0;
            self.current = None;
            self.opened = true;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.advance()?.map(Block::Projection))
    }

    fn close(&mut self) -> Result<()> {
        self.doc_ids.close()?;
        self.opened = false;
        Ok(())
    }
}

/// A consumer-side view of a shared [`ProjectionOperator`].
///
/// Several aggregation sub-operators pull from the same projection; whichever
/// replica asks first advances the shared operator, and the rest recognize —
/// by block sequence identity — that a fresh block is already available and
/// take the cached one instead of re-projecting.
pub struct ReplicatedProjectionOperator {
    inner: Arc<Mutex<ProjectionOperator>>,
    last_seq: Option<u64>,
}

impl ReplicatedProjectionOperator {
    #[must_use]
    pub fn new(inner: Arc<Mutex<ProjectionOperator>>) -> Self {
        Self { inner, last_seq: None }
    }

    /// Pull the next projection block as seen by this replica.
    pub fn next_projection(&mut self) -> Result<Option<ProjectionBlock>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(current) = inner.current() {
            if Some(current.seq()) != self.last_seq {
                let block = current.clone();
                self.last_seq = Some(block.seq());
                return Ok(Some(block));
            }
        }
        match inner.advance()? {
            Some(block) => {
                self.last_seq = Some(block.seq());
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

impl Operator for ReplicatedProjectionOperator {
    fn open(&mut self) -> Result<()> {
        self.last_seq = None;
        self.inner.lock().unwrap().open()
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        Ok(self.next_projection()?.map(Block::Projection))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().unwrap().close()
    }
}
