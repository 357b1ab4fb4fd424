//! The pull-based operator contract and the blocks that flow through it.
//!
//! Every execution unit is a stateful, single-pass [`Operator`]: `open` it
//! (idempotent), pull [`Block`]s with `next_block` until it returns `None`
//! (the terminal signal), then `close` it. Calling `next_block` after the
//! terminal signal without reopening is not supported and simply keeps
//! returning `None`.
//!
//! The set of operator kinds is closed: filter scan/AND/OR, doc-id-set,
//! projection (plain and replicated), aggregation, and aggregation-group-by.
//! There is no open-ended subclassing; composition happens through concrete
//! types, and the trait exists so tests and callers can drive any of them
//! uniformly.

use crate::error::{ExecError, Result};
use crate::intermediate::IntermediateResultsBlock;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Number of document ids scanned per batch by leaf operators.
pub const DOC_BATCH_SIZE: usize = 5000;

/// Identifier of one block within an operator's output sequence.
///
/// Only exists so random access can be *requested*; the scan model is
/// sequential-only and every operator rejects it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BlockId(u64);

impl BlockId {
    #[must_use]
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An ordered batch of matching document ids.
///
/// May be empty when a scanned range had no matches; emptiness is not the
/// terminal signal (that is `None` from `next_block`), so batch-synchronized
/// composites keep their children in lockstep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocIdBlock {
    doc_ids: Vec<u32>,
}

impl DocIdBlock {
    #[must_use]
    pub fn new(doc_ids: Vec<u32>) -> Self {
        Self { doc_ids }
    }

    #[must_use]
    pub fn doc_ids(&self) -> &[u32] {
        &self.doc_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u32> {
        self.doc_ids
    }
}

/// Columnar values materialized for one [`DocIdBlock`].
///
/// Column vectors are aligned with the doc-id order. The payload sits behind
/// `Arc`s so replicated consumers share one materialization; `seq` is the
/// block identity they use to detect whether the owning projection has
/// already advanced.
#[derive(Clone, Debug)]
pub struct ProjectionBlock {
    seq: u64,
    doc_ids: Arc<Vec<u32>>,
    columns: Arc<HashMap<String, Vec<Value>>>,
}

impl ProjectionBlock {
    #[must_use]
    pub fn new(seq: u64, doc_ids: Arc<Vec<u32>>, columns: Arc<HashMap<String, Vec<Value>>>) -> Self {
        Self { seq, doc_ids, columns }
    }

    /// Identity of this block within its projection's output sequence.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn doc_ids(&self) -> &[u32] {
        &self.doc_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Values of one projected column, aligned with [`doc_ids`](Self::doc_ids).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// An opaque, typed batch passed between operators.
#[derive(Clone, Debug)]
pub enum Block {
    DocIds(DocIdBlock),
    Projection(ProjectionBlock),
    Intermediate(IntermediateResultsBlock),
}

/// The uniform open / next / close capability.
pub trait Operator {
    /// Idempotent setup. Propagates to children. Reopening after `close`
    /// rewinds the operator to the start of its input.
    fn open(&mut self) -> Result<()>;

    /// Pull the next block, or `None` once the input is exhausted.
    fn next_block(&mut self) -> Result<Option<Block>>;

    /// Random access by block id. The scan model is sequential-only, so this
    /// fails with [`ExecError::UnsupportedOperation`] on every operator.
    fn next_block_at(&mut self, _block_id: BlockId) -> Result<Block> {
        Err(ExecError::UnsupportedOperation(
            "random block access on a sequential scan operator",
        ))
    }

    /// Release resources. Propagates to children.
    fn close(&mut self) -> Result<()>;
}
