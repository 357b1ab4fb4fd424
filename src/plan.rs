//! Execution plans: one operator tree per segment, fanned out across all
//! local segments, folded into a single per-server DataTable.
//!
//! The intra-segment plan wires filter → doc-id-set → projection →
//! aggregation[-group-by] for one segment. The inter-segment plan runs one
//! such plan per segment on the shared worker pool, folds results through
//! the combine service as they complete, and bounds total wall time by the
//! request timeout — on expiry it stops waiting and returns whatever merged
//! partial result exists, tagged so callers can detect partial completion.
//! A single segment's failure is logged and excluded; it never fails the
//! plan.

use crate::aggregate::{AggregationOperator, parse_functions};
use crate::combine;
use crate::datatable::DataTable;
use crate::error::Result;
use crate::filter::{DocIdSetOperator, FilterOperator};
use crate::groupby::AggregationGroupByOperator;
use crate::intermediate::IntermediateResultsBlock;
use crate::operator::{DOC_BATCH_SIZE, Operator};
use crate::projection::ProjectionOperator;
use crate::request::QueryRequest;
use crate::segment::Segment;
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Root of one segment's operator tree.
enum RootOperator {
    Aggregation(AggregationOperator),
    GroupBy(AggregationGroupByOperator),
}

impl RootOperator {
    fn execute(&mut self) -> Result<IntermediateResultsBlock> {
        match self {
            RootOperator::Aggregation(op) => op.execute(),
            RootOperator::GroupBy(op) => op.execute(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            RootOperator::Aggregation(op) => op.close(),
            RootOperator::GroupBy(op) => op.close(),
        }
    }

    fn describe(&self) -> String {
        match self {
            RootOperator::Aggregation(op) => op.describe(),
            RootOperator::GroupBy(op) => op.describe(),
        }
    }
}

/// The intra-segment plan: a runnable unit producing one
/// [`IntermediateResultsBlock`] for one segment.
pub struct SegmentPlan {
    segment: Arc<dyn Segment>,
    request: Arc<QueryRequest>,
    batch_size: usize,
}

impl SegmentPlan {
    #[must_use]
    pub fn new(segment: Arc<dyn Segment>, request: Arc<QueryRequest>) -> Self {
        Self { segment, request, batch_size: DOC_BATCH_SIZE }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Columns the projection must materialize: group-by columns plus every
    /// aggregation target, first-seen order, `*` excluded.
    fn projection_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if name != "*" && !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        };
        if let Some(group_by) = &self.request.group_by {
            for column in &group_by.columns {
                push(column);
            }
        }
        for spec in &self.request.aggregations {
            push(spec.column());
        }
        columns
    }

    /// Build the concrete operator tree for this segment. Every leaf filter
    /// gets the plan's batch size, keeping the tree batch-synchronized.
    fn build(&self) -> Result<RootOperator> {
        let filter = self
            .request
            .filter
            .as_ref()
            .map(|predicate| FilterOperator::build(predicate, self.segment.as_ref(), self.batch_size))
            .transpose()?;
        let doc_ids =
            DocIdSetOperator::new(filter, self.segment.total_docs(), self.batch_size);
        let projection = Arc::new(Mutex::new(ProjectionOperator::new(
            self.segment.as_ref(),
            &self.projection_columns(),
            doc_ids,
        )?));
        match &self.request.group_by {
            Some(group_by) => Ok(RootOperator::GroupBy(AggregationGroupByOperator::new(
                self.request.aggregations.clone(),
                group_by.clone(),
                projection,
            )?)),
            None => Ok(RootOperator::Aggregation(AggregationOperator::new(
                self.request.aggregations.clone(),
                projection,
            )?)),
        }
    }

    /// Run the tree to completion and hand back this segment's partial
    /// result.
    pub fn run(&self) -> Result<IntermediateResultsBlock> {
        let mut root = self.build()?;
        let block = root.execute()?;
        root.close()?;
        Ok(block)
    }

    /// Render the operator tree, one operator per line.
    pub fn explain(&self) -> Result<String> {
        let root = self.build()?;
        Ok(format!(
            "SegmentPlan (segment: {})\n  {}",
            self.segment.name(),
            root.describe()
        ))
    }
}

/// The inter-segment plan: every local segment scanned in parallel, results
/// folded into one per-server [`DataTable`].
pub struct InstancePlan {
    segments: Vec<Arc<dyn Segment>>,
    request: Arc<QueryRequest>,
    workers: usize,
}

impl InstancePlan {
    #[must_use]
    pub fn new(segments: Vec<Arc<dyn Segment>>, request: QueryRequest) -> Self {
        Self { segments, request: Arc::new(request), workers: num_cpus::get().max(2) }
    }

    /// Size the shared worker pool explicitly (defaults to one worker per
    /// core). First caller wins, as the pool is process-global.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Execute every segment plan, fold as results arrive, truncate grouped
    /// results to top-N on the final fold, and encode the server response.
    ///
    /// Only a malformed request (unknown aggregation function) is an error;
    /// segment failures and timeout expiry degrade to a partial result.
    pub fn execute(&self) -> Result<DataTable> {
        let functions = parse_functions(&self.request.aggregations)?;
        let grouped = self.request.group_by.is_some();
        // ok() to ignore "already built" when several plans run in-process
        rayon::ThreadPoolBuilder::new().num_threads(self.workers).build_global().ok();

        let start = Instant::now();
        let timeout = Duration::from_millis(self.request.timeout_ms);
        let (tx, rx) = mpsc::channel();
        for segment in &self.segments {
            let tx = tx.clone();
            let name = segment.name().to_string();
            let plan = SegmentPlan::new(Arc::clone(segment), Arc::clone(&self.request));
            rayon::spawn(move || {
                // The receiver may have given up at the deadline; a failed
                // send just discards late work.
                let _ = tx.send((name, plan.run()));
            });
        }
        drop(tx);

        let mut merged: Option<IntermediateResultsBlock> = None;
        let mut pending = self.segments.len();
        let mut timed_out = false;
        while pending > 0 {
            let remaining = timeout.saturating_sub(start.elapsed());
            match rx.recv_timeout(remaining) {
                Ok((segment, Ok(block))) => {
                    pending -= 1;
                    debug!(segment = %segment, docs_scanned = block.docs_scanned, "segment scan complete");
                    match &mut merged {
                        Some(acc) => {
                            if let Err(e) = combine::merge_blocks(acc, block) {
                                warn!(segment = %segment, error = %e, "dropping unmergeable segment result");
                            }
                        }
                        None => merged = Some(block),
                    }
                }
                Ok((segment, Err(e))) => {
                    pending -= 1;
                    warn!(segment = %segment, error = %e, "segment scan failed; excluding from combine");
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    warn!(
                        pending,
                        timeout_ms = self.request.timeout_ms,
                        "timed out waiting for segment scans; returning partial result"
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut block =
            merged.unwrap_or_else(|| IntermediateResultsBlock::empty(&functions, grouped));
        if let Some(group_by) = &self.request.group_by {
            combine::trim_top_n(&mut block, group_by.top_n);
        }
        block.time_used_ms = start.elapsed().as_millis() as u64;
        Ok(DataTable::from_block(&self.request, &functions, block, timed_out))
    }

    /// Render the whole plan: the fan-out plus one representative segment
    /// tree (all per-segment trees are identical in shape).
    pub fn explain(&self) -> Result<String> {
        let header = format!(
            "InstancePlan (segments: {}, timeout: {} ms)",
            self.segments.len(),
            self.request.timeout_ms
        );
        match self.segments.first() {
            Some(segment) => {
                let plan = SegmentPlan::new(Arc::clone(segment), Arc::clone(&self.request));
                Ok(format!("{header}\n{}", plan.explain()?))
            }
            None => Ok(header),
        }
    }
}
