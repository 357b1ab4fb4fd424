//! Grouped aggregation: group keys and the group-by operator.
//!
//! For every projected document the operator derives a [`GroupKey`] from the
//! configured grouping columns and updates one accumulator per
//! (aggregation × key) pair. Nothing is truncated here — top-N selection
//! happens at merge time, so entries that could still win after merging
//! partial scans are never discarded early.

use crate::aggregate::{AggregationFunction, AggState};
use crate::error::{ExecError, Result};
use crate::intermediate::{AggResult, IntermediateResultsBlock};
use crate::operator::{Block, Operator};
use crate::projection::{ProjectionOperator, ReplicatedProjectionOperator};
use crate::request::{AggregationSpec, GroupBySpec};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One aggregation bucket's identity: the tuple of group-by column values,
/// in group-by column order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    /// Key rendered as its per-column string values, for result output.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

/// One aggregation's grouped worker: a replicated projection view plus the
/// key→state table it maintains.
struct GroupByFunctionOperator {
    function: AggregationFunction,
    column: String,
    group_columns: Vec<String>,
    projection: ReplicatedProjectionOperator,
    groups: HashMap<GroupKey, AggState>,
}

impl GroupByFunctionOperator {
    fn consume_next(&mut self) -> Result<bool> {
        let Some(block) = self.projection.next_projection()? else {
            return Ok(false);
        };
        let key_columns = self
            .group_columns
            .iter()
            .map(|name| {
                block.column(name).ok_or_else(|| {
                    ExecError::NotFound(format!("group-by column '{name}' missing from projection"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let value_column = if self.function == AggregationFunction::Count {
            None
        } else {
            Some(block.column(&self.column).ok_or_else(|| {
                ExecError::NotFound(format!("column '{}' missing from projection", self.column))
            })?)
        };
        let function = self.function;
        for row in 0..block.len() {
            let key = GroupKey(key_columns.iter().map(|column| column[row].clone()).collect());
            let state = self.groups.entry(key).or_insert_with(|| function.create());
            match value_column {
                Some(column) => state.add_value(&column[row]),
                None => state.add_count(1),
            }
        }
        Ok(true)
    }
}

/// Consumes every projected batch and emits one [`IntermediateResultsBlock`]
/// holding one full (untruncated) key→state mapping per requested
/// aggregation, in request order.
pub struct AggregationGroupByOperator {
    specs: Vec<AggregationSpec>,
    group_by: GroupBySpec,
    workers: Vec<GroupByFunctionOperator>,
    projection: Arc<Mutex<ProjectionOperator>>,
    done: bool,
}

impl AggregationGroupByOperator {
    pub fn new(
        specs: Vec<AggregationSpec>,
        group_by: GroupBySpec,
        projection: Arc<Mutex<ProjectionOperator>>,
    ) -> Result<Self> {
        let workers = specs
            .iter()
            .map(|spec| {
                let function = AggregationFunction::parse(&spec.function)?;
                Ok(GroupByFunctionOperator {
                    function,
                    column: spec.column().to_string(),
                    group_columns: group_by.columns.clone(),
                    projection: ReplicatedProjectionOperator::new(Arc::clone(&projection)),
                    groups: HashMap::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specs, group_by, workers, projection, done: false })
    }

    /// Drain the input and build the per-segment partial result. Zero
    /// matching documents still yield one (empty) mapping per aggregation.
    pub fn execute(&mut self) -> Result<IntermediateResultsBlock> {
        let start = Instant::now();
        self.open()?;
        loop {
            let mut advanced = false;
            for worker in &mut self.workers {
                if worker.consume_next()? {
                    advanced = true;
                }
            }
            if !advanced {
                break;
            }
        }
        let (docs_scanned, total_docs) = {
            let projection = self.projection.lock().unwrap();
            (projection.docs_scanned(), u64::from(projection.total_docs()))
        };
        let results =
            self.workers.iter().map(|w| AggResult::Grouped(w.groups.clone())).collect();
        Ok(IntermediateResultsBlock::new(
            results,
            docs_scanned,
            total_docs,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// One-line description for plan explain output.
    #[must_use]
    pub fn describe(&self) -> String {
        let names: Vec<String> = self.specs.iter().map(AggregationSpec::result_name).collect();
        format!(
            "AggregationGroupByOperator (aggregations: [{}], groupBy: [{}], topN: {})\n    {}",
            names.join(", "),
            self.group_by.columns.join(", "),
            self.group_by.top_n,
            self.projection.lock().unwrap().describe()
        )
    }
}

impl Operator for AggregationGroupByOperator {
    fn open(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            worker.projection.open()?;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Block::Intermediate(self.execute()?)))
    }

    fn close(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            worker.projection.close()?;
        }
        Ok(())
    }
}
