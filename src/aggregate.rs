//! Aggregation functions and their running accumulators.
//!
//! Each function follows the same accumulator contract: `create` an identity
//! state, feed it per-document (or per-batch for count), `merge` sibling
//! states commutatively and associatively, and read the final scalar out with
//! `finalize`. Merging operates on *state* — avg keeps its `{sum, count}`
//! pair and distinct-count its full value set until the very end — so partial
//! results stay exactly mergeable across segment scans and across servers.

use crate::error::{ExecError, Result};
use crate::intermediate::{AggResult, IntermediateResultsBlock};
use crate::operator::{Block, Operator};
use crate::projection::{ProjectionOperator, ReplicatedProjectionOperator};
use crate::request::AggregationSpec;
use crate::value::{ColumnType, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/* ===================== functions ===================== */

/// The closed set of supported aggregation functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    DistinctCount,
}

impl AggregationFunction {
    /// Parse a function name from a request. Case-insensitive; unknown names
    /// fail with `NotFound`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregationFunction::Count),
            "sum" => Ok(AggregationFunction::Sum),
            "min" => Ok(AggregationFunction::Min),
            "max" => Ok(AggregationFunction::Max),
            "avg" => Ok(AggregationFunction::Avg),
            "distinctcount" => Ok(AggregationFunction::DistinctCount),
            other => Err(ExecError::NotFound(format!("aggregation function '{other}'"))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AggregationFunction::Count => "count",
            AggregationFunction::Sum => "sum",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Avg => "avg",
            AggregationFunction::DistinctCount => "distinctCount",
        }
    }

    /// Identity accumulator for this function.
    #[must_use]
    pub fn create(&self) -> AggState {
        match self {
            AggregationFunction::Count => AggState::Count(0),
            AggregationFunction::Sum => AggState::Sum(0.0),
            AggregationFunction::Min => AggState::Min(f64::INFINITY),
            AggregationFunction::Max => AggState::Max(f64::NEG_INFINITY),
            AggregationFunction::Avg => AggState::Avg { sum: 0.0, count: 0 },
            AggregationFunction::DistinctCount => AggState::Distinct(HashSet::new()),
        }
    }

    /// Type of the finalized value this function produces on the wire.
    #[must_use]
    pub fn result_type(&self) -> ColumnType {
        match self {
            AggregationFunction::Count | AggregationFunction::DistinctCount => ColumnType::Long,
            _ => ColumnType::Double,
        }
    }
}

/// Parse every spec's function up front; unknown names fail the request.
pub fn parse_functions(specs: &[AggregationSpec]) -> Result<Vec<AggregationFunction>> {
    specs.iter().map(|spec| AggregationFunction::parse(&spec.function)).collect()
}

/* ===================== accumulator state ===================== */

/// Running aggregate state for one (function, optional group key) pair.
///
/// This is what crosses execution boundaries inside DataTables, so it derives
/// the serde traits and round-trips losslessly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggState {
    Count(i64),
    Sum(f64),
    Min(f64),
    Max(f64),
    Avg { sum: f64, count: i64 },
    Distinct(HashSet<Value>),
}

impl AggState {
    /// Fold one column value in. Non-numeric values are ignored by the
    /// numeric functions; count treats any value as one document.
    pub fn add_value(&mut self, value: &Value) {
        match self {
            AggState::Count(c) => *c += 1,
            AggState::Sum(s) => {
                if let Some(v) = value.as_f64() {
                    *s += v;
                }
            }
            // Strict comparisons: equal values keep the first one seen.
            AggState::Min(m) => {
                if let Some(v) = value.as_f64() {
                    if v < *m {
                        *m = v;
                    }
                }
            }
            AggState::Max(m) => {
                if let Some(v) = value.as_f64() {
                    if v > *m {
                        *m = v;
                    }
                }
            }
            AggState::Avg { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            AggState::Distinct(set) => {
                set.insert(value.clone());
            }
        }
    }

    /// Count-only batch update: increment by the batch size without looking
    /// at column values. No-op for every other state.
    pub fn add_count(&mut self, n: u64) {
        if let AggState::Count(c) = self {
            *c += n as i64;
        }
    }

    /// Merge a sibling partial state in. Commutative and associative.
    ///
    /// Mismatched kinds only ever arrive through a malformed DataTable, so
    /// that case surfaces as a decode failure.
    pub fn merge(&mut self, other: AggState) -> Result<()> {
        match (self, other) {
            (AggState::Count(a), AggState::Count(b)) => *a += b,
            (AggState::Sum(a), AggState::Sum(b)) => *a += b,
            (AggState::Min(a), AggState::Min(b)) => {
                if b < *a {
                    *a = b;
                }
            }
            (AggState::Max(a), AggState::Max(b)) => {
                if b > *a {
                    *a = b;
                }
            }
            (AggState::Avg { sum, count }, AggState::Avg { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            (AggState::Distinct(a), AggState::Distinct(b)) => a.extend(b),
            _ => {
                return Err(ExecError::Decode(
                    "mismatched accumulator kinds in merge".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether this state belongs to `function` — used to validate decoded
    /// DataTables before folding them.
    #[must_use]
    pub fn matches(&self, function: AggregationFunction) -> bool {
        matches!(
            (self, function),
            (AggState::Count(_), AggregationFunction::Count)
                | (AggState::Sum(_), AggregationFunction::Sum)
                | (AggState::Min(_), AggregationFunction::Min)
                | (AggState::Max(_), AggregationFunction::Max)
                | (AggState::Avg { .. }, AggregationFunction::Avg)
                | (AggState::Distinct(_), AggregationFunction::DistinctCount)
        )
    }

    /// Read the final scalar. Division for avg happens here and only here;
    /// an empty avg reads as 0.0 rather than NaN, and empty min/max read as
    /// their +∞/−∞ identities.
    #[must_use]
    pub fn finalize(&self) -> f64 {
        match self {
            AggState::Count(c) => *c as f64,
            AggState::Sum(s) => *s,
            AggState::Min(m) => *m,
            AggState::Max(m) => *m,
            AggState::Avg { sum, count } => {
                if *count == 0 {
                    0.0
                } else {
                    sum / *count as f64
                }
            }
            AggState::Distinct(set) => set.len() as f64,
        }
    }
}

/* ===================== non-grouped operator ===================== */

/// One aggregation's worker: pulls projected batches through its replicated
/// projection view and feeds its accumulator.
struct AggregationFunctionOperator {
    function: AggregationFunction,
    column: String,
    projection: ReplicatedProjectionOperator,
    state: AggState,
}

impl AggregationFunctionOperator {
    fn consume_next(&mut self) -> Result<bool> {
        let Some(block) = self.projection.next_projection()? else {
            return Ok(false);
        };
        if self.function == AggregationFunction::Count {
            self.state.add_count(block.len() as u64);
        } else {
            let values = block.column(&self.column).ok_or_else(|| {
                ExecError::NotFound(format!("column '{}' missing from projection", self.column))
            })?;
            for value in values {
                self.state.add_value(value);
            }
        }
        Ok(true)
    }
}

/// Consumes every projected batch and emits one [`IntermediateResultsBlock`]
/// holding one scalar state per requested aggregation, in request order.
pub struct AggregationOperator {
    specs: Vec<AggregationSpec>,
    workers: Vec<AggregationFunctionOperator>,
    projection: Arc<Mutex<ProjectionOperator>>,
    done: bool,
}

impl AggregationOperator {
    pub fn new(
        specs: Vec<AggregationSpec>,
        projection: Arc<Mutex<ProjectionOperator>>,
    ) -> Result<Self> {
        let workers = specs
            .iter()
            .map(|spec| {
                let function = AggregationFunction::parse(&spec.function)?;
                Ok(AggregationFunctionOperator {
                    function,
                    column: spec.column().to_string(),
                    projection: ReplicatedProjectionOperator::new(Arc::clone(&projection)),
                    state: function.create(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specs, workers, projection, done: false })
    }

    /// Drain the input and build the per-segment partial result.
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
            self.workers.iter().map(|w| AggResult::Scalar(w.state.clone())).collect();
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
            "AggregationOperator (aggregations: [{}])\n    {}",
            names.join(", "),
            self.projection.lock().unwrap().describe()
        )
    }
}

impl Operator for AggregationOperator {
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
