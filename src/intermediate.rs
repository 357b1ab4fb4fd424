//! The unit of partial-result exchange between execution contexts.
//!
//! One [`IntermediateResultsBlock`] is produced per segment scan, folded
//! together by the combine service, encoded to a DataTable for transport,
//! and folded again on the broker by the reduce service.

use crate::aggregate::{AggState, AggregationFunction};
use crate::error::{ExecError, Result};
use crate::groupby::GroupKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The partial result of one aggregation slot: a scalar state for
/// non-grouped queries, a full key→state mapping for grouped ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggResult {
    Scalar(AggState),
    Grouped(HashMap<GroupKey, AggState>),
}

impl AggResult {
    /// Merge a sibling partial result in, applying the per-function merge
    /// rule wherever a group key exists on both sides.
    pub fn merge(&mut self, other: AggResult) -> Result<()> {
        match (self, other) {
            (AggResult::Scalar(a), AggResult::Scalar(b)) => a.merge(b),
            (AggResult::Grouped(a), AggResult::Grouped(b)) => {
                for (key, state) in b {
                    match a.entry(key) {
                        std::collections::hash_map::Entry::Occupied(mut entry) => {
                            entry.get_mut().merge(state)?;
                        }
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(state);
                        }
                    }
                }
                Ok(())
            }
            _ => Err(ExecError::Decode(
                "mismatched grouped/scalar result shapes in merge".to_string(),
            )),
        }
    }
}

/// Aggregation output of one execution unit plus its execution metadata.
///
/// Invariant: `results` has exactly one entry per requested aggregation, in
/// request order — for zero, partial, and full matches alike.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateResultsBlock {
    pub results: Vec<AggResult>,
    /// Matching documents actually scanned.
    pub docs_scanned: u64,
    /// Documents visible to the scan(s) that produced this block.
    pub total_docs: u64,
    /// Wall time spent producing this block.
    pub time_used_ms: u64,
}

impl IntermediateResultsBlock {
    #[must_use]
    pub fn new(results: Vec<AggResult>, docs_scanned: u64, total_docs: u64, time_used_ms: u64) -> Self {
        Self { results, docs_scanned, total_docs, time_used_ms }
    }

    /// A zero-contribution block: one identity entry per aggregation.
    #[must_use]
    pub fn empty(functions: &[AggregationFunction], grouped: bool) -> Self {
        let results = functions
            .iter()
            .map(|function| {
                if grouped {
                    AggResult::Grouped(HashMap::new())
                } else {
                    AggResult::Scalar(function.create())
                }
            })
            .collect();
        Self { results, docs_scanned: 0, total_docs: 0, time_used_ms: 0 }
    }
}
