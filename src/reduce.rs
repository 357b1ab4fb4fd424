//! The reduce service: inter-server merge of per-server DataTables into the
//! final rendered result.
//!
//! Each server's DataTable is decoded back into a mergeable block and folded
//! with the same per-function rules the combine service uses — across
//! servers instead of across segments. Missing or empty server entries
//! contribute nothing; a malformed table drops only that server. After the
//! fold, the query's top-N truncation is applied once (the final truncation
//! point) and results are rendered in request order for external response
//! serialization.

use crate::aggregate::parse_functions;
use crate::combine;
use crate::datatable::DataTable;
use crate::error::Result;
use crate::groupby::GroupKey;
use crate::intermediate::{AggResult, IntermediateResultsBlock};
use crate::request::QueryRequest;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Identity of the server that produced one DataTable. Merge-input key only;
/// carries no behavior.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInstance {
    pub host: String,
    pub port: u16,
}

impl ServerInstance {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One rendered group entry: the key's per-column values and the finalized
/// aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group: Vec<String>,
    pub value: f64,
}

/// One rendered aggregation slot, in request order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Rendered function name, e.g. `sum_met_impressionCount`.
    pub function: String,
    /// Group-by column names; empty for non-grouped slots.
    pub group_by_columns: Vec<String>,
    /// Sorted (descending by value) and truncated group list; empty for
    /// non-grouped slots. Tie order among equal values is not deterministic.
    pub groups: Vec<GroupEntry>,
    /// Finalized scalar for non-grouped slots.
    pub value: Option<f64>,
}

/// The final reduced answer handed to external response serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerResponse {
    pub aggregation_results: Vec<AggregationResult>,
    pub num_docs_scanned: u64,
    pub total_docs: u64,
    pub time_used_ms: u64,
    pub timed_out: bool,
}

impl BrokerResponse {
    /// JSON rendering of the response, for transports that speak JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Fold every server's DataTable into the final grouped/aggregated answer.
///
/// Never fails on missing, empty, or malformed server entries — those
/// contribute nothing. The only error is a malformed request itself.
pub fn reduce(
    request: &QueryRequest,
    responses: &HashMap<ServerInstance, DataTable>,
) -> Result<BrokerResponse> {
    let functions = parse_functions(&request.aggregations)?;
    let grouped = request.group_by.is_some();

    let mut merged: Option<IntermediateResultsBlock> = None;
    let mut timed_out = false;
    for (server, table) in responses {
        match table.to_block(&functions, grouped) {
            Ok(block) => {
                timed_out |= table.timed_out;
                match &mut merged {
                    Some(acc) => {
                        if let Err(e) = combine::merge_blocks(acc, block) {
                            warn!(server = %server, error = %e, "dropping unmergeable server response");
                        }
                    }
                    None => merged = Some(block),
                }
            }
            Err(e) => {
                warn!(server = %server, error = %e, "dropping undecodable server response");
            }
        }
    }

    let mut block =
        merged.unwrap_or_else(|| IntermediateResultsBlock::empty(&functions, grouped));
    if let Some(group_by) = &request.group_by {
        combine::trim_top_n(&mut block, group_by.top_n);
    }

    let group_by_columns: Vec<String> = request
        .group_by
        .as_ref()
        .map(|g| g.columns.clone())
        .unwrap_or_default();
    let aggregation_results = request
        .aggregations
        .iter()
        .zip(block.results)
        .map(|(spec, result)| match result {
            AggResult::Scalar(state) => AggregationResult {
                function: spec.result_name(),
                group_by_columns: Vec::new(),
                groups: Vec::new(),
                value: Some(state.finalize()),
            },
            AggResult::Grouped(groups) => {
                let mut entries: Vec<(GroupKey, f64)> =
                    groups.into_iter().map(|(key, state)| (key, state.finalize())).collect();
                entries.sort_by_key(|(_, value)| Reverse(OrderedFloat(*value)));
                AggregationResult {
                    function: spec.result_name(),
                    group_by_columns: group_by_columns.clone(),
                    groups: entries
                        .into_iter()
                        .map(|(key, value)| GroupEntry { group: key.render(), value })
                        .collect(),
                    value: None,
                }
            }
        })
        .collect();

    Ok(BrokerResponse {
        aggregation_results,
        num_docs_scanned: block.docs_scanned,
        total_docs: block.total_docs,
        time_used_ms: block.time_used_ms,
        timed_out,
    })
}
