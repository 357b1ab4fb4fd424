//! The DataTable: self-describing binary encoding of a partial result.
//!
//! One DataTable is the server's whole answer for a query: a fixed header
//! (magic + format version), then per-slot metadata — result name, declared
//! value type, group-by columns — and the slot payloads themselves, encoded
//! with postcard. Payloads carry accumulator *state* (avg pairs, full
//! distinct sets), so decoding on the broker side yields something that can
//! still be merged exactly.

use crate::aggregate::{AggState, AggregationFunction};
use crate::error::{ExecError, Result};
use crate::groupby::GroupKey;
use crate::intermediate::{AggResult, IntermediateResultsBlock};
use crate::request::QueryRequest;
use crate::value::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Leading bytes of every encoded DataTable.
pub const DATA_TABLE_MAGIC: [u8; 4] = *b"BSDT";
/// Format version; bumped on any incompatible layout change.
pub const DATA_TABLE_VERSION: u8 = 1;

/// Rows of one aggregation slot: a single state for non-grouped queries, a
/// key-tuple → state list for grouped ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlotRows {
    Scalar(AggState),
    Grouped(Vec<(GroupKey, AggState)>),
}

/// One aggregation slot: header metadata plus its rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataSlot {
    /// Rendered result name, e.g. `count_star`.
    pub name: String,
    /// Declared type of the slot's finalized values.
    pub value_type: ColumnType,
    /// Group-by column names; empty for non-grouped slots.
    pub group_columns: Vec<String>,
    pub rows: SlotRows,
}

/// A server's binary-encodable partial result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub slots: Vec<DataSlot>,
    pub docs_scanned: u64,
    pub total_docs: u64,
    pub time_used_ms: u64,
    /// Whether the producing plan hit its timeout and returned partial work.
    pub timed_out: bool,
}

impl DataTable {
    /// Package a combined per-server block for transport.
    #[must_use]
    pub fn from_block(
        request: &QueryRequest,
        functions: &[AggregationFunction],
        block: IntermediateResultsBlock,
        timed_out: bool,
    ) -> Self {
        let group_columns: Vec<String> = request
            .group_by
            .as_ref()
            .map(|g| g.columns.clone())
            .unwrap_or_default();
        let slots = request
            .aggregations
            .iter()
            .zip(functions)
            .zip(block.results)
            .map(|((spec, function), result)| DataSlot {
                name: spec.result_name(),
                value_type: function.result_type(),
                group_columns: group_columns.clone(),
                rows: match result {
                    AggResult::Scalar(state) => SlotRows::Scalar(state),
                    AggResult::Grouped(groups) => {
                        SlotRows::Grouped(groups.into_iter().collect())
                    }
                },
            })
            .collect();
        Self {
            slots,
            docs_scanned: block.docs_scanned,
            total_docs: block.total_docs,
            time_used_ms: block.time_used_ms,
            timed_out,
        }
    }

    /// Rehydrate the mergeable block this table carries, validating it
    /// against the expected aggregation list first. Any shape or kind
    /// mismatch fails with a decode error so the caller can drop this
    /// server's contribution without corrupting the fold.
    pub fn to_block(
        &self,
        functions: &[AggregationFunction],
        grouped: bool,
    ) -> Result<IntermediateResultsBlock> {
        if self.slots.len() != functions.len() {
            return Err(ExecError::Decode(format!(
                "expected {} aggregation slots, found {}",
                functions.len(),
                self.slots.len()
            )));
        }
        let mut results = Vec::with_capacity(self.slots.len());
        for (slot, function) in self.slots.iter().zip(functions) {
            let result = match (&slot.rows, grouped) {
                (SlotRows::Scalar(state), false) => {
                    if !state.matches(*function) {
                        return Err(ExecError::Decode(format!(
                            "slot '{}' carries a foreign accumulator kind",
                            slot.name
                        )));
                    }
                    AggResult::Scalar(state.clone())
                }
                (SlotRows::Grouped(rows), true) => {
                    let mut groups = HashMap::with_capacity(rows.len());
                    for (key, state) in rows {
                        if !state.matches(*function) {
                            return Err(ExecError::Decode(format!(
                                "slot '{}' carries a foreign accumulator kind",
                                slot.name
                            )));
                        }
                        groups.insert(key.clone(), state.clone());
                    }
                    AggResult::Grouped(groups)
                }
                _ => {
                    return Err(ExecError::Decode(format!(
                        "slot '{}' has the wrong grouped/scalar shape",
                        slot.name
                    )));
                }
            };
            results.push(result);
        }
        Ok(IntermediateResultsBlock::new(
            results,
            self.docs_scanned,
            self.total_docs,
            self.time_used_ms,
        ))
    }

    /// Encode to the binary wire form: magic, version, postcard payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self)
            .map_err(|e| ExecError::Decode(format!("encode failed: {e}")))?;
        let mut bytes = Vec::with_capacity(DATA_TABLE_MAGIC.len() + 1 + payload.len());
        bytes.extend_from_slice(&DATA_TABLE_MAGIC);
        bytes.push(DATA_TABLE_VERSION);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode from the binary wire form. Lossless for every supported scalar
    /// and group-key type.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header_len = DATA_TABLE_MAGIC.len() + 1;
        if bytes.len() < header_len || bytes[..DATA_TABLE_MAGIC.len()] != DATA_TABLE_MAGIC {
            return Err(ExecError::Decode("missing data table header".to_string()));
        }
        let version = bytes[DATA_TABLE_MAGIC.len()];
        if version != DATA_TABLE_VERSION {
            return Err(ExecError::Decode(format!(
                "unsupported data table version {version}"
            )));
        }
        postcard::from_bytes(&bytes[header_len..])
            .map_err(|e| ExecError::Decode(format!("decode failed: {e}")))
    }
}
