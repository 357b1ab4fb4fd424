//! The combine service: intra-server merge of sibling segment results.
//!
//! Blocks are merged position-wise by aggregation index; grouped mappings
//! union, with the per-function merge rule applied wherever a key exists in
//! both. Folding is associative and commutative, so the orchestrator may
//! accumulate per-segment results in any pairwise order and still reach the
//! same final value set. Tie order among equal-valued group entries is
//! whatever the fold encountered first and is not guaranteed stable across
//! runs.

use crate::error::{ExecError, Result};
use crate::intermediate::{AggResult, IntermediateResultsBlock};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// Merge `right` into `left`, slot by slot. Docs-scanned and total-docs
/// metadata are summed; elapsed time keeps the slower side (scans ran in
/// parallel).
pub fn merge_blocks(
    left: &mut IntermediateResultsBlock,
    right: IntermediateResultsBlock,
) -> Result<()> {
    if left.results.len() != right.results.len() {
        return Err(ExecError::Decode(format!(
            "aggregation slot count mismatch in combine: {} vs {}",
            left.results.len(),
            right.results.len()
        )));
    }
    for (l, r) in left.results.iter_mut().zip(right.results) {
        l.merge(r)?;
    }
    left.docs_scanned += right.docs_scanned;
    left.total_docs += right.total_docs;
    left.time_used_ms = left.time_used_ms.max(right.time_used_ms);
    Ok(())
}

/// Keep only the `top_n` largest groups per slot, ranked by finalized value.
///
/// Applied once the fold is complete — at the end of the inter-segment fold
/// and again after the inter-server fold — never per segment.
pub fn trim_top_n(block: &mut IntermediateResultsBlock, top_n: usize) {
    for result in &mut block.results {
        if let AggResult::Grouped(groups) = result {
            if groups.len() > top_n {
                let mut entries: Vec<_> = groups.drain().collect();
                entries.sort_by_key(|(_, state)| Reverse(OrderedFloat(state.finalize())));
                entries.truncate(top_n);
                *groups = entries.into_iter().collect();
            }
        }
    }
}
