//! # Basalt
//!
//! The **query-execution core** of a distributed columnar analytical
//! datastore: given a parsed query request and one or more immutable columnar
//! segments, Basalt produces aggregated, optionally grouped, results, then
//! merges partial results produced by parallel scans and by remote servers
//! into one final answer.
//!
//! ## Key pieces
//!
//! - **Pull-based operators** - filter, projection, and aggregation operators
//!   exchanging document-id batches through a uniform open/next/close contract
//! - **Per-segment and cross-segment plans** - one operator tree per segment,
//!   fanned out in parallel with a wall-time bound
//! - **Two-stage merge** - an intra-server combine of sibling segment results
//!   and an inter-server reduce of per-server results
//! - **Binary intermediate results** - the self-describing `DataTable`
//!   encoding that moves partial aggregates between execution contexts
//!
//! ## Quick Start
//!
//! ```ignore
//! use basalt::*;
//! use basalt::testing::SegmentBuilder;
//! use std::collections::HashMap;
//!
//! // An in-memory segment; production segments come from on-disk storage
//! // through the same `Segment` capability.
//! let segment = SegmentBuilder::new("s0")
//!     .column("country", vec![Value::str("de"), Value::str("fr"), Value::str("de")])
//!     .column("clicks", vec![Value::Long(3), Value::Long(5), Value::Long(4)])
//!     .build();
//!
//! // count(*) and sum(clicks), grouped by country, top 10 groups.
//! let request = QueryRequest::new(vec![
//!     AggregationSpec::new("count", "*"),
//!     AggregationSpec::new("sum", "clicks"),
//! ])
//! .with_group_by(GroupBySpec::new(vec!["country".to_string()], 10));
//!
//! // Server side: scan every local segment, combine, encode.
//! let table = InstancePlan::new(vec![segment], request.clone()).execute()?;
//!
//! // Broker side: reduce every server's DataTable into the final answer.
//! let mut responses = HashMap::new();
//! responses.insert(ServerInstance::new("localhost", 8097), table);
//! let response = reduce::reduce(&request, &responses)?;
//! ```
//!
//! ## Execution model
//!
//! Every operator is a stateful, single-pass unit: `open()` (idempotent),
//! repeated `next_block()` calls until the terminal `None`, then `close()`.
//! A per-segment tree wires filter → doc-id-set → projection →
//! aggregation[-group-by]; several aggregations share one projection through
//! replicated views that detect, by block identity, whether the shared
//! operator already advanced.
//!
//! Aggregation accumulators (`count`, `sum`, `min`, `max`, `avg`,
//! `distinctCount`) merge commutatively and associatively, and partial
//! *state* — avg `{sum, count}` pairs, full distinct sets — is what crosses
//! execution boundaries, so merging at any stage stays exact. Top-N
//! truncation of grouped results happens only at merge time: at the end of
//! the inter-segment fold and once more after the inter-server fold.
//!
//! A failed segment scan is logged and excluded from the fold; a timeout
//! returns the best-available partial result, tagged via `timed_out`
//! metadata. Partial answers are always syntactically complete: one result
//! slot per requested aggregation, in request order.
//!
//! ## Module Overview
//!
//! - [`operator`] - the operator contract and the blocks it moves
//! - [`filter`] - leaf predicate scans, AND/OR composites, doc-id-set
//! - [`projection`] - column materialization and replicated views
//! - [`aggregate`] / [`groupby`] - accumulators and the aggregation operators
//! - [`combine`] - intra-server merge of segment results
//! - [`plan`] - intra-segment trees and the parallel inter-segment plan
//! - [`datatable`] - the binary wire encoding of partial results
//! - [`reduce`] - inter-server merge and result rendering
//! - [`testing`] - in-memory segments and deterministic fixtures

pub mod aggregate;
pub mod combine;
pub mod datatable;
pub mod error;
pub mod filter;
pub mod groupby;
pub mod intermediate;
pub mod operator;
pub mod plan;
pub mod projection;
pub mod reduce;
pub mod request;
pub mod segment;
pub mod testing;
pub mod value;

// General re-exports
pub use aggregate::{AggState, AggregationFunction, AggregationOperator};
pub use datatable::{DataSlot, DataTable, SlotRows};
pub use error::{ExecError, Result};
pub use filter::{DocIdSetOperator, FilterOperator, ScanFilterOperator};
pub use groupby::{AggregationGroupByOperator, GroupKey};
pub use intermediate::{AggResult, IntermediateResultsBlock};
pub use operator::{Block, BlockId, DOC_BATCH_SIZE, DocIdBlock, Operator, ProjectionBlock};
pub use plan::{InstancePlan, SegmentPlan};
pub use projection::{ProjectionOperator, ReplicatedProjectionOperator};
pub use reduce::{AggregationResult, BrokerResponse, GroupEntry, ServerInstance};
pub use request::{AggregationSpec, FilterPredicate, GroupBySpec, QueryRequest};
pub use segment::{ColumnSource, Segment};
pub use value::{ColumnType, Value};
