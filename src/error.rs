//! Error kinds surfaced by the query-execution core.
//!
//! Failures are deliberately coarse: a segment scan either completes or is
//! excluded from the merged result, so most errors never cross an execution
//! boundary. The orchestrator logs and drops them instead of aborting sibling
//! scans.

use thiserror::Error;

/// Errors produced by operators, plans, and the wire codec.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The requested access pattern is permanently unsupported, e.g. random
    /// block access on a sequential scan operator. Never retried.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Unknown column or aggregation function. Fails the one segment task
    /// that hit it; sibling tasks keep running.
    #[error("not found: {0}")]
    NotFound(String),

    /// The inter-segment plan ran out of time. Surfaced as response metadata
    /// rather than a failure wherever a partial result exists.
    #[error("execution timed out after {0} ms")]
    Timeout(u64),

    /// A DataTable could not be decoded. The offending server contributes
    /// nothing; other contributions still merge.
    #[error("malformed data table: {0}")]
    Decode(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ExecError>;
