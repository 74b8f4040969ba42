//! Error types for the counter.

use corelib::TokenRange;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for the counter.
pub type Result<T> = std::result::Result<T, CountError>;

/// Failure of a single query issued through a [`QueryExecutor`](crate::QueryExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query did not complete within the configured timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    /// The executor lost (or never had) its connection to the cluster.
    #[error("connection error: {0}")]
    Connection(String),
    /// The server rejected or failed the query.
    #[error("server error: {0}")]
    Server(String),
    /// The query returned a count that cannot be a row count.
    #[error("query returned invalid count {0}")]
    InvalidCount(i64),
    /// The keyspace or table does not exist.
    #[error("unknown table {keyspace}.{table}")]
    UnknownTable { keyspace: String, table: String },
}

/// Failure of a whole count.
///
/// When any segment fails the count is indeterminate: no partial total is
/// returned, and the error is not a lower bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountError {
    /// Malformed range, zero segments, zero workers.
    #[error(transparent)]
    InvalidArgument(#[from] corelib::Error),
    /// One segment's count query failed.
    #[error("count of token range {range} failed: {source}")]
    Query {
        range: TokenRange,
        #[source]
        source: QueryError,
    },
    /// Adding the count of `range` would overflow the total.
    #[error("total overflowed while adding the count of token range {range}")]
    TotalOverflow { range: TokenRange },
    /// Partition key columns could not be resolved.
    #[error("resolving partition key of {keyspace}.{table} failed: {source}")]
    Schema {
        keyspace: String,
        table: String,
        #[source]
        source: QueryError,
    },
    /// The table reported no partition key columns.
    #[error("table {keyspace}.{table} has no partition key columns")]
    NoPartitionKey { keyspace: String, table: String },
    /// A worker task panicked or was cancelled.
    #[error("count worker failed: {0}")]
    WorkerPanicked(String),
}

impl CountError {
    /// The token range whose query failed, if the failure came from a segment.
    pub fn failed_range(&self) -> Option<TokenRange> {
        match self {
            CountError::Query { range, .. } | CountError::TotalOverflow { range } => {
                Some(*range)
            }
            _ => None,
        }
    }
}
