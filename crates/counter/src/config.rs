//! Count configuration.

use corelib::{ConsistencyLevel, Error, RangePartitioner};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of concurrent count queries.
pub const DEFAULT_WORKERS: usize = 200;
/// Default number of coarse ranges over the token space.
pub const DEFAULT_SEGMENTS: usize = 200;
/// Default number of fine ranges per coarse range.
pub const DEFAULT_SUB_SEGMENTS: usize = 200;

/// What to count and how hard to push the cluster while counting.
///
/// `workers` bounds in-flight queries; `segments` and `sub_segments` fix how
/// finely the token space is cut. The two are independent: the total never
/// depends on either, only the load and the duration do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountConfig {
    pub keyspace: String,
    pub table: String,
    pub consistency: ConsistencyLevel,
    pub workers: usize,
    pub segments: usize,
    pub sub_segments: usize,
    /// Per-query timeout in milliseconds; none waits for the executor.
    pub query_timeout_ms: Option<u64>,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            keyspace: String::new(),
            table: String::new(),
            consistency: ConsistencyLevel::default(),
            workers: DEFAULT_WORKERS,
            segments: DEFAULT_SEGMENTS,
            sub_segments: DEFAULT_SUB_SEGMENTS,
            query_timeout_ms: None,
        }
    }
}

impl CountConfig {
    /// Defaults for counting `keyspace.table`.
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_sub_segments(mut self, sub_segments: usize) -> Self {
        self.sub_segments = sub_segments;
        self
    }

    /// Sub-millisecond timeouts round up to one millisecond.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.query_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Reject configurations no count can run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.keyspace.is_empty() || self.table.is_empty() {
            return Err(Error::InvalidArgument(
                "keyspace and table must be set".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::InvalidArgument(
                "worker count must be positive".to_string(),
            ));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(Error::InvalidArgument(
                "query timeout must be positive".to_string(),
            ));
        }
        self.splitters().map(|_| ())
    }

    /// Coarse and fine splitters.
    pub(crate) fn splitters(&self) -> Result<(RangePartitioner, RangePartitioner), Error> {
        Ok((
            RangePartitioner::new(self.segments)?,
            RangePartitioner::new(self.sub_segments)?,
        ))
    }
}
