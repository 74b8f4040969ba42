//! Exact row counting for token-partitioned tables.
//!
//! This crate counts a table by splitting its token space and counting every
//! range concurrently:
//! - Query executor seam and an in-memory executor
//! - Prepared count statements
//! - Count configuration
//! - The parallel aggregator and its worker pool

pub mod aggregator;
pub mod config;
pub mod error;
pub mod executor;
pub mod statement;
pub mod task;

pub use aggregator::{AggregateResult, ParallelCountAggregator};
pub use config::CountConfig;
pub use error::{CountError, QueryError, Result};
pub use executor::{MemoryExecutor, QueryExecutor};
pub use statement::CountStatement;
pub use task::CountTask;
