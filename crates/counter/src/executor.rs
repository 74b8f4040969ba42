//! Query executor seam.
//!
//! The counter never talks to a cluster directly. Everything it needs from
//! the datastore goes through [`QueryExecutor`]: resolving a table's partition
//! key once, and counting the rows of one token range.
//!
//! [`MemoryExecutor`] keeps tables in process as sorted token lists. It backs
//! the tests and the CLI simulation.

use crate::error::QueryError;
use crate::statement::CountStatement;
use async_trait::async_trait;
use corelib::{ConsistencyLevel, Murmur3Partitioner, Partitioner, Token, TokenRange};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Datastore access used by the counter.
///
/// # Thread Safety
///
/// Implementations are shared by every worker of a count, so they must be
/// `Send + Sync`; calls for different ranges run concurrently.
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    /// Partition key columns of `keyspace.table`, in key order.
    async fn partition_key_columns(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Vec<String>, QueryError>;

    /// Run `statement` bound to `range` and return the single count it yields.
    async fn execute_count(
        &self,
        statement: &CountStatement,
        range: TokenRange,
        consistency: ConsistencyLevel,
    ) -> Result<i64, QueryError>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    partition_key: Vec<String>,
    /// Row tokens, kept sorted.
    tokens: Vec<i64>,
}

/// In-process executor over tables of row tokens.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<(String, String), MemoryTable>>,
    latency: Option<Duration>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every count query by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create (or replace) an empty table.
    pub fn create_table(&self, keyspace: &str, table: &str, partition_key: &[&str]) {
        let table_data = MemoryTable {
            partition_key: partition_key.iter().map(|c| c.to_string()).collect(),
            tokens: Vec::new(),
        };
        self.tables
            .write()
            .insert((keyspace.to_string(), table.to_string()), table_data);
    }

    /// Insert one row per token.
    pub fn insert_tokens(
        &self,
        keyspace: &str,
        table: &str,
        tokens: impl IntoIterator<Item = i64>,
    ) -> Result<(), QueryError> {
        let mut tables = self.tables.write();
        let data = tables
            .get_mut(&(keyspace.to_string(), table.to_string()))
            .ok_or_else(|| unknown(keyspace, table))?;
        data.tokens.extend(tokens);
        data.tokens.sort_unstable();
        Ok(())
    }

    /// Insert one row per key, placed by the murmur3 partitioner.
    pub fn insert_keys<K: AsRef<[u8]>>(
        &self,
        keyspace: &str,
        table: &str,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<(), QueryError> {
        let tokens = keys
            .into_iter()
            .map(|key| Murmur3Partitioner.partition(key.as_ref()).position());
        self.insert_tokens(keyspace, table, tokens)
    }

    /// Rows currently stored in `keyspace.table`.
    pub fn row_count(&self, keyspace: &str, table: &str) -> Option<usize> {
        self.tables
            .read()
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|data| data.tokens.len())
    }
}

fn unknown(keyspace: &str, table: &str) -> QueryError {
    QueryError::UnknownTable {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn partition_key_columns(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Vec<String>, QueryError> {
        self.tables
            .read()
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|data| data.partition_key.clone())
            .ok_or_else(|| unknown(keyspace, table))
    }

    async fn execute_count(
        &self,
        statement: &CountStatement,
        range: TokenRange,
        _consistency: ConsistencyLevel,
    ) -> Result<i64, QueryError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let [start, end] = statement.bind(range);
        let tables = self.tables.read();
        let data = tables
            .get(&(statement.keyspace().to_string(), statement.table().to_string()))
            .ok_or_else(|| unknown(statement.keyspace(), statement.table()))?;
        let lower = data.tokens.partition_point(|&token| token < start);
        let upper = data.tokens.partition_point(|&token| token <= end);
        Ok((upper - lower) as i64)
    }
}
