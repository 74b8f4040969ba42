//! Prepared count statement.
//!
//! The statement text is fixed once the partition key is known. Range bounds
//! are bind values, so no token ever becomes part of the query text and no
//! identifier is spliced in unquoted.

use corelib::TokenRange;

/// `SELECT count(*)` over one token range of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountStatement {
    keyspace: String,
    table: String,
    partition_key: Vec<String>,
    text: String,
}

impl CountStatement {
    /// Build the statement for `keyspace.table` keyed by `partition_key`.
    ///
    /// The caller guarantees `partition_key` is non-empty.
    pub fn new(keyspace: &str, table: &str, partition_key: Vec<String>) -> Self {
        let columns = partition_key
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let token = format!("token({columns})");
        let text = format!(
            "SELECT count(*) FROM {}.{} WHERE {token} >= ? AND {token} <= ?",
            quote_identifier(keyspace),
            quote_identifier(table),
        );
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            partition_key,
            text,
        }
    }

    /// Query text with two bind markers: range start, range end (both inclusive).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Values to bind for `range`, in marker order.
    pub fn bind(&self, range: TokenRange) -> [i64; 2] {
        [range.start, range.end]
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Partition key columns, in key order.
    pub fn partition_key(&self) -> &[String] {
        &self.partition_key
    }
}

/// Double-quote a CQL identifier, doubling embedded quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
