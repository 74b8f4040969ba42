//! Core library for token-range partitioning.
//!
//! This crate provides the fundamental abstractions shared by the counter:
//! - Token types and implementations
//! - Partitioner algorithms and range splitting
//! - Token ranges
//! - Read consistency levels

pub mod consistency;
pub mod error;
pub mod partitioner;
pub mod range;
pub mod token;

pub use consistency::ConsistencyLevel;
pub use error::{Error, Result};
pub use partitioner::{split_two_level, Murmur3Partitioner, Partitioner, RangePartitioner, Segments};
pub use range::TokenRange;
pub use token::{Murmur3Token, Token};
