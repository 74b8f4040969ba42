//! Partitioner abstraction for consistent hashing.
//!
//! Partitioners are responsible for converting keys into tokens
//! that can be placed on the hash ring. The `split` module divides the
//! resulting token space into contiguous ranges.

pub mod murmur3;
pub mod split;
pub mod traits;

pub use murmur3::Murmur3Partitioner;
pub use split::{split_two_level, RangePartitioner, Segments};
pub use traits::Partitioner;
