//! Token abstraction module for consistent hashing.
//!
//! Tokens represent positions on the hash ring and must be comparable,
//! hashable, and thread-safe.

pub mod murmur3;
pub mod traits;

pub use murmur3::Murmur3Token;
pub use traits::Token;
