//! Core token trait definitions.
//!
//! The `Token` trait is minimal so partitioners and ranges can work without
//! knowing how a concrete token is represented.

use std::fmt::Debug;
use std::hash::Hash;

/// Minimal token trait for the hash ring.
///
/// Tokens are immutable, comparable positions. Implementations must be
/// thread-safe and cheap to compare/hash.
pub trait Token: Clone + Ord + Hash + Send + Sync + Debug + 'static {
    /// Minimum token value (start of ring).
    fn min_value() -> Self;
    /// Maximum token value (end of ring).
    fn max_value() -> Self;
    /// True if this token is the minimum.
    fn is_min(&self) -> bool;
    /// True if this token is the maximum.
    fn is_max(&self) -> bool;
    /// Signed 64-bit position of this token, as used in `token(...)` predicates.
    fn position(&self) -> i64;
}
