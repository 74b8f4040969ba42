//! Murmur3 token implementation (Cassandra-compatible token space).

use crate::token::traits::Token;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Murmur3 token using a signed 64-bit representation.
///
/// The ring spans `[i64::MIN, i64::MAX]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Murmur3Token(pub i64);

impl Token for Murmur3Token {
    fn min_value() -> Self {
        Murmur3Token(i64::MIN)
    }

    fn max_value() -> Self {
        Murmur3Token(i64::MAX)
    }

    fn is_min(&self) -> bool {
        self.0 == i64::MIN
    }

    fn is_max(&self) -> bool {
        self.0 == i64::MAX
    }

    fn position(&self) -> i64 {
        self.0
    }
}

impl Murmur3Token {
    /// Creates a token from a byte slice.
    ///
    /// Keys hash with SipHash-1-3 into the murmur3 token space. The minimum
    /// token is never produced for a key; it folds onto the maximum.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = SipHasher13::new();
        data.hash(&mut hasher);
        let raw = hasher.finish() as i64;
        if raw == i64::MIN {
            Murmur3Token(i64::MAX)
        } else {
            Murmur3Token(raw)
        }
    }

    /// Creates a token from a string key.
    pub fn from_key(key: &str) -> Self {
        Self::from_bytes(key.as_bytes())
    }
}

impl fmt::Display for Murmur3Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
