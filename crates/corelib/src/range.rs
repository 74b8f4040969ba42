//! Token ranges.
//!
//! A `TokenRange` is a closed interval `[start, end]` over the signed 64-bit
//! token space. Widths are computed in 128-bit arithmetic because the full
//! ring holds 2^64 tokens, one more than `i64` (or `u64`) can express as a
//! count.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval of tokens, `start <= end`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TokenRange {
    pub start: i64,
    pub end: i64,
}

impl TokenRange {
    /// Creates a range, rejecting `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(Error::invalid(format!(
                "range start {start} is greater than end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole signed 64-bit token space.
    pub const fn full() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Number of tokens in the range (1 ..= 2^64).
    #[inline]
    pub fn width(&self) -> u128 {
        (self.end as i128 - self.start as i128 + 1) as u128
    }

    /// True if `token` lies inside the range, bounds included.
    #[inline]
    pub fn contains(&self, token: i64) -> bool {
        self.start <= token && token <= self.end
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
