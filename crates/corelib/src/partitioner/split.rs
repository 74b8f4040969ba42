//! Deterministic splitting of token ranges into contiguous segments.
//!
//! # Algorithm
//!
//! For a closed range `[start, end]` and a segment count `n`:
//!
//! 1. `total = end - start + 1` (128-bit, the full ring has 2^64 tokens)
//! 2. `length = max(total / n, 1)`
//! 3. Segment `i` starts at `start + i * length` and ends at
//!    `min(start + (i + 1) * length - 1, end)`
//! 4. Segment `n - 1` always ends at `end`, absorbing the division remainder
//! 5. Iteration stops right after the segment that reaches `end`
//!
//! The output is ordered, pairwise disjoint, and covers `[start, end]`
//! exactly. When `n` exceeds the width of the range, every segment is a single
//! token and fewer than `n` segments are produced.
//!
//! # Composition
//!
//! The same splitter is used twice to plan a count: once over the whole ring
//! (coarse ranges) and once over every coarse range (fine ranges). See
//! [`split_two_level`].

use crate::error::{Error, Result};
use crate::range::TokenRange;
use std::iter::FusedIterator;

/// Splits token ranges into at most `segments` contiguous pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePartitioner {
    segments: usize,
}

impl RangePartitioner {
    /// Create a splitter producing at most `segments` pieces per range.
    ///
    /// # Errors
    /// `InvalidArgument` when `segments` is zero.
    pub fn new(segments: usize) -> Result<Self> {
        if segments == 0 {
            return Err(Error::invalid("segment count must be positive"));
        }
        Ok(Self { segments })
    }

    /// Requested number of segments.
    #[inline]
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Split `[start, end]`.
    ///
    /// # Errors
    /// `InvalidArgument` when `start > end`.
    ///
    /// # Example
    /// ```rust
    /// use corelib::partitioner::RangePartitioner;
    ///
    /// let parts: Vec<_> = RangePartitioner::new(10)
    ///     .unwrap()
    ///     .divide(0, 99)
    ///     .unwrap()
    ///     .map(|r| (r.start, r.end))
    ///     .collect();
    /// assert_eq!(parts[0], (0, 9));
    /// assert_eq!(parts[9], (90, 99));
    /// ```
    pub fn divide(&self, start: i64, end: i64) -> Result<Segments> {
        let range = TokenRange::new(start, end)?;
        Ok(self.split(range))
    }

    /// Split an already validated range.
    pub fn split(&self, range: TokenRange) -> Segments {
        let total = range.width() as i128;
        let length = (total / self.segments as i128).max(1);
        Segments {
            start: range.start as i128,
            end: range.end as i128,
            length,
            segments: self.segments,
            expected: total.min(self.segments as i128) as usize,
            index: 0,
            done: false,
        }
    }
}

/// Lazy, ordered sequence of segments produced by [`RangePartitioner::split`].
#[derive(Debug, Clone)]
pub struct Segments {
    start: i128,
    end: i128,
    length: i128,
    segments: usize,
    expected: usize,
    index: usize,
    done: bool,
}

impl Iterator for Segments {
    type Item = TokenRange;

    fn next(&mut self) -> Option<TokenRange> {
        if self.done || self.index >= self.segments {
            return None;
        }

        let segment_start = self.start + self.index as i128 * self.length;
        let segment_end = if self.index + 1 == self.segments {
            self.end
        } else {
            (segment_start + self.length - 1).min(self.end)
        };

        self.index += 1;
        if segment_end == self.end {
            self.done = true;
        }

        // Both bounds lie within the i64 input range.
        Some(TokenRange {
            start: segment_start as i64,
            end: segment_end as i64,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            self.expected - self.index
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Segments {}

impl FusedIterator for Segments {}

/// Split `range` into `coarse` pieces, then split each of those into `fine`
/// pieces. The result is lazy and ordered like a single-level split.
pub fn split_two_level(
    range: TokenRange,
    coarse: RangePartitioner,
    fine: RangePartitioner,
) -> impl Iterator<Item = TokenRange> + Clone {
    coarse.split(range).flat_map(move |segment| fine.split(segment))
}
