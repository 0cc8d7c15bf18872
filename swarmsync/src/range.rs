//! Half-open byte ranges.
//!
//! A [`Range`] is the unit of scheduling (one range is requested from one
//! source at a time) and the key of the part-state tracker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable half-open byte interval `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    start: u64,
    length: u64,
}

impl Range {
    /// Create a range from a start offset and a length.
    pub const fn by_length(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Create a range from its bounds. `end` is exclusive.
    ///
    /// An `end` before `start` yields an empty range at `start`.
    pub fn by_bounds(start: u64, end: u64) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// First byte offset covered by the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of bytes covered.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Offset just past the last byte.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// True if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True if `offset` lies inside the range.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// True if `other` lies completely inside this range.
    ///
    /// An empty range is contained by any range whose bounds include its start.
    pub fn contains_range(&self, other: &Range) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    /// True if both ranges share at least one byte.
    pub fn intersects(&self, other: &Range) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// The bytes shared by both ranges, if any.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.intersects(other) {
            return None;
        }
        Some(Range::by_bounds(
            self.start.max(other.start),
            self.end().min(other.end()),
        ))
    }

    /// Clamp the range to at most `max_length` bytes, keeping the start.
    pub fn truncate(&self, max_length: u64) -> Range {
        Range::by_length(self.start, self.length.min(max_length))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_length_and_bounds_agree() {
        let a = Range::by_length(10, 5);
        let b = Range::by_bounds(10, 15);
        assert_eq!(a, b);
        assert_eq!(a.end(), 15);
    }

    #[test]
    fn test_by_bounds_inverted_is_empty() {
        let r = Range::by_bounds(20, 10);
        assert!(r.is_empty());
        assert_eq!(r.start(), 20);
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = Range::by_length(0, 10);
        assert!(r.contains(0));
        assert!(r.contains(9));
        assert!(!r.contains(10));
    }

    #[test]
    fn test_contains_range() {
        let outer = Range::by_length(0, 100);
        assert!(outer.contains_range(&Range::by_length(10, 20)));
        assert!(outer.contains_range(&outer));
        assert!(!outer.contains_range(&Range::by_length(90, 20)));
    }

    #[test]
    fn test_intersection() {
        let a = Range::by_length(0, 10);
        let b = Range::by_length(5, 10);
        assert_eq!(a.intersection(&b), Some(Range::by_bounds(5, 10)));

        // Touching ranges share no byte
        let c = Range::by_length(10, 5);
        assert!(!a.intersects(&c));
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_truncate() {
        let r = Range::by_length(100, 1000);
        assert_eq!(r.truncate(32), Range::by_length(100, 32));
        assert_eq!(r.truncate(5000), r);
    }

    #[test]
    fn test_display() {
        assert_eq!(Range::by_length(3, 4).to_string(), "[3, 7)");
    }
}
