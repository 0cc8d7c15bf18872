//! Range-to-state map over a file.
//!
//! [`FilePartsState`] partitions `[0, file_length)` into disjoint ranges, each
//! tagged with a [`PartState`]. The download manager uses it both to decide
//! which range to request next and to report progress.
//!
//! # Invariants
//!
//! - The ranges cover `[0, file_length)` exactly, with no gaps or overlaps.
//! - Neighbouring ranges never carry the same state (they are merged).
//! - A fresh tracker is entirely [`PartState::Needed`].

use std::fmt;

use crate::range::Range;

/// State of a byte range within a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartState {
    /// Must still be fetched.
    Needed,
    /// Requested from a source, data not yet received.
    Pending,
    /// Present and correct in the temp file.
    Available,
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartState::Needed => write!(f, "needed"),
            PartState::Pending => write!(f, "pending"),
            PartState::Available => write!(f, "available"),
        }
    }
}

/// Byte totals per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartCounts {
    pub needed: u64,
    pub pending: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Part {
    range: Range,
    state: PartState,
}

/// Tracks the state of every byte of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePartsState {
    file_length: u64,
    parts: Vec<Part>,
}

impl FilePartsState {
    /// Create a tracker for a file with nothing available yet.
    pub fn new(file_length: u64) -> Self {
        let parts = if file_length == 0 {
            Vec::new()
        } else {
            vec![Part {
                range: Range::by_length(0, file_length),
                state: PartState::Needed,
            }]
        };
        Self { file_length, parts }
    }

    /// Length of the tracked file.
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// The full range `[0, file_length)`.
    pub fn range(&self) -> Range {
        Range::by_length(0, self.file_length)
    }

    /// Set the state of every byte in `range`.
    ///
    /// Bytes outside `[0, file_length)` are ignored. Calling this twice with
    /// the same arguments leaves the tracker unchanged the second time.
    pub fn set_part_state(&mut self, range: Range, state: PartState) {
        let Some(range) = range.intersection(&self.range()) else {
            return;
        };

        let mut parts = Vec::with_capacity(self.parts.len() + 2);
        let mut inserted = false;

        for part in self.parts.drain(..) {
            if !part.range.intersects(&range) {
                if !inserted && part.range.start() >= range.end() {
                    parts.push(Part { range, state });
                    inserted = true;
                }
                parts.push(part);
                continue;
            }

            if part.range.start() < range.start() {
                parts.push(Part {
                    range: Range::by_bounds(part.range.start(), range.start()),
                    state: part.state,
                });
            }
            if !inserted {
                parts.push(Part { range, state });
                inserted = true;
            }
            if part.range.end() > range.end() {
                parts.push(Part {
                    range: Range::by_bounds(range.end(), part.range.end()),
                    state: part.state,
                });
            }
        }
        if !inserted {
            parts.push(Part { range, state });
        }

        self.parts = coalesce(parts);
    }

    /// The lowest-offset range in `state`, if any.
    pub fn find_first_part(&self, state: PartState) -> Option<Range> {
        self.parts
            .iter()
            .find(|p| p.state == state)
            .map(|p| p.range)
    }

    /// Number of bytes within `range` that are in `state`.
    pub fn count_part_states(&self, range: Range, state: PartState) -> u64 {
        self.parts
            .iter()
            .filter(|p| p.state == state)
            .filter_map(|p| p.range.intersection(&range))
            .map(|r| r.length())
            .sum()
    }

    /// Byte totals for all three states over the whole file.
    pub fn counts(&self) -> PartCounts {
        let mut counts = PartCounts::default();
        for part in &self.parts {
            match part.state {
                PartState::Needed => counts.needed += part.range.length(),
                PartState::Pending => counts.pending += part.range.length(),
                PartState::Available => counts.available += part.range.length(),
            }
        }
        counts
    }

    /// True if the whole file is available.
    pub fn is_completed(&self) -> bool {
        match self.parts.as_slice() {
            [] => true,
            [only] => only.state == PartState::Available,
            _ => false,
        }
    }

    /// Iterate the ranges and their states in offset order.
    pub fn parts(&self) -> impl Iterator<Item = (Range, PartState)> + '_ {
        self.parts.iter().map(|p| (p.range, p.state))
    }
}

/// Merge neighbours with equal state and drop empty parts.
fn coalesce(parts: Vec<Part>) -> Vec<Part> {
    let mut merged: Vec<Part> = Vec::with_capacity(parts.len());
    for part in parts.into_iter().filter(|p| !p.range.is_empty()) {
        match merged.last_mut() {
            Some(last) if last.state == part.state && last.range.end() == part.range.start() => {
                last.range = Range::by_bounds(last.range.start(), part.range.end());
            }
            _ => merged.push(part),
        }
    }
    merged
}
