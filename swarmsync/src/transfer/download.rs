//! One source's share of a transfer.

use std::fmt;
use std::sync::Arc;

use super::source::{SourceCapabilities, SourceId, SourceTransport};
use crate::range::Range;

/// Default number of range requests a source may have outstanding.
pub const DEFAULT_MAX_PENDING: usize = 15;

/// A file request bound to one peer.
///
/// Tracks the ranges requested from this peer and not yet received, so they
/// can be handed back to the scheduler if the peer goes away.
pub struct Download {
    source: SourceId,
    capabilities: SourceCapabilities,
    transport: Arc<dyn SourceTransport>,
    pending: Vec<Range>,
    started: bool,
    broken: bool,
    max_pending: usize,
}

impl Download {
    /// Create a download for `source`. It starts out not started.
    pub fn new(
        source: impl Into<SourceId>,
        capabilities: SourceCapabilities,
        transport: Arc<dyn SourceTransport>,
    ) -> Self {
        Self {
            source: source.into(),
            capabilities,
            transport,
            pending: Vec::new(),
            started: false,
            broken: false,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Set the outstanding request budget.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    pub(crate) fn transport(&self) -> &Arc<dyn SourceTransport> {
        &self.transport
    }

    pub(crate) fn set_max_pending(&mut self, max_pending: usize) {
        self.max_pending = max_pending.max(1);
    }

    /// Whether the peer accepts range requests.
    pub fn uses_part_requests(&self) -> bool {
        self.capabilities.part_requests
    }

    /// Whether the peer can deliver a signature record.
    pub fn supports_delta(&self) -> bool {
        self.capabilities.part_requests && self.capabilities.delta_sync
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn set_started(&mut self) {
        self.started = true;
    }

    pub fn set_broken(&mut self) {
        self.broken = true;
    }

    /// Whether a new range request would be considered at all.
    pub fn can_request(&self) -> bool {
        self.started
            && !self.broken
            && self.capabilities.part_requests
            && self.pending.len() < self.max_pending
    }

    /// Ask the peer for `range`.
    ///
    /// Returns true if the peer took the request; the range is then pending
    /// on this download until the data arrives.
    pub fn request_part(&mut self, range: Range) -> bool {
        if range.is_empty() || !self.can_request() {
            return false;
        }
        if !self.transport.request_range(range) {
            return false;
        }
        self.pending.push(range);
        true
    }

    /// Account for received data, shrinking or dropping pending requests.
    pub fn chunk_received(&mut self, range: Range) {
        if self.pending.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(self.pending.len());
        for pending in self.pending.drain(..) {
            match pending.intersection(&range) {
                None => remaining.push(pending),
                Some(hit) => {
                    let before = Range::by_bounds(pending.start(), hit.start());
                    let after = Range::by_bounds(hit.end(), pending.end());
                    remaining.extend([before, after].into_iter().filter(|r| !r.is_empty()));
                }
            }
        }
        self.pending = remaining;
    }

    /// Ranges requested and not yet received.
    pub fn pending_requests(&self) -> &[Range] {
        &self.pending
    }

    /// Bytes requested and not yet received.
    pub fn pending_bytes(&self) -> u64 {
        self.pending.iter().map(Range::length).sum()
    }

    pub(crate) fn take_pending(&mut self) -> Vec<Range> {
        std::mem::take(&mut self.pending)
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("source", &self.source)
            .field("capabilities", &self.capabilities)
            .field("pending", &self.pending)
            .field("started", &self.started)
            .field("broken", &self.broken)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}
