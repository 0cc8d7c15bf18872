//! The boundary between the manager and a peer connection.
//!
//! The transport layer implements [`SourceTransport`] for each peer and
//! feeds received data back through the manager's `received_*` methods.
//! Everything else about the connection (framing, handshake, wire format)
//! stays on the transport side.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::range::Range;

/// Identity of a peer source, unique within one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Create an identity from a peer name.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The peer name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// What a peer supports for this file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCapabilities {
    /// The peer accepts explicit range requests.
    pub part_requests: bool,
    /// The peer can send a signature record.
    pub delta_sync: bool,
    /// The peer may share the transfer with other peers.
    pub swarming: bool,
}

impl SourceCapabilities {
    /// A modern peer supporting every feature.
    pub fn full() -> Self {
        Self {
            part_requests: true,
            delta_sync: true,
            swarming: true,
        }
    }

    /// A peer that streams the whole file from an offset.
    pub fn streaming() -> Self {
        Self::default()
    }

    /// Set range request support.
    pub fn with_part_requests(mut self, enabled: bool) -> Self {
        self.part_requests = enabled;
        self
    }

    /// Set signature record support.
    pub fn with_delta_sync(mut self, enabled: bool) -> Self {
        self.delta_sync = enabled;
        self
    }

    /// Set swarming support.
    pub fn with_swarming(mut self, enabled: bool) -> Self {
        self.swarming = enabled;
        self
    }
}

/// A block of file data received from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    /// Offset of the first byte in the file.
    pub offset: u64,
    /// The bytes.
    pub data: Bytes,
}

impl FileChunk {
    /// Create a chunk.
    pub fn new(offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            data: data.into(),
        }
    }

    /// The range of the file this chunk covers.
    pub fn range(&self) -> Range {
        Range::by_length(self.offset, self.data.len() as u64)
    }
}

/// Requests the manager sends to a peer.
///
/// Implementations must not call back into the manager synchronously from
/// these methods; the manager lock is held while they run. Responses are
/// delivered later, from the transport's own thread.
pub trait SourceTransport: Send + Sync {
    /// Open the transfer, starting at `start_offset`.
    ///
    /// Peers without range request support stream from there to the end.
    fn request_file(&self, start_offset: u64);

    /// Ask for one range. Returns false if the peer cannot take it now.
    fn request_range(&self, range: Range) -> bool;

    /// Ask for the signature record of the file.
    fn request_parts_record(&self);

    /// Stop sending anything for this transfer.
    fn abort(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id() {
        let id = SourceId::new("peer-a");
        assert_eq!(id.as_str(), "peer-a");
        assert_eq!(id.to_string(), "peer-a");
        assert_eq!(id, SourceId::from("peer-a"));
        assert_eq!(id, SourceId::from("peer-a".to_string()));
    }

    #[test]
    fn test_capabilities_builders() {
        let caps = SourceCapabilities::streaming()
            .with_part_requests(true)
            .with_delta_sync(true);
        assert!(caps.part_requests);
        assert!(caps.delta_sync);
        assert!(!caps.swarming);
        assert_eq!(SourceCapabilities::full().with_swarming(false), caps);
    }

    #[test]
    fn test_chunk_range() {
        let chunk = FileChunk::new(100, vec![0u8; 50]);
        assert_eq!(chunk.range(), Range::by_bounds(100, 150));
    }
}
