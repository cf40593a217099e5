//! Per-flow TCP reassembly.
//!
//! Segments are buffered by sequence number and drained into a
//! contiguous byte stream starting at an anchor. There is no ack
//! tracking and no retransmit detection beyond "same sequence arrives
//! again" (last writer wins). If a gap never fills, the stream simply
//! stops growing and the frame decoder stalls, which is the intended
//! degrade mode.

use std::collections::BTreeMap;

use tracing::warn;

/// Guard against malformed-input-driven pathology in the drain loop.
const DRAIN_CAP: usize = 10_000;

#[derive(Debug, Default)]
pub struct TcpReassembler {
    /// Next expected sequence number. `None` until the first segment or
    /// an explicit `clear`.
    anchor: Option<u32>,
    /// Out-of-order segments keyed by sequence number (unsigned order).
    cache: BTreeMap<u32, Vec<u8>>,
    /// Contiguous application byte stream ending at `anchor`.
    stream: Vec<u8>,
}

impl TcpReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and start a fresh stream at `seq`.
    pub fn clear(&mut self, seq: u32) {
        self.cache.clear();
        self.stream.clear();
        self.anchor = Some(seq);
    }

    /// Move the anchor without discarding already-reassembled bytes.
    pub fn set_next(&mut self, seq: u32) {
        self.anchor = Some(seq);
    }

    pub fn anchor(&self) -> Option<u32> {
        self.anchor
    }

    pub fn stream(&self) -> &[u8] {
        &self.stream
    }

    /// The frame decoder drains complete frames from the front of this.
    pub fn stream_mut(&mut self) -> &mut Vec<u8> {
        &mut self.stream
    }

    /// Insert a segment and drain everything now contiguous with the
    /// anchor. Segments earlier than the anchor stay cached and are
    /// never replayed.
    pub fn append_segment(&mut self, seq: u32, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.cache.insert(seq, bytes.to_vec());
        let mut anchor = match self.anchor {
            Some(a) => a,
            None => {
                self.anchor = Some(seq);
                seq
            }
        };

        let mut drained = 0;
        while let Some(segment) = self.cache.remove(&anchor) {
            self.stream.extend_from_slice(&segment);
            anchor = anchor.wrapping_add(segment.len() as u32);
            drained += 1;
            if drained >= DRAIN_CAP {
                warn!(drained, "reassembly drain loop hit its cap; breaking out");
                break;
            }
        }
        self.anchor = Some(anchor);
    }
}
