//! # Connection Statistics
//!
//! Counters kept per connection and handed back with the teardown event.
//! Serializable so hosts can export them as JSON.

use serde::Serialize;

/// Per-connection counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Segments transmitted, including retransmissions, acks and probes.
    pub segments_sent: u64,
    /// Payload bytes transmitted for the first time.
    pub bytes_sent: u64,
    /// Segments resent after a retransmission timeout.
    pub retransmissions: u64,
    /// Bytes acknowledged by the peer.
    pub bytes_acked: u64,
    /// Segments that passed decoding.
    pub segments_received: u64,
    /// Segments dropped for a bad checksum or length.
    pub corrupt_dropped: u64,
    /// Payload bytes accepted in order.
    pub bytes_received: u64,
    /// Payload bytes handed to the output sink.
    pub bytes_delivered: u64,
    /// Segments that had already been received.
    pub duplicates: u64,
    /// Out-of-order segments held for reassembly.
    pub out_of_order_held: u64,
    /// Out-of-order or over-window segments dropped.
    pub out_of_order_dropped: u64,
    /// Zero-window probes sent.
    pub probes_sent: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retransmission overhead relative to all segments sent.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.segments_sent as f64
        }
    }
}
