//! # Receiver State Machine
//!
//! Pure logic, no I/O. Takes decoded segments, accepts in-order payload into
//! the output buffer, optionally holds out-of-order segments until the gap
//! fills, tracks the peer's FIN, and reports whether an acknowledgment is
//! owed.
//!
//! ## Responsibilities
//!
//! 1. **Ordering**: only `seqno == expected` advances the stream
//! 2. **Duplicate suppression**: anything below `expected` is re-acked, not re-delivered
//! 3. **Reorder buffer**: hold up to `reorder_capacity` segments above `expected`
//! 4. **Output buffer**: bounded by the configured window until flushed
//! 5. **FIN**: consumes one sequence slot once everything before it arrived
//!
//! The receiver does NOT write to the sink; the connection drains
//! [`Receiver::output`] into the host and calls [`Receiver::consume`].

use bytes::{Buf, Bytes, BytesMut};
use std::collections::BTreeMap;

use crate::config::ConnectionConfig;
use crate::sender::INITIAL_SEQNO;
use crate::wire::{seq_lt, Segment};

// ─── Arrival ────────────────────────────────────────────────────────────────

/// Classification of one incoming segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalKind {
    /// No payload and no FIN at or above `expected` (pure acknowledgment).
    Empty,
    /// Accepted in order (possibly releasing held segments).
    InOrder,
    /// Already received; payload discarded.
    Duplicate,
    /// Above `expected`, stored in the reorder buffer.
    Held,
    /// Above `expected` without room to hold it, or in order but the output
    /// buffer is full.
    Dropped,
}

/// What [`Receiver::accept`] did with a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub kind: ArrivalKind,
    /// Payload bytes appended to the output buffer, including released
    /// held segments.
    pub delivered: usize,
    /// The peer's FIN was accepted by this arrival.
    pub fin_accepted: bool,
    /// An acknowledgment should be sent in response.
    pub needs_ack: bool,
}

impl Arrival {
    fn new(kind: ArrivalKind, needs_ack: bool) -> Self {
        Arrival {
            kind,
            delivered: 0,
            fin_accepted: false,
            needs_ack,
        }
    }
}

#[derive(Debug, Clone)]
struct HeldSegment {
    payload: Bytes,
    fin: bool,
}

// ─── Receiver ───────────────────────────────────────────────────────────────

/// Receive half of a connection.
pub struct Receiver {
    expected: u32,
    reorder_buf: BTreeMap<u32, HeldSegment>,
    reorder_capacity: usize,
    output: BytesMut,
    output_capacity: usize,
    remote_fin: bool,
    eof_signaled: bool,
}

impl Receiver {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_initial_seqno(config, INITIAL_SEQNO)
    }

    pub fn with_initial_seqno(config: &ConnectionConfig, initial_seqno: u32) -> Self {
        Receiver {
            expected: initial_seqno,
            reorder_buf: BTreeMap::new(),
            reorder_capacity: config.reorder_capacity,
            output: BytesMut::new(),
            output_capacity: config.window as usize,
            remote_fin: false,
            eof_signaled: false,
        }
    }

    /// Process a decoded segment.
    pub fn accept(&mut self, segment: &Segment) -> Arrival {
        let seqno = segment.seqno;

        if segment.seq_len() == 0 {
            // Below expected is a probe or a stale ack: answer with our state.
            let probe = seq_lt(seqno, self.expected);
            return Arrival::new(ArrivalKind::Empty, probe);
        }

        if seq_lt(seqno, self.expected) {
            return Arrival::new(ArrivalKind::Duplicate, true);
        }

        if seqno != self.expected {
            return self.hold(seqno, segment);
        }

        if self.remote_fin {
            // Nothing can follow the peer's FIN.
            return Arrival::new(ArrivalKind::Dropped, true);
        }

        let mut arrival = Arrival::new(ArrivalKind::InOrder, true);
        if !self.take_in_order(&segment.payload, segment.is_fin()) {
            arrival.kind = ArrivalKind::Dropped;
            return arrival;
        }
        arrival.delivered += segment.payload.len();
        arrival.fin_accepted |= segment.is_fin();

        // Release held segments that are now in order.
        while !self.remote_fin {
            let Some(held) = self.reorder_buf.remove(&self.expected) else {
                break;
            };
            if !self.take_in_order(&held.payload, held.fin) {
                self.reorder_buf.insert(self.expected, held);
                break;
            }
            arrival.delivered += held.payload.len();
            arrival.fin_accepted |= held.fin;
        }
        let expected = self.expected;
        self.reorder_buf.retain(|&s, _| !seq_lt(s, expected));

        arrival
    }

    fn hold(&mut self, seqno: u32, segment: &Segment) -> Arrival {
        if self.reorder_buf.contains_key(&seqno) {
            return Arrival::new(ArrivalKind::Duplicate, true);
        }
        if self.remote_fin || self.reorder_buf.len() >= self.reorder_capacity {
            return Arrival::new(ArrivalKind::Dropped, true);
        }
        self.reorder_buf.insert(
            seqno,
            HeldSegment {
                payload: segment.payload.clone(),
                fin: segment.is_fin(),
            },
        );
        Arrival::new(ArrivalKind::Held, true)
    }

    /// Append an in-order payload (and FIN) if the output buffer has room.
    /// An empty buffer always takes the segment so an oversized peer segment
    /// cannot stall the stream.
    fn take_in_order(&mut self, payload: &Bytes, fin: bool) -> bool {
        let room = self.output_capacity.saturating_sub(self.output.len());
        if payload.len() > room && !self.output.is_empty() {
            return false;
        }
        self.output.extend_from_slice(payload);
        self.expected = self.expected.wrapping_add(payload.len() as u32);
        if fin {
            self.remote_fin = true;
            self.expected = self.expected.wrapping_add(1);
        }
        true
    }

    // ─── Output Buffer ───────────────────────────────────────────────────

    /// In-order bytes not yet accepted by the sink.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drop `n` bytes the sink accepted.
    pub fn consume(&mut self, n: usize) {
        self.output.advance(n);
    }

    /// Returns `true` exactly once: after the peer's FIN when every byte
    /// before it has been consumed.
    pub fn take_eof(&mut self) -> bool {
        if self.remote_fin && self.output.is_empty() && !self.eof_signaled {
            self.eof_signaled = true;
            return true;
        }
        false
    }

    // ─── Acknowledgment State ────────────────────────────────────────────

    /// Cumulative acknowledgment number, FIN slot included.
    pub fn ack_number(&self) -> u32 {
        self.expected
    }

    /// Window to advertise given the sink's free space.
    pub fn advertised_window(&self, sink_space: usize) -> u16 {
        let capacity = self.output_capacity.min(sink_space);
        capacity
            .saturating_sub(self.output.len())
            .min(u16::MAX as usize) as u16
    }

    pub fn remote_fin(&self) -> bool {
        self.remote_fin
    }

    /// Peer closed and all of its data reached the sink.
    pub fn is_finished(&self) -> bool {
        self.remote_fin && self.output.is_empty()
    }

    pub fn reorder_buffer_len(&self) -> usize {
        self.reorder_buf.len()
    }

    pub fn buffered_len(&self) -> usize {
        self.output.len()
    }
}
