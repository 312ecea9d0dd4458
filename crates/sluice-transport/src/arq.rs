//! # ARQ: Automatic Repeat reQuest
//!
//! Timeout-driven retransmission tracking for the send side.
//!
//! Every transmitted segment that consumes sequence space (data or FIN) sits
//! in a [`RetransmitQueue`] in ascending sequence order until a cumulative
//! acknowledgment covers it. The periodic timer sweep asks the queue which
//! segments have been waiting longer than the retransmission timeout; those
//! are resent unchanged and their retry counter is bumped.
//!
//! ## Key design decisions
//!
//! - **Cumulative ACK only**: `ackno = K` retires every segment ending at or
//!   before `K`, nothing else
//! - **Fixed RTO**: no RTT estimation or back-off
//! - **Retry budget**: a segment timing out more than `max_retries` times
//!   kills the connection

use bytes::Bytes;
use quanta::Instant;
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::Error;
use crate::wire::seq_le;

// ─── In-Flight Segment ──────────────────────────────────────────────────────

/// A transmitted, not yet acknowledged segment.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub seqno: u32,
    pub payload: Bytes,
    pub fin: bool,
    /// Time of the most recent (re)transmission.
    pub sent_at: Instant,
    /// Number of retransmissions so far; 0 after the original send.
    pub retries: u32,
}

impl InFlight {
    pub fn new(seqno: u32, payload: Bytes, fin: bool, sent_at: Instant) -> Self {
        InFlight {
            seqno,
            payload,
            fin,
            sent_at,
            retries: 0,
        }
    }

    /// Sequence space consumed (payload bytes, or 1 for a FIN).
    pub fn seq_len(&self) -> u32 {
        self.payload.len() as u32 + u32::from(self.fin)
    }

    /// First sequence number after this segment.
    pub fn end(&self) -> u32 {
        self.seqno.wrapping_add(self.seq_len())
    }
}

/// Outcome of applying a cumulative acknowledgment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retired {
    pub segments: usize,
    pub bytes: usize,
    pub fin: bool,
}

// ─── Retransmit Queue ───────────────────────────────────────────────────────

/// Ordered list of in-flight segments with their retry bookkeeping.
#[derive(Debug)]
pub struct RetransmitQueue {
    segments: VecDeque<InFlight>,
    max_retries: u32,
}

impl RetransmitQueue {
    pub fn new(max_retries: u32) -> Self {
        RetransmitQueue {
            segments: VecDeque::new(),
            max_retries,
        }
    }

    /// Track a freshly sent segment. Segments must be pushed in send order.
    pub fn push(&mut self, segment: InFlight) {
        debug_assert!(
            self.segments
                .back()
                .map_or(true, |last| last.end() == segment.seqno),
            "in-flight segments must be contiguous and ascending"
        );
        self.segments.push_back(segment);
    }

    /// Drop every segment with `seqno + len <= ackno`.
    pub fn retire_through(&mut self, ackno: u32) -> Retired {
        let mut retired = Retired::default();
        while let Some(front) = self.segments.front() {
            if !seq_le(front.end(), ackno) {
                break;
            }
            retired.segments += 1;
            retired.bytes += front.payload.len();
            retired.fin |= front.fin;
            self.segments.pop_front();
        }
        retired
    }

    /// Collect segments whose age exceeds `rto`, bumping their retry count and
    /// resetting their timestamp. Fails as soon as one of them would exceed
    /// the retry budget; nothing is returned for retransmission in that case.
    pub fn collect_expired(&mut self, now: Instant, rto: Duration) -> Result<Vec<InFlight>, Error> {
        let mut due = Vec::new();
        for segment in self.segments.iter_mut() {
            if now.saturating_duration_since(segment.sent_at) <= rto {
                continue;
            }
            segment.retries += 1;
            if segment.retries > self.max_retries {
                return Err(Error::RetriesExhausted {
                    seqno: segment.seqno,
                    retries: segment.retries - 1,
                });
            }
            segment.sent_at = now;
            due.push(segment.clone());
        }
        Ok(due)
    }

    pub fn front(&self) -> Option<&InFlight> {
        self.segments.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InFlight> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
