//! # Sender State Machine
//!
//! Pure logic, no I/O. Buffers host input, cuts it into segments that fit the
//! peer's advertised window, tracks them until acknowledged, and produces
//! [`OutputSegment`]s for the connection to stamp and transmit.
//!
//! ## Responsibilities
//!
//! 1. **Segmentation**: assign sequence numbers, at most `max_payload` bytes each
//! 2. **Flow control**: never let bytes in flight exceed the peer window
//! 3. **Pending input**: hold bytes the window cannot take yet
//! 4. **ACK processing**: cumulative retirement, window updates
//! 5. **Retransmission**: resend expired segments via [`RetransmitQueue`]
//! 6. **FIN**: send exactly one FIN once input is exhausted and drained
//! 7. **Zero-window probing**: keep asking a closed window for updates
//!
//! Acknowledgment numbers and window advertisements come from the receive
//! side, so the sender leaves them to the connection.

use bytes::{Bytes, BytesMut};
use quanta::Instant;
use std::collections::VecDeque;
use std::time::Duration;

use crate::arq::{InFlight, Retired, RetransmitQueue};
use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::wire::seq_lt;

/// First sequence number used by both directions.
pub const INITIAL_SEQNO: u32 = 1;

// ─── Output Segment ─────────────────────────────────────────────────────────

/// Segment ready to be stamped with ackno/window and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSegment {
    pub seqno: u32,
    pub payload: Bytes,
    pub fin: bool,
    pub kind: OutputKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// First transmission.
    Original,
    /// Resent after a timeout.
    Retransmit { retries: u32 },
    /// Zero-length segment below the receiver's expected seqno.
    Probe,
}

/// What an incoming acknowledgment changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub retired: Retired,
    /// The acknowledgment was outside `[unacked_base, next_seqno]`.
    pub ignored: bool,
    /// This acknowledgment retired our FIN.
    pub fin_acked: bool,
    /// The window was older than the one already applied and was skipped.
    pub window_stale: bool,
}

// ─── Sender ─────────────────────────────────────────────────────────────────

/// Send half of a connection.
pub struct Sender {
    max_payload: usize,
    send_buffer: usize,
    next_seqno: u32,
    unacked_base: u32,
    peer_window: u32,
    /// Peer seqno of the segment the current window came from.
    window_seqno: Option<u32>,
    in_flight: RetransmitQueue,
    pending: BytesMut,
    input_eof: bool,
    fin_sent: bool,
    fin_acked: bool,
    /// When the current blocked-window period (or last probe) started.
    probe_since: Option<Instant>,
    probe_retries: u32,
    output_queue: VecDeque<OutputSegment>,
}

impl Sender {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_initial_seqno(config, INITIAL_SEQNO)
    }

    pub fn with_initial_seqno(config: &ConnectionConfig, initial_seqno: u32) -> Self {
        Sender {
            max_payload: config.max_payload,
            send_buffer: config.send_buffer,
            next_seqno: initial_seqno,
            unacked_base: initial_seqno,
            peer_window: config.window,
            window_seqno: None,
            in_flight: RetransmitQueue::new(config.max_retries),
            pending: BytesMut::new(),
            input_eof: false,
            fin_sent: false,
            fin_acked: false,
            probe_since: None,
            probe_retries: 0,
            output_queue: VecDeque::new(),
        }
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Room left in the pending-input buffer; 0 once input has ended.
    pub fn input_room(&self) -> usize {
        if self.input_eof {
            0
        } else {
            self.send_buffer.saturating_sub(self.pending.len())
        }
    }

    pub fn buffer_input(&mut self, data: &[u8]) {
        debug_assert!(!self.input_eof, "input after end-of-input");
        self.pending.extend_from_slice(data);
    }

    pub fn mark_input_eof(&mut self) {
        self.input_eof = true;
    }

    // ─── Transmission ────────────────────────────────────────────────────

    /// Move as much pending input into flight as the window allows, then the
    /// FIN if input is exhausted. Returns the number of segments queued.
    pub fn fill_window(&mut self, now: Instant) -> usize {
        let mut queued = 0;

        while !self.pending.is_empty() {
            let room = self.window_available() as usize;
            let take = self.pending.len().min(self.max_payload).min(room);
            if take == 0 {
                break;
            }
            let payload = self.pending.split_to(take).freeze();
            self.transmit(payload, false, now);
            queued += 1;
        }

        if self.pending.is_empty() {
            self.probe_since = None;
            self.probe_retries = 0;
            if self.input_eof && !self.fin_sent {
                self.fin_sent = true;
                self.transmit(Bytes::new(), true, now);
                queued += 1;
            }
        } else if self.in_flight.is_empty() && self.probe_since.is_none() {
            self.probe_since = Some(now);
        }

        queued
    }

    fn transmit(&mut self, payload: Bytes, fin: bool, now: Instant) {
        let seqno = self.next_seqno;
        let segment = InFlight::new(seqno, payload.clone(), fin, now);
        self.next_seqno = segment.end();
        self.in_flight.push(segment);
        self.output_queue.push_back(OutputSegment {
            seqno,
            payload,
            fin,
            kind: OutputKind::Original,
        });
    }

    /// Queue every segment older than `rto` for retransmission.
    pub fn collect_retransmits(&mut self, now: Instant, rto: Duration) -> Result<usize, Error> {
        let due = self.in_flight.collect_expired(now, rto)?;
        let count = due.len();
        for segment in due {
            self.output_queue.push_back(OutputSegment {
                seqno: segment.seqno,
                payload: segment.payload,
                fin: segment.fin,
                kind: OutputKind::Retransmit {
                    retries: segment.retries,
                },
            });
        }
        Ok(count)
    }

    /// Queue a zero-window probe if input has been blocked by a closed window
    /// for longer than `rto` with nothing in flight. Probes share the
    /// per-segment retry budget.
    pub fn poll_probe(&mut self, now: Instant, rto: Duration) -> Result<bool, Error> {
        if !self.is_window_blocked() {
            self.probe_since = None;
            self.probe_retries = 0;
            return Ok(false);
        }
        let since = *self.probe_since.get_or_insert(now);
        if now.saturating_duration_since(since) <= rto {
            return Ok(false);
        }
        if self.probe_retries >= self.in_flight.max_retries() {
            return Err(Error::RetriesExhausted {
                seqno: self.next_seqno,
                retries: self.probe_retries,
            });
        }
        self.probe_retries += 1;
        self.probe_since = Some(now);
        self.output_queue.push_back(OutputSegment {
            seqno: self.next_seqno.wrapping_sub(1),
            payload: Bytes::new(),
            fin: false,
            kind: OutputKind::Probe,
        });
        Ok(true)
    }

    /// Drain segments ready for transmission.
    pub fn drain_output(&mut self) -> impl Iterator<Item = OutputSegment> + '_ {
        self.output_queue.drain(..)
    }

    pub fn output_queue_len(&self) -> usize {
        self.output_queue.len()
    }

    // ─── Acknowledgments ─────────────────────────────────────────────────

    /// Apply a cumulative acknowledgment and the window advertised with it.
    /// `seqno` is the sequence number of the segment carrying them. A window
    /// carried by a segment older than the one last applied is skipped.
    pub fn process_ack(&mut self, seqno: u32, ackno: u32, window: u16) -> AckOutcome {
        // Stale or acknowledging bytes never sent.
        if seq_lt(ackno, self.unacked_base) || seq_lt(self.next_seqno, ackno) {
            return AckOutcome {
                ignored: true,
                ..AckOutcome::default()
            };
        }

        let retired = self.in_flight.retire_through(ackno);
        self.unacked_base = ackno;
        // Acks never move backwards past the range check, so only the
        // carrying seqno can mark the advertisement as stale.
        let window_stale = self.window_seqno.is_some_and(|last| seq_lt(seqno, last));
        if !window_stale {
            self.peer_window = u32::from(window);
            self.window_seqno = Some(seqno);
        }

        let fin_acked = retired.fin && !self.fin_acked;
        self.fin_acked |= retired.fin;

        // A valid ack means the peer is alive, even if its window is still shut.
        self.probe_retries = 0;
        if retired.segments > 0 || self.window_available() > 0 {
            self.probe_since = None;
        }

        AckOutcome {
            retired,
            ignored: false,
            fin_acked,
            window_stale,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    /// Payload bytes sent but not yet acknowledged. The FIN slot is excluded.
    pub fn bytes_in_flight(&self) -> u32 {
        let span = self.next_seqno.wrapping_sub(self.unacked_base);
        let fin_outstanding = u32::from(self.fin_sent && !self.fin_acked);
        span - fin_outstanding
    }

    /// Window space left for new payload.
    pub fn window_available(&self) -> u32 {
        self.peer_window.saturating_sub(self.bytes_in_flight())
    }

    /// Pending input exists but the window is closed with nothing in flight.
    pub fn is_window_blocked(&self) -> bool {
        !self.pending.is_empty() && self.in_flight.is_empty() && self.window_available() == 0
    }

    pub fn next_seqno(&self) -> u32 {
        self.next_seqno
    }

    pub fn unacked_base(&self) -> u32 {
        self.unacked_base
    }

    pub fn peer_window(&self) -> u32 {
        self.peer_window
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> &RetransmitQueue {
        &self.in_flight
    }

    pub fn input_eof(&self) -> bool {
        self.input_eof
    }

    pub fn fin_sent(&self) -> bool {
        self.fin_sent
    }

    pub fn fin_acked(&self) -> bool {
        self.fin_acked
    }
}
