//! # Connection
//!
//! One reliable byte stream: a [`Sender`], a [`Receiver`], the host handle
//! they talk through, and the close handshake tying them together. The
//! lifecycle is:
//!
//! ```text
//!            local FIN sent                  remote FIN received
//!   Open ──────────────────▶ LocalFinSent ─┐        ┌─ RemoteFinReceived ◀── Open
//!                                          ▼        ▼
//!                                           Closing ──(both FINs acked, output
//!                                                      drained, linger over)──▶ destroyed
//!
//!   any state ──(retry budget exhausted / host I/O error)──▶ destroyed (dead)
//! ```
//!
//! Each pipeline method returns a [`Disposition`] or an [`Error`]. The
//! connection never destroys itself; the engine does that at the entry-point
//! boundary, so a fatal error in the middle of a pipeline cannot leave the
//! registry half-updated.

use quanta::Instant;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::host::{Host, Input};
use crate::receiver::{ArrivalKind, Receiver};
use crate::registry::ConnectionId;
use crate::sender::{OutputKind, Sender};
use crate::stats::ConnectionStats;
use crate::wire::{Flags, Segment};

// ─── Connection State ───────────────────────────────────────────────────────

/// Observable close-handshake state of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Both directions open.
    Open,
    /// Our FIN is out; the peer may still send.
    LocalFinSent,
    /// The peer's FIN arrived; we may still send.
    RemoteFinReceived,
    /// Both FINs exchanged; waiting for acknowledgment, output drain or linger.
    Closing,
}

/// What the engine should do with the connection after a pipeline call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    /// Close handshake complete; destroy normally.
    Close,
}

// ─── Connection ─────────────────────────────────────────────────────────────

/// A live connection and the host handle it owns.
pub struct Connection<H: Host> {
    id: ConnectionId,
    host: H,
    config: ConnectionConfig,
    sender: Sender,
    receiver: Receiver,
    stats: ConnectionStats,
    linger_until: Option<Instant>,
    last_advertised: u16,
    read_buf: Vec<u8>,
}

impl<H: Host> Connection<H> {
    pub(crate) fn new(id: ConnectionId, host: H, config: ConnectionConfig) -> Self {
        let sender = Sender::new(&config);
        let receiver = Receiver::new(&config);
        let last_advertised = receiver.advertised_window(host.buffer_space());
        Connection {
            id,
            host,
            read_buf: vec![0; config.max_payload],
            config,
            sender,
            receiver,
            stats: ConnectionStats::default(),
            linger_until: None,
            last_advertised,
        }
    }

    // ─── Pipelines ───────────────────────────────────────────────────────

    /// Send pipeline: pull host input, then transmit what the window allows.
    pub(crate) fn on_input(&mut self, now: Instant) -> Result<Disposition, Error> {
        loop {
            let room = self.sender.input_room().min(self.read_buf.len());
            if room == 0 {
                break;
            }
            match self
                .host
                .poll_input(&mut self.read_buf[..room])
                .map_err(Error::Input)?
            {
                Input::Data(0) => break,
                Input::Data(n) => {
                    let n = n.min(room);
                    self.sender.buffer_input(&self.read_buf[..n]);
                }
                Input::Eof => {
                    debug!(conn = %self.id, seqno = self.sender.next_seqno(), "end of input");
                    self.sender.mark_input_eof();
                    break;
                }
            }
        }

        self.sender.fill_window(now);
        self.transmit_queued()?;
        Ok(self.check_closed(now))
    }

    /// Receive pipeline: validate, apply the ACK, accept payload/FIN, respond.
    pub(crate) fn on_segment(&mut self, datagram: &[u8], now: Instant) -> Result<Disposition, Error> {
        let segment = match Segment::decode(datagram) {
            Ok(segment) => segment,
            Err(err) => {
                self.stats.corrupt_dropped += 1;
                trace!(conn = %self.id, %err, "dropping segment");
                return Ok(Disposition::Keep);
            }
        };
        self.stats.segments_received += 1;

        if segment.flags.contains(Flags::ACK) {
            let outcome = self
                .sender
                .process_ack(segment.seqno, segment.ackno, segment.window);
            if outcome.ignored {
                trace!(conn = %self.id, ackno = segment.ackno, "ignoring out-of-range ack");
            } else if outcome.window_stale {
                trace!(conn = %self.id, seqno = segment.seqno, "keeping newer window");
            }
            self.stats.bytes_acked += outcome.retired.bytes as u64;
            if outcome.fin_acked {
                debug!(conn = %self.id, "local FIN acknowledged");
            }
        }

        let arrival = self.receiver.accept(&segment);
        self.stats.bytes_received += arrival.delivered as u64;
        match arrival.kind {
            ArrivalKind::Duplicate => self.stats.duplicates += 1,
            ArrivalKind::Held => self.stats.out_of_order_held += 1,
            ArrivalKind::Dropped => self.stats.out_of_order_dropped += 1,
            ArrivalKind::InOrder | ArrivalKind::Empty => {}
        }
        if arrival.kind != ArrivalKind::InOrder && arrival.kind != ArrivalKind::Empty {
            trace!(
                conn = %self.id,
                seqno = segment.seqno,
                expected = self.receiver.ack_number(),
                kind = ?arrival.kind,
                "segment not accepted in order"
            );
        }
        if arrival.fin_accepted {
            debug!(conn = %self.id, ackno = self.receiver.ack_number(), "remote FIN received");
        }

        // Flush first so the acknowledgment advertises the freed space.
        self.flush_output()?;
        if arrival.needs_ack {
            self.send_ack()?;
        } else {
            self.announce_window()?;
        }

        // The acknowledgment may have opened the peer's window.
        self.sender.fill_window(now);
        self.transmit_queued()?;
        Ok(self.check_closed(now))
    }

    /// Output flush: the sink has room again.
    pub(crate) fn on_output(&mut self, now: Instant) -> Result<Disposition, Error> {
        self.flush_output()?;
        self.announce_window()?;
        Ok(self.check_closed(now))
    }

    /// Timer sweep for this connection.
    pub(crate) fn on_tick(&mut self, now: Instant) -> Result<Disposition, Error> {
        if let Some(deadline) = self.linger_until {
            return Ok(if now >= deadline {
                Disposition::Close
            } else {
                Disposition::Keep
            });
        }

        let resent = self.sender.collect_retransmits(now, self.config.rto)?;
        if resent > 0 {
            debug!(
                conn = %self.id,
                segments = resent,
                base = self.sender.unacked_base(),
                "retransmitting"
            );
        }
        if self.sender.poll_probe(now, self.config.rto)? {
            trace!(conn = %self.id, window = self.sender.peer_window(), "zero-window probe");
        }
        self.transmit_queued()?;
        self.flush_output()?;
        self.announce_window()?;
        Ok(self.check_closed(now))
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    fn advertised_window(&self) -> u16 {
        self.receiver.advertised_window(self.host.buffer_space())
    }

    /// Stamp queued segments with the current ackno/window and send them.
    fn transmit_queued(&mut self) -> Result<(), Error> {
        if self.sender.output_queue_len() == 0 {
            return Ok(());
        }
        let ackno = self.receiver.ack_number();
        let window = self.advertised_window();
        self.last_advertised = window;

        for out in self.sender.drain_output() {
            let flags = if out.fin {
                Flags::ACK | Flags::FIN
            } else {
                Flags::ACK
            };
            let segment = Segment {
                seqno: out.seqno,
                ackno,
                flags,
                window,
                payload: out.payload,
            };
            self.host.send(&segment.encode()).map_err(Error::Send)?;

            self.stats.segments_sent += 1;
            match out.kind {
                OutputKind::Original => self.stats.bytes_sent += segment.payload.len() as u64,
                OutputKind::Retransmit { retries } => {
                    self.stats.retransmissions += 1;
                    trace!(conn = %self.id, seqno = segment.seqno, retries, "resent");
                }
                OutputKind::Probe => self.stats.probes_sent += 1,
            }
        }
        Ok(())
    }

    fn send_ack(&mut self) -> Result<(), Error> {
        let window = self.advertised_window();
        self.last_advertised = window;
        let ack = Segment::ack(self.sender.next_seqno(), self.receiver.ack_number(), window);
        self.host.send(&ack.encode()).map_err(Error::Send)?;
        self.stats.segments_sent += 1;
        Ok(())
    }

    /// Hand buffered in-order bytes to the sink and signal end-of-stream once
    /// the peer's FIN has been reached.
    fn flush_output(&mut self) -> Result<(), Error> {
        while !self.receiver.output().is_empty() {
            let space = self.host.buffer_space();
            if space == 0 {
                break;
            }
            let chunk = &self.receiver.output()[..space.min(self.receiver.output().len())];
            let accepted = self.host.deliver_output(chunk).map_err(Error::Output)?;
            if accepted == 0 {
                break;
            }
            let accepted = accepted.min(chunk.len());
            self.receiver.consume(accepted);
            self.stats.bytes_delivered += accepted as u64;
        }

        if self.receiver.take_eof() {
            debug!(conn = %self.id, delivered = self.stats.bytes_delivered, "end of output");
            self.host.end_of_output();
        }
        Ok(())
    }

    /// Send a window update if the last advertisement was below one segment
    /// and the window has since reopened to at least that much.
    fn announce_window(&mut self) -> Result<(), Error> {
        let threshold = self.config.max_payload.min(self.config.window as usize) as u16;
        let window = self.advertised_window();
        if self.last_advertised < threshold && window >= threshold {
            trace!(conn = %self.id, window, "window update");
            self.send_ack()?;
        }
        Ok(())
    }

    /// Start lingering (or close outright) once both directions are done.
    fn check_closed(&mut self, now: Instant) -> Disposition {
        if self.linger_until.is_some() {
            return Disposition::Keep;
        }
        if !(self.sender.fin_acked() && self.receiver.is_finished()) {
            return Disposition::Keep;
        }
        if self.config.linger.is_zero() {
            return Disposition::Close;
        }
        debug!(conn = %self.id, linger = ?self.config.linger, "close handshake complete, lingering");
        self.linger_until = Some(now + self.config.linger);
        Disposition::Keep
    }

    /// Give up the host handle for release.
    pub(crate) fn into_host(self) -> H {
        self.host
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        match (self.sender.fin_sent(), self.receiver.remote_fin()) {
            (false, false) => ConnectionState::Open,
            (true, false) => ConnectionState::LocalFinSent,
            (false, true) => ConnectionState::RemoteFinReceived,
            (true, true) => ConnectionState::Closing,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Deadline after which the timer destroys a fully closed connection.
    pub fn linger_deadline(&self) -> Option<Instant> {
        self.linger_until
    }
}
