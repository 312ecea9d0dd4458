//! # Engine
//!
//! Owns the connection registry and exposes the entry points the host event
//! loop drives: create, input-ready, segment-received, output-ready, the
//! periodic timer tick, and destroy. Every entry point runs to completion
//! without blocking.
//!
//! Teardown happens here and only here. A pipeline that hits a fatal error or
//! completes the close handshake reports it back; the engine then removes the
//! connection from the registry, releases its host handle and records an
//! [`EngineEvent::Closed`].

use std::io;

use quanta::{Clock, Instant};
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, Disposition};
use crate::error::Error;
use crate::host::Host;
use crate::registry::{ConnectionId, Registry};
use crate::stats::ConnectionStats;

// ─── Events ─────────────────────────────────────────────────────────────────

/// Why a connection was destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Both FINs exchanged and acknowledged, output drained.
    Completed,
    /// A segment or probe went unacknowledged past the retry ceiling.
    RetriesExhausted { seqno: u32, retries: u32 },
    /// The host reported an I/O error.
    Fatal(String),
    /// Destroyed on request by the host.
    Aborted,
}

impl CloseReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, CloseReason::Completed | CloseReason::Aborted)
    }
}

impl From<Error> for CloseReason {
    fn from(err: Error) -> Self {
        match err {
            Error::RetriesExhausted { seqno, retries } => {
                CloseReason::RetriesExhausted { seqno, retries }
            }
            other => CloseReason::Fatal(other.to_string()),
        }
    }
}

/// Events produced by the engine, drained with [`Engine::drain_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A connection was destroyed and its host handle released.
    Closed {
        id: ConnectionId,
        reason: CloseReason,
        stats: ConnectionStats,
    },
}

// ─── Engine ─────────────────────────────────────────────────────────────────

/// Registry of live connections plus the entry points that drive them.
pub struct Engine<H: Host> {
    registry: Registry<Connection<H>>,
    config: ConnectionConfig,
    clock: Clock,
    events: Vec<EngineEvent>,
}

impl<H: Host> Engine<H> {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_clock(config, Clock::new())
    }

    /// Engine reading time from `clock` (use `Clock::mock()` in tests).
    pub fn with_clock(config: ConnectionConfig, clock: Clock) -> Self {
        Engine {
            registry: Registry::new(),
            config,
            clock,
            events: Vec::new(),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Register a connection for an established host handle using the
    /// engine's default configuration.
    pub fn create(&mut self, host: io::Result<H>) -> Result<ConnectionId, Error> {
        self.create_with_config(host, self.config.clone())
    }

    /// Register a connection with its own configuration. A failed
    /// establishment or an invalid configuration produces no connection.
    pub fn create_with_config(
        &mut self,
        host: io::Result<H>,
        config: ConnectionConfig,
    ) -> Result<ConnectionId, Error> {
        let host = host.map_err(Error::Establish)?;
        if let Err(err) = config.validate() {
            host.release();
            return Err(err);
        }

        let id = self
            .registry
            .insert_with(|id| Connection::new(id, host, config));
        debug!(conn = %id, live = self.registry.len(), "connection created");
        Ok(id)
    }

    /// Tear a connection down on request. Returns `false` if `id` is not live.
    pub fn destroy(&mut self, id: ConnectionId) -> bool {
        self.teardown(id, CloseReason::Aborted)
    }

    // ─── Entry Points ────────────────────────────────────────────────────

    /// The host's input source has data (or reached end-of-input).
    pub fn on_input_ready(&mut self, id: ConnectionId) {
        self.dispatch(id, |conn, now| conn.on_input(now));
    }

    /// A datagram arrived for `id`.
    pub fn on_segment(&mut self, id: ConnectionId, datagram: &[u8]) {
        self.dispatch(id, |conn, now| conn.on_segment(datagram, now));
    }

    /// The host's output sink has room again.
    pub fn on_output_ready(&mut self, id: ConnectionId) {
        self.dispatch(id, |conn, now| conn.on_output(now));
    }

    /// Periodic timer: retransmissions, probes and linger expiry for every
    /// live connection.
    pub fn on_tick(&mut self) {
        // Snapshot: teardown below removes entries while we iterate.
        for id in self.registry.ids() {
            self.dispatch(id, |conn, now| conn.on_tick(now));
        }
    }

    fn dispatch<F>(&mut self, id: ConnectionId, pipeline: F)
    where
        F: FnOnce(&mut Connection<H>, Instant) -> Result<Disposition, Error>,
    {
        let now = self.clock.now();
        let Some(conn) = self.registry.get_mut(id) else {
            trace!(conn = %id, "event for unknown connection");
            return;
        };
        match pipeline(conn, now) {
            Ok(Disposition::Keep) => {}
            Ok(Disposition::Close) => {
                self.teardown(id, CloseReason::Completed);
            }
            Err(err) => {
                self.teardown(id, CloseReason::from(err));
            }
        }
    }

    fn teardown(&mut self, id: ConnectionId, reason: CloseReason) -> bool {
        let Some(conn) = self.registry.remove(id) else {
            return false;
        };
        let stats = conn.stats().clone();
        if reason.is_clean() {
            debug!(
                conn = %id,
                ?reason,
                sent = stats.bytes_sent,
                delivered = stats.bytes_delivered,
                "connection closed"
            );
        } else {
            warn!(
                conn = %id,
                ?reason,
                retransmissions = stats.retransmissions,
                "connection dead"
            );
        }
        conn.into_host().release();
        self.events.push(EngineEvent::Closed { id, reason, stats });
        true
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Drain teardown events accumulated since the last call.
    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain(..)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection<H>> {
        self.registry.get(id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registry.contains(id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}
