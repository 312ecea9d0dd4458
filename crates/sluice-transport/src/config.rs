//! # Connection Configuration
//!
//! Protocol parameters fixed when a connection is created. Defaults are
//! stop-and-wait with a 200 ms RTO; files are TOML with every key optional.
//!
//! The linger interval defaults to the peer's whole retransmission budget,
//! `rto * (max_retries + 1)`. A connection whose final ACK is lost then stays
//! around long enough to re-ack every copy of the peer's FIN.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::Error;
use crate::wire::MAX_PAYLOAD_LEN;

/// Default payload size: fits a 1500-byte MTU after IP/UDP and segment headers.
pub const DEFAULT_MAX_PAYLOAD: usize = 1440;

pub const DEFAULT_RTO: Duration = Duration::from_millis(200);

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Time for a peer to give up on a segment: the first send plus every retry.
pub fn default_linger(rto: Duration, max_retries: u32) -> Duration {
    rto.saturating_mul(max_retries.saturating_add(1))
}

/// Raw, all-optional form as it appears in a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfigInput {
    pub max_payload: Option<usize>,
    pub rto_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub window: Option<u32>,
    pub linger_ms: Option<u64>,
    pub send_buffer: Option<usize>,
    pub reorder_capacity: Option<usize>,
}

/// Per-connection protocol parameters, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest payload carried by one segment.
    pub max_payload: usize,
    /// Age after which an unacknowledged segment is resent.
    pub rto: Duration,
    /// Retransmissions allowed per segment before the connection is dead.
    pub max_retries: u32,
    /// Initial advertised window in bytes. Also the receive buffer bound and
    /// the assumed peer window until the first acknowledgment arrives.
    pub window: u32,
    /// Delay between a completed close handshake and destruction.
    pub linger: Duration,
    /// Bytes of host input that may wait for window space.
    pub send_buffer: usize,
    /// Out-of-order segments held for reassembly; 0 drops them instead.
    pub reorder_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            rto: DEFAULT_RTO,
            max_retries: DEFAULT_MAX_RETRIES,
            window: DEFAULT_MAX_PAYLOAD as u32,
            linger: default_linger(DEFAULT_RTO, DEFAULT_MAX_RETRIES),
            send_buffer: 64 * 1024,
            reorder_capacity: 0,
        }
    }
}

impl ConnectionConfigInput {
    pub fn resolve(self) -> Result<ConnectionConfig, Error> {
        let defaults = ConnectionConfig::default();
        let rto = self.rto_ms.map(Duration::from_millis).unwrap_or(defaults.rto);
        let max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        let config = ConnectionConfig {
            max_payload: self.max_payload.unwrap_or(defaults.max_payload),
            rto,
            max_retries,
            window: self.window.unwrap_or(defaults.window),
            linger: self
                .linger_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| default_linger(rto, max_retries)),
            send_buffer: self.send_buffer.unwrap_or(defaults.send_buffer),
            reorder_capacity: self.reorder_capacity.unwrap_or(defaults.reorder_capacity),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ConnectionConfig {
    /// Recompute `linger` from the current `rto` and `max_retries`. Use after
    /// overriding either of them with struct-update syntax.
    pub fn with_derived_linger(mut self) -> Self {
        self.linger = default_linger(self.rto, self.max_retries);
        self
    }

    /// Sliding window of `segments` full-size segments.
    pub fn with_window_segments(mut self, segments: u32) -> Self {
        self.window = (self.max_payload as u32)
            .saturating_mul(segments)
            .min(u32::from(u16::MAX));
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD_LEN {
            return Err(Error::Config(format!(
                "max_payload must be within 1..={MAX_PAYLOAD_LEN}, got {}",
                self.max_payload
            )));
        }
        if self.window == 0 || self.window > u32::from(u16::MAX) {
            return Err(Error::Config(format!(
                "window must be within 1..={}, got {}",
                u16::MAX,
                self.window
            )));
        }
        if self.rto.is_zero() {
            return Err(Error::Config("rto must be non-zero".into()));
        }
        if self.send_buffer < self.max_payload {
            return Err(Error::Config(format!(
                "send_buffer ({}) must hold at least one segment ({})",
                self.send_buffer, self.max_payload
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, Error> {
        if input.trim().is_empty() {
            return Ok(ConnectionConfig::default());
        }
        let parsed: ConnectionConfigInput = toml::from_str(input)
            .map_err(|e| Error::Config(format!("invalid config TOML: {e}")))?;
        parsed.resolve()
    }

    /// Read and resolve a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
