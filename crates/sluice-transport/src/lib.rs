//! # sluice-transport
//!
//! Reliable, ordered byte streams over an unreliable datagram path.
//!
//! Each connection carries two independent directions. Bytes read from the
//! host's input source are cut into checksummed segments, sent within the
//! peer's advertised window, retransmitted on timeout until acknowledged, and
//! reassembled in order on the far side before being handed to the output
//! sink. Either side closes its direction with a FIN; a connection is
//! destroyed once both FINs are acknowledged and every received byte has been
//! delivered, or when the retry ceiling is exceeded.
//!
//! The crate performs no I/O of its own. The host runtime implements
//! [`Host`] for each connection and drives an [`Engine`] from a single event
//! loop.
//!
//! ## Crate structure
//!
//! - [`wire`]: Segment header layout, checksum, sequence arithmetic
//! - [`registry`]: Slab arena of live connections with generation-tagged ids
//! - [`arq`]: Unacknowledged segments, cumulative retirement, RTO expiry
//! - [`sender`]: Send state machine (segmentation, window, FIN, probes)
//! - [`receiver`]: Receive state machine (ordering, reorder buffer, output)
//! - [`connection`]: One stream bound to its host handle
//! - [`engine`]: Entry points, timer sweep and teardown
//! - [`config`]: Connection parameters, TOML loading
//! - [`stats`]: Per-connection counters

pub mod arq;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod host;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod stats;
pub mod wire;

pub use config::{ConnectionConfig, ConnectionConfigInput};
pub use connection::{Connection, ConnectionState};
pub use engine::{CloseReason, Engine, EngineEvent};
pub use error::{Error, Result};
pub use host::{Host, Input};
pub use registry::ConnectionId;
pub use stats::ConnectionStats;
pub use wire::{DecodeError, Flags, Segment};
