//! # Errors
//!
//! One error type for the engine. Creation reports `Establish` and `Config`;
//! the rest end the connection they occurred on.

use std::io;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// Failures surfaced by the engine. Every variant except `Config` and
/// `Establish` is fatal for the connection it occurred on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("underlying connection could not be established: {0}")]
    Establish(#[source] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("segment send failed: {0}")]
    Send(#[source] io::Error),
    #[error("output delivery failed: {0}")]
    Output(#[source] io::Error),
    #[error("input read failed: {0}")]
    Input(#[source] io::Error),
    #[error("segment {seqno} still unacknowledged after {retries} retransmissions")]
    RetriesExhausted { seqno: u32, retries: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
