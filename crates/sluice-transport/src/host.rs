//! # Host Interface
//!
//! Everything the engine needs from the outside world for one connection:
//! the datagram path to the peer, the input source, the output sink and the
//! underlying connection resource. One `Host` value is moved into each
//! connection at creation and released exactly once when it is destroyed.

use std::io;

/// Result of polling the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// `n` bytes were written to the buffer; 0 means nothing is available now.
    Data(usize),
    /// The source is exhausted; no further data will follow.
    Eof,
}

/// Per-connection collaborator supplied by the host runtime.
///
/// None of these calls may block. An `Err` from `send`, `poll_input` or
/// `deliver_output` is fatal for the connection.
pub trait Host {
    /// Best-effort transmission of one encoded segment.
    fn send(&mut self, segment: &[u8]) -> io::Result<()>;

    /// Pull up to `buf.len()` bytes from the input source.
    fn poll_input(&mut self, buf: &mut [u8]) -> io::Result<Input>;

    /// Free capacity of the output sink in bytes.
    fn buffer_space(&self) -> usize;

    /// Push bytes to the output sink, returning how many it accepted.
    fn deliver_output(&mut self, data: &[u8]) -> io::Result<usize>;

    /// The peer closed its direction and every byte has been delivered.
    fn end_of_output(&mut self) {}

    /// Release the underlying connection resource.
    fn release(self)
    where
        Self: Sized;
}
