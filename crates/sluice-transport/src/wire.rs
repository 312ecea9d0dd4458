//! # Sluice Wire Format
//!
//! Fixed 18-byte segment header followed by an optional payload. All
//! multi-byte fields are big endian.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Acknowledgment Number                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       Length (hdr+data)       |        Flags (high 16)        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Flags (low 16, F=1 A=0)    |             Window            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Checksum           |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum is the RFC 1071 internet checksum over the whole segment with
//! the checksum field read as zero. A segment is trusted only after both the
//! checksum and the length field check out.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Header size: 4 (seqno) + 4 (ackno) + 2 (len) + 4 (flags) + 2 (window) + 2 (checksum).
pub const HEADER_SIZE: usize = 18;

/// Largest payload whose total length still fits the 16-bit `len` field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - HEADER_SIZE;

/// Byte offset of the checksum field inside the header.
const CHECKSUM_OFFSET: usize = 16;

// ─── Sequence Arithmetic ─────────────────────────────────────────────────────

/// `a < b` in 32-bit wrap-around sequence space.
///
/// Valid while the two values are less than 2^31 apart, which always holds
/// for any window a 16-bit advertisement can open.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a <= b` in 32-bit wrap-around sequence space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// Segment flag bitset. Bits other than ACK and FIN are carried (and covered
/// by the checksum) but have no meaning to the protocol.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u32);

impl Flags {
    /// The acknowledgment number is valid.
    pub const ACK: Flags = Flags(1 << 0);
    /// The sender has no more data; consumes one sequence slot.
    pub const FIN: Flags = Flags(1 << 1);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Flags::ACK) {
            names.push("ACK");
        }
        if self.contains(Flags::FIN) {
            names.push("FIN");
        }
        if names.is_empty() {
            write!(f, "Flags(-)")
        } else {
            write!(f, "Flags({})", names.join("|"))
        }
    }
}

// ─── Decode Errors ───────────────────────────────────────────────────────────

/// Reasons a datagram is rejected before any of its fields are used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram of {len} bytes is shorter than the {HEADER_SIZE}-byte header")]
    Truncated { len: usize },
    #[error("length field says {declared} bytes but {actual} were received")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { carried: u16, computed: u16 },
}

// ─── Segment ─────────────────────────────────────────────────────────────────

/// A decoded segment. `len` and `checksum` are derived on encode and checked
/// on decode, so they are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seqno: u32,
    pub ackno: u32,
    pub flags: Flags,
    /// Advertised receive capacity in bytes.
    pub window: u16,
    pub payload: Bytes,
}

impl Segment {
    /// Data segment; always carries a piggybacked acknowledgment.
    pub fn data(seqno: u32, ackno: u32, window: u16, payload: Bytes) -> Self {
        Segment {
            seqno,
            ackno,
            flags: Flags::ACK,
            window,
            payload,
        }
    }

    /// Zero-payload FIN.
    pub fn fin(seqno: u32, ackno: u32, window: u16) -> Self {
        Segment {
            seqno,
            ackno,
            flags: Flags::ACK | Flags::FIN,
            window,
            payload: Bytes::new(),
        }
    }

    /// Pure acknowledgment.
    pub fn ack(seqno: u32, ackno: u32, window: u16) -> Self {
        Segment {
            seqno,
            ackno,
            flags: Flags::ACK,
            window,
            payload: Bytes::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }

    pub fn is_fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }

    /// Sequence space consumed: payload bytes plus one for a FIN.
    pub fn seq_len(&self) -> u32 {
        self.payload.len() as u32 + u32::from(self.is_fin())
    }

    /// Value of the on-wire `len` field.
    pub fn wire_len(&self) -> u16 {
        (HEADER_SIZE + self.payload.len()) as u16
    }

    /// Serialize into network byte order with the checksum filled in.
    pub fn encode(&self) -> Bytes {
        debug_assert!(self.payload.len() <= MAX_PAYLOAD_LEN);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.seqno);
        buf.put_u32(self.ackno);
        buf.put_u16(self.wire_len());
        buf.put_u32(self.flags.bits());
        buf.put_u16(self.window);
        buf.put_u16(0);
        buf.extend_from_slice(&self.payload);

        let sum = checksum(&buf);
        buf[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&sum.to_be_bytes());
        buf.freeze()
    }

    /// Parse and verify a received datagram.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated { len: data.len() });
        }

        let mut header = &data[..HEADER_SIZE];
        let seqno = header.get_u32();
        let ackno = header.get_u32();
        let declared = header.get_u16() as usize;
        let flags = Flags::from_bits(header.get_u32());
        let window = header.get_u16();
        let carried = header.get_u16();

        if declared != data.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let computed = checksum(data);
        if computed != carried {
            return Err(DecodeError::ChecksumMismatch { carried, computed });
        }

        Ok(Segment {
            seqno,
            ackno,
            flags,
            window,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..]),
        })
    }
}

// ─── Checksum ────────────────────────────────────────────────────────────────

/// RFC 1071 internet checksum over an encoded segment, reading the checksum
/// field (bytes 16..18) as zero. Buffers shorter than a header are summed
/// whole.
pub fn checksum(segment: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    let mut words = segment.chunks_exact(2);
    for (idx, word) in words.by_ref().enumerate() {
        if idx * 2 == CHECKSUM_OFFSET {
            continue;
        }
        sum += u64::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte is padded with zero on the right.
    if let [last] = words.remainder() {
        sum += u64::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
