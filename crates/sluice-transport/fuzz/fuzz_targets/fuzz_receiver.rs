#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use sluice_transport::receiver::Receiver;
use sluice_transport::wire::Segment;
use sluice_transport::ConnectionConfig;

/// Fuzz the receiver state machine with a stream of arbitrary segments.
///
/// Input is split into 8-byte records: seqno offset, payload length, flags,
/// and whether the sink drains. The receiver must never panic, and the
/// acknowledgment number may only move forward.
fuzz_target!(|data: &[u8]| {
    let config = ConnectionConfig {
        max_payload: 64,
        window: 256,
        reorder_capacity: 8,
        ..ConnectionConfig::default()
    };
    let mut rx = Receiver::new(&config);
    let mut last_ack = rx.ack_number();

    for record in data.chunks_exact(8) {
        let offset = i16::from_be_bytes([record[0], record[1]]) as i32;
        let seqno = rx.ack_number().wrapping_add_signed(offset);
        let len = usize::from(record[2] % 65);
        let segment = if record[3] & 1 == 1 {
            Segment::fin(seqno, 1, 0)
        } else {
            Segment::data(seqno, 1, 0, Bytes::from(vec![record[4]; len]))
        };

        rx.accept(&segment);
        if record[5] & 1 == 1 {
            let n = rx.buffered_len();
            rx.consume(n);
        }
        let _ = rx.take_eof();

        let ack = rx.ack_number();
        assert!(ack.wrapping_sub(last_ack) < (1 << 31), "ack moved backwards");
        last_ack = ack;
    }
});
