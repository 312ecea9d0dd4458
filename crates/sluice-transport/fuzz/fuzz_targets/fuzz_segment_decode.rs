#![no_main]

use libfuzzer_sys::fuzz_target;
use sluice_transport::wire::Segment;

/// Fuzz the segment decoder with arbitrary datagrams.
///
/// Anything that decodes must re-encode to the exact same bytes: the length
/// and checksum fields are fully determined by the other fields.
fuzz_target!(|data: &[u8]| {
    if let Ok(segment) = Segment::decode(data) {
        assert_eq!(&segment.encode()[..], data);
    }
});
