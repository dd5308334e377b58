// Decode against hand-built buffers to pin the header layout.
use mqprobe_common::Timestamp;
use mqprobe_wire::{decode, FILLER, HEADER_LEN};

fn build_probe(seq: u64, sec: i64, usec: i64, payload_size: usize) -> Vec<u8> {
    assert!(payload_size >= HEADER_LEN);
    let mut buf = vec![FILLER; payload_size];
    buf[0..8].copy_from_slice(&seq.to_ne_bytes());
    buf[8..16].copy_from_slice(&sec.to_ne_bytes());
    buf[16..24].copy_from_slice(&usec.to_ne_bytes());
    buf
}

#[test]
fn header_fields_sit_at_fixed_offsets() {
    let buf = build_probe(9, 1_700_000_000, 250_000, 256);
    let probe = decode(&buf).expect("decode");
    assert_eq!(probe.seq, 9);
    assert_eq!(
        probe.tx_time,
        Timestamp {
            sec: 1_700_000_000,
            usec: 250_000,
        }
    );
}

#[test]
fn trailing_filler_does_not_affect_the_header() {
    let small = build_probe(3, 11, 12, HEADER_LEN);
    let large = build_probe(3, 11, 12, 1024);
    assert_eq!(decode(&small).expect("small"), decode(&large).expect("large"));
}
