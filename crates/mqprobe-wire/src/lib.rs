// Fixed-layout probe message codec.
//
// A probe buffer is {seq: u64, tx_sec: i64, tx_usec: i64, filler...}. Fields
// are stamped in native byte order: producer and consumer are assumed to
// share endianness and padding, exactly as the measurement convention
// requires. This is a documented portability caveat, not something the codec
// papers over with a wire order.
use bytes::Buf;
use mqprobe_common::Timestamp;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("payload size {size} is below the probe header size {HEADER_LEN}")]
    PayloadTooSmall { size: usize },
    #[error("buffer of {0} bytes is shorter than the probe header")]
    Short(usize),
    #[error("zero-length end-of-stream sentinel is not a probe")]
    Sentinel,
    #[error(transparent)]
    Clock(#[from] mqprobe_common::Error),
}

/// Encoded header size: sequence id plus seconds plus microseconds.
pub const HEADER_LEN: usize = 8 + 8 + 8;

/// Byte used to pad the probe out to its fixed session size.
pub const FILLER: u8 = b't';

/// Decoded probe header: sequence id and embedded transmit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub seq: u64,
    pub tx_time: Timestamp,
}

impl fmt::Display for Probe {
    // Dump form used by debug traces: `[id] sec.usec`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}.{}", self.seq, self.tx_time.sec, self.tx_time.usec)
    }
}

// A zero-length payload is the reserved "producer finished" sentinel.
pub fn is_sentinel(payload: &[u8]) -> bool {
    payload.is_empty()
}

// Read a probe header without mutating the buffer. Rejects the sentinel and
// anything shorter than the header rather than reading out of bounds.
pub fn decode(payload: &[u8]) -> Result<Probe> {
    if payload.is_empty() {
        return Err(Error::Sentinel);
    }
    if payload.len() < HEADER_LEN {
        return Err(Error::Short(payload.len()));
    }
    let mut buf = payload;
    let seq = buf.get_u64_ne();
    let sec = buf.get_i64_ne();
    let usec = buf.get_i64_ne();
    Ok(Probe {
        seq,
        tx_time: Timestamp { sec, usec },
    })
}

/// Reusable probe buffer stamped fresh for every send.
///
/// The buffer is allocated once per session; `renew` overwrites the header
/// with the next sequence id (starting at 1) and the current wall-clock time,
/// and pads the remainder with [`FILLER`].
///
/// ```
/// use mqprobe_wire::{decode, ProbeWriter, HEADER_LEN};
///
/// let mut writer = ProbeWriter::new(HEADER_LEN + 8).expect("writer");
/// let probe = decode(writer.renew().expect("renew")).expect("decode");
/// assert_eq!(probe.seq, 1);
/// let probe = decode(writer.renew().expect("renew")).expect("decode");
/// assert_eq!(probe.seq, 2);
/// ```
#[derive(Debug)]
pub struct ProbeWriter {
    buf: Vec<u8>,
    next_seq: u64,
}

impl ProbeWriter {
    pub fn new(payload_size: usize) -> Result<Self> {
        if payload_size < HEADER_LEN {
            return Err(Error::PayloadTooSmall { size: payload_size });
        }
        Ok(Self {
            buf: vec![0; payload_size],
            next_seq: 1,
        })
    }

    pub fn payload_size(&self) -> usize {
        self.buf.len()
    }

    // Stamp the buffer with the next id and the current time. The sequence
    // counter only advances on success, so a clock failure skips the send
    // without burning an id.
    pub fn renew(&mut self) -> Result<&[u8]> {
        let tx_time = Timestamp::now()?;
        self.buf[0..8].copy_from_slice(&self.next_seq.to_ne_bytes());
        self.buf[8..16].copy_from_slice(&tx_time.sec.to_ne_bytes());
        self.buf[16..24].copy_from_slice(&tx_time.usec.to_ne_bytes());
        self.buf[HEADER_LEN..].fill(FILLER);
        self.next_seq += 1;
        Ok(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_then_decode_recovers_id_and_time() {
        let before = Timestamp::now().expect("now");
        let mut writer = ProbeWriter::new(64).expect("writer");
        let probe = decode(writer.renew().expect("renew")).expect("decode");
        assert_eq!(probe.seq, 1);
        assert!(probe.tx_time.total_usec() >= before.total_usec());
    }

    #[test]
    fn successive_renews_yield_strictly_increasing_ids() {
        let mut writer = ProbeWriter::new(HEADER_LEN).expect("writer");
        for expected in 1..=5u64 {
            let probe = decode(writer.renew().expect("renew")).expect("decode");
            assert_eq!(probe.seq, expected);
        }
    }

    #[test]
    fn filler_pads_beyond_the_header() {
        let mut writer = ProbeWriter::new(HEADER_LEN + 4).expect("writer");
        let payload = writer.renew().expect("renew");
        assert_eq!(payload.len(), HEADER_LEN + 4);
        assert!(payload[HEADER_LEN..].iter().all(|&b| b == FILLER));
    }

    #[test]
    fn rejects_payload_below_header_size() {
        let err = ProbeWriter::new(HEADER_LEN - 1).expect_err("too small");
        assert!(matches!(err, Error::PayloadTooSmall { size } if size == HEADER_LEN - 1));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = decode(&[0u8; HEADER_LEN - 1]).expect_err("short");
        assert!(matches!(err, Error::Short(len) if len == HEADER_LEN - 1));
    }

    #[test]
    fn decode_never_treats_the_sentinel_as_a_probe() {
        assert!(is_sentinel(&[]));
        let err = decode(&[]).expect_err("sentinel");
        assert!(matches!(err, Error::Sentinel));
    }

    #[test]
    fn display_dumps_id_and_txtime() {
        let probe = Probe {
            seq: 42,
            tx_time: Timestamp { sec: 7, usec: 125 },
        };
        assert_eq!(probe.to_string(), "[42] 7.125");
    }
}
