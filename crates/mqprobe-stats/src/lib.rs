// Statistics accumulation engines.
//
// Both engines consume decoded probes paired with their receive time and
// turn timestamp pairs into delay and jitter distributions. The bounded
// accumulator keeps everything in two pre-allocated vectors; the relational
// store persists rows in SQLite keyed by (topic, id) and reports per topic.
use mqprobe_common::Timestamp;
use mqprobe_wire::Probe;

pub mod bounded;
pub mod store;

pub use bounded::BoundedAccumulator;
pub use store::{StatsStore, TopicReport};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("sample capacity of {0} reached, dropping probe")]
    Overflow(usize),
    #[error("database error: {0}")]
    Database(#[from] sqlite::Error),
}

/// Per-message transmission delay.
///
/// |receive time - embedded transmit time| is only a true delay when both
/// clocks are aligned; across hosts it conflates delay with clock skew, a
/// limitation this tool documents rather than resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySample {
    pub id: u64,
    pub tx_delay_usec: i64,
}

/// Inter-message deltas for one consecutive probe pair.
///
/// Because the producer holds a constant send cadence, differencing two
/// consecutive pairs' deltas cancels the inter-send interval and leaves only
/// transport-induced variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterSample {
    pub from_id: u64,
    pub to_id: u64,
    pub rx_delta_usec: i64,
    pub tx_delta_usec: i64,
}

/// Seam between the consumer session and whichever engine accumulates for it.
pub trait ProbeSink {
    /// Account one received probe. Errors signal an explicit drop (for
    /// example the bounded engine hitting capacity), never silent loss.
    fn record(&mut self, topic: &str, probe: Probe, rx_time: Timestamp) -> Result<()>;

    /// Print the end-of-session report to stdout.
    fn report(&mut self) -> Result<()>;
}
