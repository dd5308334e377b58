// Measurement session loops built on the transport boundary.
//
// The producer paces fixed-size timestamped probes onto one topic and closes
// with a zero-length sentinel; the consumer drives a single-threaded poll
// loop, feeding every probe into its stats sink and disconnecting once the
// expected number of sentinels has arrived.
pub mod config;
pub mod consumer;
pub mod producer;

pub use config::SessionConfig;
pub use consumer::{ConsumerSession, SessionState};
pub use producer::ProducerSession;
