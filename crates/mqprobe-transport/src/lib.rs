// Transport boundary for the measurement sessions.
//
// The pub/sub transport is an external collaborator: sessions drive it
// through the `Transport` trait and consume its callbacks as explicit
// `TransportEvent` values at a single dispatch point. The loopback module
// provides the in-process implementation used by tests and local runs.
use bytes::Bytes;
use std::time::Duration;

pub mod loopback;

pub use loopback::{LoopbackHub, LoopbackTransport};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("connection lost")]
    ConnectionLost,
    #[error("qos {0} is outside the supported 0-2 range")]
    InvalidQos(u8),
}

/// Delivery-guarantee level, carried through to the transport untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qos(u8);

impl Qos {
    pub const AT_MOST_ONCE: Qos = Qos(0);
    pub const AT_LEAST_ONCE: Qos = Qos(1);

    pub fn new(level: u8) -> Result<Self> {
        if level > 2 {
            return Err(Error::InvalidQos(level));
        }
        Ok(Self(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

/// One transport callback, surfaced as a value for the session dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    // Broker answered the connect attempt; zero means accepted.
    Connected { reason_code: u8 },
    Disconnected,
    Message { topic: String, payload: Bytes },
}

/// Blocking pub/sub transport driven one poll step at a time.
///
/// Implementations deliver events synchronously from `poll_once`; sessions
/// never observe a callback outside their own poll call, which keeps the
/// whole process single-threaded.
pub trait Transport {
    fn connect(&mut self, host: &str, port: u16, keepalive: Duration) -> Result<()>;

    fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<()>;

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool) -> Result<()>;

    /// One blocking poll step; `None` means the timeout elapsed quietly.
    fn poll_once(&mut self, timeout: Duration) -> Result<Option<TransportEvent>>;

    fn disconnect(&mut self) -> Result<()>;
}
