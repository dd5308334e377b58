// Consumer session: a single-threaded poll loop feeding a stats sink.
use crate::SessionConfig;
use anyhow::{Context, Result};
use mqprobe_common::Timestamp;
use mqprobe_stats::ProbeSink;
use mqprobe_transport::{Transport, TransportEvent};
use mqprobe_wire::is_sentinel;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Consumer lifecycle. Connect failure jumps straight to `Disconnected`;
/// otherwise the session reports after the expected sentinels arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Receiving,
    Reporting,
    Disconnected,
}

/// Receives one or more probe streams and accumulates delay/jitter samples
/// into the sink until every stream has announced its end.
pub struct ConsumerSession<T: Transport, S: ProbeSink> {
    transport: T,
    sink: S,
    config: SessionConfig,
    state: SessionState,
    sentinels_seen: u32,
    received: u64,
    dropped: u64,
}

impl<T: Transport, S: ProbeSink> ConsumerSession<T, S> {
    pub fn new(transport: T, sink: S, config: SessionConfig) -> Self {
        Self {
            transport,
            sink,
            config,
            state: SessionState::Connecting,
            sentinels_seen: 0,
            received: 0,
            dropped: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run until every expected stream has finished, then report. A transport
    /// failure aborts the loop but still attempts a best-effort report so the
    /// samples gathered so far are not lost.
    pub fn run(&mut self) -> Result<()> {
        if let Err(err) = self
            .transport
            .connect(&self.config.host, self.config.port, self.config.keepalive)
        {
            // Terminal: straight from Connecting to Disconnected.
            self.state = SessionState::Disconnected;
            return Err(err).context("connect to broker");
        }
        self.transport
            .subscribe(&self.config.topic, self.config.qos)
            .context("subscribe to topic")?;
        self.state = SessionState::Subscribed;
        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            expected_streams = self.config.expected_streams,
            "starting consumer"
        );

        let outcome = self.poll_loop();

        self.state = SessionState::Reporting;
        if let Err(err) = self.sink.report() {
            error!(error = %err, "failed to print session report");
        }
        self.state = SessionState::Disconnected;
        info!(
            received = self.received,
            dropped = self.dropped,
            "consumer finished"
        );
        outcome
    }

    fn poll_loop(&mut self) -> Result<()> {
        loop {
            let event = self
                .transport
                .poll_once(POLL_TIMEOUT)
                .context("poll transport")?;
            let Some(event) = event else {
                // Quiet timeout; keep polling.
                continue;
            };
            if self.dispatch(event)? {
                return Ok(());
            }
        }
    }

    // Single dispatch point for every transport callback. Returns true once
    // the session is complete.
    fn dispatch(&mut self, event: TransportEvent) -> Result<bool> {
        match event {
            TransportEvent::Connected { reason_code: 0 } => {
                debug!("broker accepted the connection");
                self.state = SessionState::Receiving;
                Ok(false)
            }
            TransportEvent::Connected { reason_code } => {
                anyhow::bail!("broker refused the connection: reason code {reason_code}");
            }
            TransportEvent::Disconnected => {
                info!("transport disconnected");
                Ok(true)
            }
            TransportEvent::Message { topic, payload } => {
                if is_sentinel(&payload) {
                    self.sentinels_seen += 1;
                    info!(
                        sentinels = self.sentinels_seen,
                        expected = self.config.expected_streams,
                        "got zero payload message"
                    );
                    if self.sentinels_seen >= self.config.expected_streams {
                        self.transport.disconnect().context("disconnect")?;
                        return Ok(true);
                    }
                    return Ok(false);
                }
                self.consume_probe(&topic, &payload);
                Ok(false)
            }
        }
    }

    fn consume_probe(&mut self, topic: &str, payload: &[u8]) {
        let rx_time = match Timestamp::now() {
            Ok(now) => now,
            Err(err) => {
                // Never account a sample against a garbage receive time.
                error!(error = %err, "cannot read the clock, skipping probe");
                self.dropped += 1;
                return;
            }
        };
        let probe = match mqprobe_wire::decode(payload) {
            Ok(probe) => probe,
            Err(err) => {
                warn!(topic, error = %err, "rejecting malformed probe");
                self.dropped += 1;
                return;
            }
        };
        debug!(topic, probe = %probe, "probe received");
        match self.sink.record(topic, probe, rx_time) {
            Ok(()) => self.received += 1,
            Err(err) => {
                warn!(topic, seq = probe.seq, error = %err, "probe not accumulated");
                self.dropped += 1;
            }
        }
    }
}
