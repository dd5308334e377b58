// Producer session: paced publishing of timestamped probes.
use crate::SessionConfig;
use anyhow::{Context, Result};
use mqprobe_common::{Pacer, Timestamp};
use mqprobe_transport::{Qos, Transport};
use mqprobe_wire::ProbeWriter;
use std::time::Duration;
use tracing::{debug, error, info};

// One poll step per published message keeps the transport serviced; the
// paced sleep covers the rest of the inter-send interval.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Drives one bounded probe stream: stamp, publish, poll, paced sleep, and a
/// final zero-length sentinel so consumers know the stream is done.
pub struct ProducerSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    published: u32,
}

impl<T: Transport> ProducerSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            published: 0,
        }
    }

    pub fn published(&self) -> u32 {
        self.published
    }

    /// Run the whole session. A single transport failure aborts the loop; the
    /// sentinel and disconnect still run so the consumer side is not left
    /// hanging, then the failure is surfaced.
    pub fn run(&mut self) -> Result<()> {
        self.transport
            .connect(&self.config.host, self.config.port, self.config.keepalive)
            .context("connect to broker")?;
        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            payload_size = self.config.payload_size,
            frequency_hz = self.config.frequency_hz,
            message_count = self.config.message_count,
            "starting producer"
        );

        let mut writer =
            ProbeWriter::new(self.config.payload_size).context("allocate probe buffer")?;
        let pacer = Pacer::new(self.config.frequency_hz);

        let outcome = self.publish_loop(&mut writer, pacer);

        // ZERO-sized payload tells consumers this stream is finished. Sent at
        // QoS 1 regardless of the session QoS so the disconnect is not lost.
        if let Err(err) =
            self.transport
                .publish(&self.config.topic, &[], Qos::AT_LEAST_ONCE, false)
        {
            error!(error = %err, "failed to publish end-of-stream sentinel");
        }
        if let Err(err) = self.transport.disconnect() {
            debug!(error = %err, "disconnect after session");
        }
        info!(published = self.published, "producer finished");
        outcome
    }

    fn publish_loop(&mut self, writer: &mut ProbeWriter, pacer: Pacer) -> Result<()> {
        while self.published < self.config.message_count {
            let sent_at = match Timestamp::now() {
                Ok(now) => now,
                Err(err) => {
                    // Never stamp garbage; skip this send entirely.
                    error!(error = %err, "cannot read the clock, skipping send");
                    continue;
                }
            };
            let payload = match writer.renew() {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "cannot stamp probe, skipping send");
                    continue;
                }
            };
            self.transport
                .publish(&self.config.topic, payload, self.config.qos, false)
                .context("publish probe")?;
            self.published += 1;

            self.transport
                .poll_once(POLL_TIMEOUT)
                .context("poll after publish")?;

            let sleep = pacer.sleep_for(sent_at)?;
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqprobe_transport::{LoopbackHub, TransportEvent};
    use mqprobe_wire::{decode, is_sentinel};

    fn test_config(count: u32) -> SessionConfig {
        let mut config = SessionConfig::new("probes");
        config.payload_size = 32;
        config.frequency_hz = 0; // unpaced for test speed
        config.message_count = count;
        config
    }

    #[test]
    fn publishes_count_probes_then_one_sentinel() {
        let hub = LoopbackHub::new();
        let mut observer = hub.endpoint();
        observer
            .connect("localhost", 1883, Duration::from_secs(10))
            .expect("connect");
        observer.poll_once(Duration::ZERO).expect("ack");
        observer.subscribe("probes", Qos::AT_MOST_ONCE).expect("subscribe");

        let mut session = ProducerSession::new(hub.endpoint(), test_config(5));
        session.run().expect("run");
        assert_eq!(session.published(), 5);

        let mut seqs = Vec::new();
        let mut sentinels = 0;
        while let Some(event) = observer.poll_once(Duration::ZERO).expect("poll") {
            let TransportEvent::Message { payload, .. } = event else {
                continue;
            };
            if is_sentinel(&payload) {
                sentinels += 1;
            } else {
                assert_eq!(payload.len(), 32);
                seqs.push(decode(&payload).expect("decode").seq);
            }
        }
        assert_eq!(seqs, [1, 2, 3, 4, 5]);
        assert_eq!(sentinels, 1);
    }

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn connect(&mut self, _: &str, _: u16, _: Duration) -> mqprobe_transport::Result<()> {
            Err(mqprobe_transport::Error::Refused("test refusal".into()))
        }

        fn subscribe(&mut self, _: &str, _: Qos) -> mqprobe_transport::Result<()> {
            Err(mqprobe_transport::Error::NotConnected)
        }

        fn publish(&mut self, _: &str, _: &[u8], _: Qos, _: bool) -> mqprobe_transport::Result<()> {
            Err(mqprobe_transport::Error::NotConnected)
        }

        fn poll_once(
            &mut self,
            _: Duration,
        ) -> mqprobe_transport::Result<Option<TransportEvent>> {
            Err(mqprobe_transport::Error::NotConnected)
        }

        fn disconnect(&mut self) -> mqprobe_transport::Result<()> {
            Err(mqprobe_transport::Error::NotConnected)
        }
    }

    #[test]
    fn connect_failure_aborts_before_any_publish() {
        let mut session = ProducerSession::new(RefusingTransport, test_config(3));
        assert!(session.run().is_err());
        assert_eq!(session.published(), 0);
    }
}
