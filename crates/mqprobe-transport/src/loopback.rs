// In-process loopback transport.
//
// A `LoopbackHub` plays the broker: it owns every endpoint's subscription
// list and event queue, and `publish` fans a message out synchronously to
// each matching subscriber. Endpoints created from the same hub therefore
// see each other's messages without any network in between, which is exactly
// what the integration tests and local runs need.
use crate::{Error, Qos, Result, Transport, TransportEvent};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct Endpoint {
    subscriptions: Vec<String>,
    queue: VecDeque<TransportEvent>,
}

#[derive(Debug, Default)]
struct HubInner {
    endpoints: Vec<Endpoint>,
}

/// Shared in-process "broker" that loopback endpoints attach to.
///
/// ```
/// use mqprobe_transport::{LoopbackHub, Qos, Transport, TransportEvent};
/// use std::time::Duration;
///
/// let hub = LoopbackHub::new();
/// let mut producer = hub.endpoint();
/// let mut consumer = hub.endpoint();
/// producer.connect("localhost", 1883, Duration::from_secs(10)).expect("connect");
/// consumer.connect("localhost", 1883, Duration::from_secs(10)).expect("connect");
/// consumer.poll_once(Duration::ZERO).expect("poll"); // drains the connect ack
/// consumer.subscribe("probes", Qos::AT_MOST_ONCE).expect("subscribe");
/// producer.publish("probes", b"payload", Qos::AT_MOST_ONCE, false).expect("publish");
/// let event = consumer.poll_once(Duration::ZERO).expect("poll").expect("event");
/// assert!(matches!(event, TransportEvent::Message { .. }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    // Attach a new endpoint; it stays inert until its `connect` call.
    pub fn endpoint(&self) -> LoopbackTransport {
        let mut inner = self.lock();
        inner.endpoints.push(Endpoint::default());
        LoopbackTransport {
            hub: self.clone(),
            index: inner.endpoints.len() - 1,
            connected: false,
        }
    }

    // Lock poisoning only matters if another holder panicked mid-update;
    // the queues stay usable, so keep going with the inner value.
    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Topic filter match: exact name, a bare "#", or a "prefix/#" subtree.
fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == topic || filter == "#" {
        return true;
    }
    filter
        .strip_suffix("/#")
        .is_some_and(|prefix| topic.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/') || rest.is_empty()))
}

/// One endpoint of the in-process loopback transport.
#[derive(Debug)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
    index: usize,
    connected: bool,
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, host: &str, port: u16, _keepalive: Duration) -> Result<()> {
        debug!(host, port, "loopback connect");
        self.connected = true;
        let mut inner = self.hub.lock();
        inner.endpoints[self.index]
            .queue
            .push_back(TransportEvent::Connected { reason_code: 0 });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: Qos) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        debug!(topic, "loopback subscribe");
        let mut inner = self.hub.lock();
        inner.endpoints[self.index]
            .subscriptions
            .push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], _qos: Qos, _retain: bool) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let payload = Bytes::copy_from_slice(payload);
        let mut inner = self.hub.lock();
        for endpoint in &mut inner.endpoints {
            if endpoint
                .subscriptions
                .iter()
                .any(|filter| topic_matches(filter, topic))
            {
                endpoint.queue.push_back(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    fn poll_once(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut inner = self.hub.lock();
        Ok(inner.endpoints[self.index].queue.pop_front())
    }

    fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.connected = false;
        let mut inner = self.hub.lock();
        let endpoint = &mut inner.endpoints[self.index];
        endpoint.subscriptions.clear();
        endpoint.queue.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_pair() -> (LoopbackTransport, LoopbackTransport) {
        let hub = LoopbackHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();
        a.connect("localhost", 1883, Duration::from_secs(10))
            .expect("connect a");
        b.connect("localhost", 1883, Duration::from_secs(10))
            .expect("connect b");
        (a, b)
    }

    #[test]
    fn connect_queues_an_accepted_ack() {
        let (mut a, _b) = connected_pair();
        let event = a.poll_once(Duration::ZERO).expect("poll").expect("event");
        assert_eq!(event, TransportEvent::Connected { reason_code: 0 });
    }

    #[test]
    fn publish_reaches_matching_subscribers_only() {
        let (mut producer, mut consumer) = connected_pair();
        consumer.poll_once(Duration::ZERO).expect("ack");
        consumer.subscribe("probes/a", Qos::AT_MOST_ONCE).expect("subscribe");
        producer
            .publish("probes/a", b"one", Qos::AT_MOST_ONCE, false)
            .expect("publish");
        producer
            .publish("probes/b", b"two", Qos::AT_MOST_ONCE, false)
            .expect("publish");
        let event = consumer.poll_once(Duration::ZERO).expect("poll").expect("event");
        assert_eq!(
            event,
            TransportEvent::Message {
                topic: "probes/a".to_string(),
                payload: Bytes::from_static(b"one"),
            }
        );
        assert!(consumer.poll_once(Duration::ZERO).expect("poll").is_none());
    }

    #[test]
    fn subtree_filter_collects_every_stream() {
        let (mut producer, mut consumer) = connected_pair();
        consumer.poll_once(Duration::ZERO).expect("ack");
        consumer.subscribe("probes/#", Qos::AT_MOST_ONCE).expect("subscribe");
        producer
            .publish("probes/a", b"one", Qos::AT_MOST_ONCE, false)
            .expect("publish");
        producer
            .publish("probes/b", b"two", Qos::AT_MOST_ONCE, false)
            .expect("publish");
        let mut topics = Vec::new();
        while let Some(TransportEvent::Message { topic, .. }) =
            consumer.poll_once(Duration::ZERO).expect("poll")
        {
            topics.push(topic);
        }
        assert_eq!(topics, ["probes/a", "probes/b"]);
    }

    #[test]
    fn operations_require_a_connection() {
        let hub = LoopbackHub::new();
        let mut endpoint = hub.endpoint();
        assert!(matches!(
            endpoint.subscribe("t", Qos::AT_MOST_ONCE),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            endpoint.publish("t", b"x", Qos::AT_MOST_ONCE, false),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            endpoint.poll_once(Duration::ZERO),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn empty_payloads_pass_through_untouched() {
        let (mut producer, mut consumer) = connected_pair();
        consumer.poll_once(Duration::ZERO).expect("ack");
        consumer.subscribe("probes", Qos::AT_MOST_ONCE).expect("subscribe");
        producer
            .publish("probes", b"", Qos::AT_LEAST_ONCE, false)
            .expect("publish");
        let event = consumer.poll_once(Duration::ZERO).expect("poll").expect("event");
        assert_eq!(
            event,
            TransportEvent::Message {
                topic: "probes".to_string(),
                payload: Bytes::new(),
            }
        );
    }
}
