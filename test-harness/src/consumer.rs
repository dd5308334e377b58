// Harness consumer: runs one bounded-accumulator measurement round over the
// in-process loopback transport. The requested number of producer streams is
// driven first; the consumer then drains them and prints its report.
use anyhow::Result;
use clap::Parser;
use mqprobe_session::{ConsumerSession, ProducerSession, SessionConfig};
use mqprobe_stats::BoundedAccumulator;
use mqprobe_transport::{LoopbackHub, Qos, Transport};
use mqprobe_test_harness::{client_id, init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "consumer")]
#[command(about = "Bounded-accumulator probe consumer for mqprobe")]
struct Args {
    /// Broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, default_value = "1883")]
    port: u16,

    /// Topic name
    #[arg(short, long)]
    topic: String,

    /// QoS level (0-2)
    #[arg(short, long, default_value = "0")]
    qos: u8,

    /// Probe payload size in bytes
    #[arg(short = 's', long, default_value = "256")]
    payload_size: usize,

    /// Publish frequency in Hz (0 = unpaced)
    #[arg(short, long, default_value = "1")]
    frequency: u32,

    /// Number of probes per stream
    #[arg(short = 'n', long, default_value = "1000")]
    count: u32,

    /// Maximum number of samples to accumulate
    #[arg(long, default_value = "10000")]
    max_samples: usize,

    /// Optional YAML session config override file
    #[arg(long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(client_id = %client_id(), "starting consumer harness");

    let mut config = SessionConfig::new(&args.topic);
    config.host = args.host;
    config.port = args.port;
    config.qos = Qos::new(args.qos)?;
    config.payload_size = args.payload_size;
    config.frequency_hz = args.frequency;
    config.message_count = args.count;
    config.sample_capacity = args.max_samples;
    let config = config.finalize(args.config.as_deref())?;

    let hub = LoopbackHub::new();
    // Subscribe before the producer runs so the hub queues every probe.
    let mut consumer_endpoint = hub.endpoint();
    consumer_endpoint.connect(&config.host, config.port, config.keepalive)?;
    consumer_endpoint.subscribe(&config.topic, config.qos)?;

    let mut producer = ProducerSession::new(hub.endpoint(), config.clone());
    producer.run()?;

    let sink = BoundedAccumulator::new(config.sample_capacity);
    let mut session = ConsumerSession::new(consumer_endpoint, sink, config);
    session.run()?;
    info!(
        received = session.received(),
        dropped = session.dropped(),
        delay_samples = session.sink().delay_count(),
        jitter_samples = session.sink().jitter_count(),
        "consumer harness completed"
    );
    Ok(())
}
