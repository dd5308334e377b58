// Harness store-consumer: one SQLite-backed consumer servicing several
// independent probe streams over the in-process loopback transport. Each
// stream publishes on `<topic>/<index>`; the consumer subscribes to the
// `<topic>/#` subtree and disconnects after one sentinel per stream.
use anyhow::Result;
use clap::Parser;
use mqprobe_session::{ConsumerSession, ProducerSession, SessionConfig};
use mqprobe_stats::StatsStore;
use mqprobe_transport::{LoopbackHub, Qos, Transport};
use mqprobe_test_harness::{client_id, init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "store-consumer")]
#[command(about = "SQLite-backed multi-stream probe consumer for mqprobe")]
struct Args {
    /// Broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, default_value = "1883")]
    port: u16,

    /// Topic name prefix
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

    /// Number of independent probe streams
    #[arg(long, default_value = "1")]
    streams: u32,

    /// SQLite database path (":memory:" for a run-scoped store)
    #[arg(long, default_value = ":memory:")]
    db: String,

    /// Optional YAML session config override file
    #[arg(long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(client_id = %client_id(), "starting store-consumer harness");

    let filter = format!("{}/#", args.topic);
    let mut config = SessionConfig::new(&filter);
    config.host = args.host;
    config.port = args.port;
    config.qos = Qos::new(args.qos)?;
    config.payload_size = args.payload_size;
    config.frequency_hz = args.frequency;
    config.message_count = args.count;
    config.expected_streams = args.streams;
    config.store_path = args.db;
    let config = config.finalize(args.config.as_deref())?;

    let hub = LoopbackHub::new();
    let mut consumer_endpoint = hub.endpoint();
    consumer_endpoint.connect(&config.host, config.port, config.keepalive)?;
    consumer_endpoint.subscribe(&config.topic, config.qos)?;

    for stream in 0..config.expected_streams {
        let mut stream_config = config.clone();
        stream_config.topic = format!("{}/{}", args.topic, stream);
        let mut producer = ProducerSession::new(hub.endpoint(), stream_config);
        producer.run()?;
    }

    let store = StatsStore::open(&config.store_path)?;
    let mut session = ConsumerSession::new(consumer_endpoint, store, config);
    session.run()?;
    info!(
        received = session.received(),
        dropped = session.dropped(),
        "store-consumer harness completed"
    );
    Ok(())
}
