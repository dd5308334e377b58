// Harness producer: paces timestamped probes onto one topic and reports the
// achieved publish rate. Runs over the in-process loopback transport; point
// an external-transport implementation at `ProducerSession` to drive a real
// broker instead.
use anyhow::Result;
use clap::Parser;
use mqprobe_session::{ProducerSession, SessionConfig};
use mqprobe_transport::LoopbackHub;
use mqprobe_test_harness::{client_id, init_tracing};
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "producer")]
#[command(about = "Probe stream producer for mqprobe")]
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

    /// Number of probes to publish
    #[arg(short = 'n', long, default_value = "1000")]
    count: u32,

    /// Optional YAML session config override file
    #[arg(long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(client_id = %client_id(), "starting producer harness");

    let mut config = SessionConfig::new(&args.topic);
    config.host = args.host;
    config.port = args.port;
    config.qos = mqprobe_transport::Qos::new(args.qos)?;
    config.payload_size = args.payload_size;
    config.frequency_hz = args.frequency;
    config.message_count = args.count;
    let config = config.finalize(args.config.as_deref())?;

    let hub = LoopbackHub::new();
    let mut session = ProducerSession::new(hub.endpoint(), config);

    let started = Instant::now();
    session.run()?;
    let elapsed = started.elapsed();
    let rate = f64::from(session.published()) / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        published = session.published(),
        elapsed = format!("{:.2}s", elapsed.as_secs_f64()),
        rate = format!("{:.2} msg/s", rate),
        "producer harness completed"
    );
    Ok(())
}
