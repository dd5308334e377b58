// Session configuration: defaults from the original tool, then environment
// overrides, then an optional YAML override file.
use anyhow::{Context, Result};
use mqprobe_transport::Qos;
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);
pub const DEFAULT_PAYLOAD_SIZE: usize = 256;
pub const DEFAULT_FREQUENCY_HZ: u32 = 1;
pub const DEFAULT_MESSAGE_COUNT: u32 = 1000;
pub const DEFAULT_SAMPLE_CAPACITY: usize = 10_000;
pub const DEFAULT_STORE_PATH: &str = ":memory:";

/// Knobs for one producer or consumer session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub keepalive: Duration,
    pub topic: String,
    pub qos: Qos,
    pub payload_size: usize,
    pub frequency_hz: u32,
    pub message_count: u32,
    /// Independent probe streams one consumer services; it disconnects after
    /// observing this many end-of-stream sentinels.
    pub expected_streams: u32,
    pub sample_capacity: usize,
    pub store_path: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct SessionConfigOverride {
    host: Option<String>,
    port: Option<u16>,
    keepalive_secs: Option<u64>,
    qos: Option<u8>,
    payload_size: Option<usize>,
    frequency_hz: Option<u32>,
    message_count: Option<u32>,
    expected_streams: Option<u32>,
    sample_capacity: Option<usize>,
    store_path: Option<String>,
}

impl SessionConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            keepalive: DEFAULT_KEEPALIVE,
            topic: topic.into(),
            qos: Qos::AT_MOST_ONCE,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            message_count: DEFAULT_MESSAGE_COUNT,
            expected_streams: 1,
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            store_path: DEFAULT_STORE_PATH.to_string(),
        }
    }

    /// Layer environment and optional YAML overrides on top of the current
    /// values, then validate the result.
    pub fn finalize(mut self, config_path: Option<&str>) -> Result<Self> {
        self.apply_env()?;
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("MQPROBE_SESSION_CONFIG").ok());
        if let Some(path) = override_path.as_deref() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read session config: {path}"))?;
            let override_cfg: SessionConfigOverride =
                serde_yaml::from_str(&contents).context("parse session config yaml")?;
            override_cfg.apply(&mut self)?;
        }
        self.validate()
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("MQPROBE_HOST") {
            self.host = value;
        }
        if let Some(value) = read_env::<u16>("MQPROBE_PORT") {
            self.port = value;
        }
        if let Some(value) = read_env::<u64>("MQPROBE_KEEPALIVE_SECS") {
            self.keepalive = Duration::from_secs(value);
        }
        if let Some(value) = read_env::<u8>("MQPROBE_QOS") {
            self.qos = Qos::new(value).context("MQPROBE_QOS")?;
        }
        if let Some(value) = read_env::<usize>("MQPROBE_PAYLOAD_SIZE") {
            self.payload_size = value;
        }
        if let Some(value) = read_env::<u32>("MQPROBE_FREQUENCY_HZ") {
            self.frequency_hz = value;
        }
        if let Some(value) = read_env::<u32>("MQPROBE_MESSAGE_COUNT") {
            self.message_count = value;
        }
        if let Some(value) = read_env::<u32>("MQPROBE_EXPECTED_STREAMS") {
            self.expected_streams = value;
        }
        if let Some(value) = read_env::<usize>("MQPROBE_SAMPLE_CAPACITY") {
            self.sample_capacity = value;
        }
        if let Ok(value) = std::env::var("MQPROBE_STORE_PATH") {
            self.store_path = value;
        }
        Ok(())
    }

    fn validate(mut self) -> Result<Self> {
        anyhow::ensure!(!self.topic.is_empty(), "topic name must be supplied");
        anyhow::ensure!(
            self.payload_size >= mqprobe_wire::HEADER_LEN,
            "payload size {} is below the probe header size {}",
            self.payload_size,
            mqprobe_wire::HEADER_LEN
        );
        if self.expected_streams < 1 {
            // Matches the original's handling: warn and assume one stream.
            warn!(
                expected_streams = self.expected_streams,
                "there must be at least one probe stream, assuming 1"
            );
            self.expected_streams = 1;
        }
        Ok(self)
    }
}

impl SessionConfigOverride {
    fn apply(&self, config: &mut SessionConfig) -> Result<()> {
        if let Some(value) = &self.host {
            config.host = value.clone();
        }
        if let Some(value) = self.port {
            config.port = value;
        }
        if let Some(value) = self.keepalive_secs {
            config.keepalive = Duration::from_secs(value);
        }
        if let Some(value) = self.qos {
            config.qos = Qos::new(value).context("qos override")?;
        }
        if let Some(value) = self.payload_size {
            config.payload_size = value;
        }
        if let Some(value) = self.frequency_hz {
            config.frequency_hz = value;
        }
        if let Some(value) = self.message_count {
            config.message_count = value;
        }
        if let Some(value) = self.expected_streams {
            config.expected_streams = value;
        }
        if let Some(value) = self.sample_capacity {
            config.sample_capacity = value;
        }
        if let Some(value) = &self.store_path {
            config.store_path = value.clone();
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_tool() {
        let config = SessionConfig::new("probes");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.keepalive, Duration::from_secs(10));
        assert_eq!(config.payload_size, 256);
        assert_eq!(config.frequency_hz, 1);
        assert_eq!(config.message_count, 1000);
        assert_eq!(config.expected_streams, 1);
        assert_eq!(config.sample_capacity, 10_000);
        assert_eq!(config.store_path, ":memory:");
    }

    #[test]
    fn validate_rejects_undersized_payloads() {
        let mut config = SessionConfig::new("probes");
        config.payload_size = mqprobe_wire::HEADER_LEN - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_an_empty_topic() {
        let config = SessionConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_expected_streams_is_clamped_to_one() {
        let mut config = SessionConfig::new("probes");
        config.expected_streams = 0;
        let config = config.validate().expect("validate");
        assert_eq!(config.expected_streams, 1);
    }

    #[test]
    fn yaml_override_wins_over_current_values() {
        let mut config = SessionConfig::new("probes");
        let override_cfg: SessionConfigOverride =
            serde_yaml::from_str("frequency_hz: 50\nqos: 1\n").expect("yaml");
        override_cfg.apply(&mut config).expect("apply");
        assert_eq!(config.frequency_hz, 50);
        assert_eq!(config.qos.level(), 1);
    }
}
