// SQLite-backed, topic-partitioned accumulation.
//
// One row per received probe keyed by (topic, id); reporting streams each
// topic's rows back in storage order and rebuilds the running deltas
// client-side, so interleaved multi-topic ingestion never cross-contaminates
// the jitter math. The store lives for one run only.
use crate::{Error, ProbeSink, Result};
use mqprobe_common::{diff_usec, StatsSummary, Timestamp};
use mqprobe_wire::Probe;
use sqlite::{Connection, State, Value};
use tracing::{debug, warn};

/// Database name for a run-scoped, process-local store.
pub const IN_MEMORY: &str = ":memory:";

const CREATE_SQL: &str = "CREATE TABLE stats \
     (topic text not null, \
      id integer not null, \
      tx_sec integer not null, \
      tx_usec integer not null, \
      rx_sec integer not null, \
      rx_usec integer not null, \
      CONSTRAINT pk PRIMARY KEY (topic, id))";
const INSERT_SQL: &str = "INSERT INTO stats VALUES (?, ?, ?, ?, ?, ?)";
const SELECT_TOPIC_SQL: &str =
    "SELECT id, tx_sec, tx_usec, rx_sec, rx_usec FROM stats WHERE topic = ?";
const TOPICS_SQL: &str = "SELECT topic FROM stats GROUP BY topic";
const COUNT_SQL: &str = "SELECT count(*) FROM stats";

/// Per-topic report aggregates, also printed to stdout.
#[derive(Debug, Clone, Copy)]
pub struct TopicReport {
    pub messages: u64,
    pub tx: StatsSummary,
    pub rx: StatsSummary,
}

/// Relational stats store for one consumer run.
pub struct StatsStore {
    connection: Connection,
}

impl StatsStore {
    pub fn open(path: &str) -> Result<Self> {
        let connection = Connection::open(path)?;
        connection.execute(CREATE_SQL)?;
        Ok(Self { connection })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }

    pub fn row_count(&self) -> Result<i64> {
        let mut statement = self.connection.prepare(COUNT_SQL)?;
        statement.next()?;
        Ok(statement.read::<i64, _>(0)?)
    }

    /// Distinct topics observed, in the store's natural grouping order.
    pub fn topics(&self) -> Result<Vec<String>> {
        let mut statement = self.connection.prepare(TOPICS_SQL)?;
        let mut topics = Vec::new();
        while statement.next()? == State::Row {
            topics.push(statement.read::<String, _>(0)?);
        }
        Ok(topics)
    }

    fn insert(&self, topic: &str, probe: Probe, rx_time: Timestamp) -> Result<()> {
        let mut statement = self.connection.prepare(INSERT_SQL)?;
        statement.bind::<&[Value]>(&[
            Value::String(topic.to_string()),
            Value::Integer(probe.seq as i64),
            Value::Integer(probe.tx_time.sec),
            Value::Integer(probe.tx_time.usec),
            Value::Integer(rx_time.sec),
            Value::Integer(rx_time.usec),
        ])?;
        statement.next()?;
        Ok(())
    }

    /// Stream one topic's rows in storage order and print its jitter report.
    ///
    /// Deltas need two rows and a jitter observation needs two deltas, so
    /// values start flowing from the third row of the topic.
    pub fn report_topic(&self, topic: &str) -> Result<TopicReport> {
        let mut statement = self.connection.prepare(SELECT_TOPIC_SQL)?;
        statement.bind((1, topic))?;

        let mut messages = 0u64;
        let mut tx = StatsSummary::new();
        let mut rx = StatsSummary::new();
        let mut previous: Option<(Timestamp, Timestamp)> = None;
        let mut previous_deltas: Option<(i64, i64)> = None;

        while statement.next()? == State::Row {
            let tx_time = Timestamp {
                sec: statement.read::<i64, _>(1)?,
                usec: statement.read::<i64, _>(2)?,
            };
            let rx_time = Timestamp {
                sec: statement.read::<i64, _>(3)?,
                usec: statement.read::<i64, _>(4)?,
            };
            if let Some((prev_tx, prev_rx)) = previous {
                let tx_delta = diff_usec(tx_time, prev_tx);
                let rx_delta = diff_usec(rx_time, prev_rx);
                if let Some((prev_tx_delta, prev_rx_delta)) = previous_deltas {
                    let tx_jitter = prev_tx_delta - tx_delta;
                    let rx_jitter = prev_rx_delta - rx_delta;
                    println!(" {:6} {:6} usec", tx_jitter, rx_jitter);
                    tx.observe(tx_jitter);
                    rx.observe(rx_jitter);
                }
                previous_deltas = Some((tx_delta, rx_delta));
            }
            previous = Some((tx_time, rx_time));
            messages += 1;
        }

        println!("Jitter ------------------------------------------------");
        println!(
            "TX: {} messages, {:4} / {:4} / {:6.2} usec",
            messages, tx.min, tx.max, tx.mean()
        );
        println!(
            "RX: {} messages, {:4} / {:4} / {:6.2} usec",
            messages, rx.min, rx.max, rx.mean()
        );

        Ok(TopicReport { messages, tx, rx })
    }
}

impl ProbeSink for StatsStore {
    fn record(&mut self, topic: &str, probe: Probe, rx_time: Timestamp) -> Result<()> {
        // Best-effort telemetry: a failed bind or a duplicate (topic, id)
        // skips the row and keeps the session alive.
        match self.insert(topic, probe, rx_time) {
            Ok(()) => debug!(topic, seq = probe.seq, "row stored"),
            Err(Error::Database(err)) => {
                warn!(topic, seq = probe.seq, error = %err, "row skipped");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn report(&mut self) -> Result<()> {
        for topic in self.topics()? {
            println!("'{topic}'");
            self.report_topic(&topic)?;
            println!();
        }
        Ok(())
    }
}
