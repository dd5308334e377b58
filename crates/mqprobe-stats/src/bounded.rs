// Fixed-capacity in-memory accumulation with an end-of-session report.
use crate::{DelaySample, Error, JitterSample, ProbeSink, Result};
use mqprobe_common::{diff_usec, StatsSummary, Timestamp};
use mqprobe_wire::Probe;
use tracing::error;

/// Default sample capacity, matching the original tool.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded delay/jitter accumulator for one consumer session.
///
/// Both sample vectors are reserved up front; reaching capacity surfaces an
/// explicit [`Error::Overflow`] instead of growing or wrapping. If the
/// up-front reservation itself fails the accumulator logs the failure and
/// degrades to a no-op sink so the session can still drain its stream.
///
/// ```
/// use mqprobe_common::Timestamp;
/// use mqprobe_stats::{BoundedAccumulator, ProbeSink};
/// use mqprobe_wire::Probe;
///
/// let mut acc = BoundedAccumulator::new(16);
/// for seq in 1..=3 {
///     let probe = Probe { seq, tx_time: Timestamp { sec: 0, usec: seq as i64 * 100 } };
///     let rx = Timestamp { sec: 0, usec: seq as i64 * 100 + 40 };
///     acc.record("probes", probe, rx).expect("record");
/// }
/// assert_eq!(acc.delay_count(), 3);
/// assert_eq!(acc.jitter_count(), 2);
/// ```
#[derive(Debug)]
pub struct BoundedAccumulator {
    delays: Vec<DelaySample>,
    jitters: Vec<JitterSample>,
    capacity: usize,
    // Allocation failed at construction; accept probes but keep nothing.
    disabled: bool,
    previous: Option<(Probe, Timestamp)>,
}

impl BoundedAccumulator {
    pub fn new(capacity: usize) -> Self {
        let mut delays = Vec::new();
        let mut jitters = Vec::new();
        let disabled = delays.try_reserve_exact(capacity).is_err()
            || jitters.try_reserve_exact(capacity).is_err();
        if disabled {
            error!(capacity, "sample storage allocation failed, accumulating nothing");
        }
        Self {
            delays,
            jitters,
            capacity,
            disabled,
            previous: None,
        }
    }

    // Clear session state on reconnect; capacity and buffers are reused.
    pub fn reset(&mut self) {
        self.delays.clear();
        self.jitters.clear();
        self.previous = None;
    }

    pub fn delay_count(&self) -> usize {
        self.delays.len()
    }

    pub fn jitter_count(&self) -> usize {
        self.jitters.len()
    }

    pub fn delays(&self) -> &[DelaySample] {
        &self.delays
    }

    pub fn jitters(&self) -> &[JitterSample] {
        &self.jitters
    }

    // Jitter between consecutive pairs: previous delta minus current delta,
    // folded per axis. Returns (pairs, tx, rx).
    fn jitter_summaries(&self) -> (usize, StatsSummary, StatsSummary) {
        let mut tx = StatsSummary::new();
        let mut rx = StatsSummary::new();
        for pair in self.jitters.windows(2) {
            tx.observe(pair[0].tx_delta_usec - pair[1].tx_delta_usec);
            rx.observe(pair[0].rx_delta_usec - pair[1].rx_delta_usec);
        }
        (self.jitters.len(), tx, rx)
    }

    fn delay_summary(&self) -> StatsSummary {
        let mut summary = StatsSummary::new();
        for sample in &self.delays {
            summary.observe(sample.tx_delay_usec);
        }
        summary
    }
}

impl ProbeSink for BoundedAccumulator {
    fn record(&mut self, _topic: &str, probe: Probe, rx_time: Timestamp) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        if self.delays.len() >= self.capacity {
            return Err(Error::Overflow(self.capacity));
        }
        self.delays.push(DelaySample {
            id: probe.seq,
            tx_delay_usec: diff_usec(rx_time, probe.tx_time),
        });
        // The first probe of a session has nothing to pair with.
        if let Some((prev_probe, prev_rx)) = self.previous {
            self.jitters.push(JitterSample {
                from_id: prev_probe.seq,
                to_id: probe.seq,
                rx_delta_usec: diff_usec(rx_time, prev_rx),
                tx_delta_usec: diff_usec(probe.tx_time, prev_probe.tx_time),
            });
        }
        self.previous = Some((probe, rx_time));
        Ok(())
    }

    fn report(&mut self) -> Result<()> {
        let (pairs, tx, rx) = self.jitter_summaries();
        let mut prev: Option<&JitterSample> = None;
        for sample in &self.jitters {
            print!(
                "{:4} {:4} {:6} {:6}",
                sample.from_id, sample.to_id, sample.tx_delta_usec, sample.rx_delta_usec
            );
            if let Some(prev) = prev {
                print!(
                    " {:6} {:6} usec",
                    prev.tx_delta_usec - sample.tx_delta_usec,
                    prev.rx_delta_usec - sample.rx_delta_usec
                );
            }
            println!();
            prev = Some(sample);
        }
        println!("Jitter ------------------------------------------------");
        println!(
            "TX: {} pairs, {:4} / {:4} / {:6.2} usec",
            pairs, tx.min, tx.max, tx.mean()
        );
        println!(
            "RX: {} pairs, {:4} / {:4} / {:6.2} usec",
            pairs, rx.min, rx.max, rx.mean()
        );
        println!();

        let delay = self.delay_summary();
        for sample in &self.delays {
            println!("{:4} {:6} usec", sample.id, sample.tx_delay_usec);
        }
        println!("Delay ------------------------------------------------");
        println!(
            "{} samples, {} / {} / {:6.2} usec",
            delay.count,
            delay.min,
            delay.max,
            delay.mean()
        );
        Ok(())
    }
}
