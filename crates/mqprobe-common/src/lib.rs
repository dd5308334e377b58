// Shared timing primitives: wall-clock timestamps, microsecond diff math,
// the pacing scheduler and summary aggregates.
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("system clock reads before the unix epoch")]
    ClockBeforeEpoch,
}

pub const USEC_PER_SEC: i64 = 1_000_000;

/// Wall-clock capture time split into seconds and microseconds.
///
/// Delay numbers derived from two hosts' timestamps are only meaningful when
/// those hosts' clocks are already aligned; nothing here compensates for skew.
///
/// ```
/// use mqprobe_common::Timestamp;
///
/// let a = Timestamp { sec: 10, usec: 250 };
/// let b = Timestamp { sec: 9, usec: 999_750 };
/// assert_eq!(mqprobe_common::diff_usec(a, b), 500);
/// assert_eq!(mqprobe_common::diff_usec(b, a), 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    // Capture the current wall-clock time.
    pub fn now() -> Result<Self> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::ClockBeforeEpoch)?;
        Ok(Self {
            sec: since_epoch.as_secs() as i64,
            usec: i64::from(since_epoch.subsec_micros()),
        })
    }

    // Total microseconds since the epoch; the i64 range outlives us all.
    pub fn total_usec(&self) -> i64 {
        self.sec * USEC_PER_SEC + self.usec
    }
}

// Microsecond difference between two timestamps as a non-negative magnitude.
// Carry across the seconds/microseconds split falls out of the total-usec
// form; symmetric, zero only when both fields match.
pub fn diff_usec(a: Timestamp, b: Timestamp) -> i64 {
    (a.total_usec() - b.total_usec()).abs()
}

/// Computes how long to sleep after each send to hold a target publish
/// frequency. An overrun (the work took longer than the inter-send interval)
/// is logged and answered with a zero sleep; there is no catch-up bursting.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    // None disables pacing entirely (frequency 0).
    interval_usec: Option<i64>,
}

impl Pacer {
    pub fn new(freq_hz: u32) -> Self {
        let interval_usec = (freq_hz > 0).then(|| USEC_PER_SEC / i64::from(freq_hz));
        Self { interval_usec }
    }

    pub fn is_disabled(&self) -> bool {
        self.interval_usec.is_none()
    }

    // Sleep duration so that the next send lands one interval after the
    // previous one. Reads the current clock; otherwise pure in its inputs.
    pub fn sleep_for(&self, prev_send: Timestamp) -> Result<Duration> {
        let Some(interval_usec) = self.interval_usec else {
            return Ok(Duration::ZERO);
        };
        let next_due_usec = prev_send.total_usec() + interval_usec;
        let now = Timestamp::now()?;
        let sleep_usec = next_due_usec - now.total_usec();
        if sleep_usec < 0 {
            warn!(
                overrun_usec = sleep_usec.abs(),
                "send interval overrun, skipping sleep"
            );
            return Ok(Duration::ZERO);
        }
        debug!(sleep_usec, "pacing sleep");
        Ok(Duration::from_micros(sleep_usec as u64))
    }
}

/// Running aggregate over one signed sample axis: signed min/max plus the
/// mean of magnitudes, matching the plain-text reports.
#[derive(Debug, Clone, Copy)]
pub struct StatsSummary {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    sum_magnitude: f64,
}

impl StatsSummary {
    pub fn new() -> Self {
        Self {
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            sum_magnitude: 0.0,
        }
    }

    pub fn observe(&mut self, value: i64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum_magnitude += value.abs() as f64;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_magnitude / self.count as f64
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for StatsSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_is_symmetric_with_carry() {
        // The microsecond field of `b` is larger, forcing a seconds carry.
        let a = Timestamp { sec: 5, usec: 100 };
        let b = Timestamp {
            sec: 4,
            usec: 999_900,
        };
        assert_eq!(diff_usec(a, b), 200);
        assert_eq!(diff_usec(b, a), 200);
    }

    #[test]
    fn diff_is_zero_only_for_equal_timestamps() {
        let a = Timestamp {
            sec: 7,
            usec: 1234,
        };
        assert_eq!(diff_usec(a, a), 0);
        let b = Timestamp {
            sec: 7,
            usec: 1235,
        };
        assert_ne!(diff_usec(a, b), 0);
    }

    #[test]
    fn pacer_returns_zero_when_overdue() {
        // The previous send was a second ago; at 10Hz the next slot has passed.
        let pacer = Pacer::new(10);
        let mut prev = Timestamp::now().expect("now");
        prev.sec -= 1;
        let sleep = pacer.sleep_for(prev).expect("sleep");
        assert_eq!(sleep, Duration::ZERO);
    }

    #[test]
    fn pacer_sleeps_a_full_interval_from_now() {
        let pacer = Pacer::new(10);
        let prev = Timestamp::now().expect("now");
        let sleep = pacer.sleep_for(prev).expect("sleep");
        // Allow for the time spent between the two clock reads.
        assert!(sleep <= Duration::from_micros(100_000));
        assert!(sleep >= Duration::from_micros(90_000));
    }

    #[test]
    fn pacer_disabled_at_zero_frequency() {
        let pacer = Pacer::new(0);
        assert!(pacer.is_disabled());
        let prev = Timestamp::now().expect("now");
        assert_eq!(pacer.sleep_for(prev).expect("sleep"), Duration::ZERO);
    }

    #[test]
    fn summary_tracks_signed_extremes_and_magnitude_mean() {
        let mut summary = StatsSummary::new();
        for value in [-10, 4, 6] {
            summary.observe(value);
        }
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, -10);
        assert_eq!(summary.max, 6);
        assert!((summary.mean() - 20.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_reports_zero_mean() {
        let summary = StatsSummary::new();
        assert!(summary.is_empty());
        assert_eq!(summary.mean(), 0.0);
    }
}
