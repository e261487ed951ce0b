use log::warn;
use std::time::Duration;

const INTERVAL: u64 = 120;
const AVG_TIME_THRESHOLD: Duration = Duration::from_millis(5);

/// Decrypt timings of one session, reported every [`INTERVAL`] calls when
/// the running average gets slow.
#[derive(Default)]
pub(super) struct DecryptStats {
    calls: u64,
    bytes_total: u64,
    time_total: Duration,
    bytes_interval: u64,
    time_interval: Duration,
}

impl DecryptStats {
    /// Returns the running average decrypt time when an interval completes.
    pub(super) fn record(&mut self, label: &str, bytes: usize, elapsed: Duration) -> Option<Duration> {
        if bytes == 0 {
            return None;
        }

        self.calls += 1;
        self.bytes_interval += bytes as u64;
        self.time_interval += elapsed;

        if self.calls % INTERVAL != 0 {
            return None;
        }

        self.bytes_total += self.bytes_interval;
        self.time_total += self.time_interval;

        let avg = average(self.time_total, self.calls);

        if avg >= AVG_TIME_THRESHOLD {
            warn!(
                "{label}: slow decrypt, average {:.2} ms and {} bytes over {} calls (last interval {:.2} ms, {} bytes)",
                avg.as_secs_f64() * 1000.0,
                self.bytes_total / self.calls,
                self.calls,
                average(self.time_interval, INTERVAL).as_secs_f64() * 1000.0,
                self.bytes_interval / INTERVAL,
            );
        }

        self.bytes_interval = 0;
        self.time_interval = Duration::ZERO;
        Some(avg)
    }
}

fn average(total: Duration, calls: u64) -> Duration {
    let nanos = total.as_nanos() / u128::from(calls.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
