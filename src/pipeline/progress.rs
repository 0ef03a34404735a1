//! Periodic progress reporting with throughput and ETA.

use std::time::{Duration, Instant};
use tracing::info;

pub struct ProgressTracker {
    label: String,
    total: usize,
    interval: usize,
    processed: usize,
    next_report: usize,
    started: Instant,
}

impl ProgressTracker {
    /// `interval` of zero disables intermediate reports.
    pub fn new(label: impl Into<String>, total: usize, interval: usize) -> Self {
        Self {
            label: label.into(),
            total,
            interval,
            processed: 0,
            next_report: interval,
            started: Instant::now(),
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Count `n` more records, logging once per interval boundary crossed.
    pub fn advance(&mut self, n: usize) {
        self.processed += n;
        if self.interval == 0 || self.processed < self.next_report {
            return;
        }
        self.next_report = (self.processed / self.interval + 1) * self.interval;
        if self.processed >= self.total {
            return;
        }
        let (rate, eta) = estimate(self.processed, self.total, self.started.elapsed());
        let rate = format!("{:.1}/s", rate);
        info!(
            stage = %self.label,
            processed = self.processed,
            total = self.total,
            rate = %rate,
            eta_secs = eta.map(|d| d.as_secs()),
            "Progress"
        );
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Records per second so far and the time left at that rate.
pub fn estimate(processed: usize, total: usize, elapsed: Duration) -> (f64, Option<Duration>) {
    let secs = elapsed.as_secs_f64();
    if processed == 0 || secs <= 0.0 {
        return (0.0, None);
    }
    let rate = processed as f64 / secs;
    let remaining = total.saturating_sub(processed) as f64;
    (rate, Some(Duration::from_secs_f64(remaining / rate)))
}
