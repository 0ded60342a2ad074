use std::time::{Duration, Instant};

use super::batch::{count_blocks, Batch};

/// Logs processing progress at most once per interval.
pub struct ProgressTracker<'a> {
    batches: &'a [Batch],
    interval: Duration,
    last_report: Instant,
    blocks_since_report: u64,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(batches: &'a [Batch], interval: Duration) -> Self {
        Self {
            batches,
            interval,
            last_report: Instant::now(),
            blocks_since_report: 0,
        }
    }

    /// Record a committed block. `target` is the height the run is currently
    /// heading for: the end of the block range, or the chain head for an
    /// open-ended one.
    pub fn record(&mut self, height: u64, target: u64) {
        self.blocks_since_report += 1;

        let elapsed = self.last_report.elapsed();
        if elapsed < self.interval {
            return;
        }

        let speed = self.blocks_since_report as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            "Processed up to block {} ({:.2}% of {} blocks, {:.1} blocks/s)",
            height,
            self.percent(height, target),
            count_blocks(self.batches, target),
            speed
        );

        self.last_report = Instant::now();
        self.blocks_since_report = 0;
    }

    /// Share of the blocks up to `target` that lie at or below `height`.
    pub fn percent(&self, height: u64, target: u64) -> f64 {
        let total = count_blocks(self.batches, target);
        if total == 0 {
            return 100.0;
        }
        let done = count_blocks(self.batches, height.min(target));
        done as f64 * 100.0 / total as f64
    }
}
