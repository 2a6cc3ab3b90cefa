use std::collections::HashMap;
use std::time::Instant;

/// Observer for batch-run events.
///
/// Keeps the driver free of any particular output mechanism; the CLI logs
/// through the `log` facade while tests discard everything.
pub trait BatchLogger: Send {
    /// Files handled so far out of the files that needed work.
    fn progress(&mut self, current: usize, total: usize);

    /// How long a named stage took for one batch.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    fn info(&mut self, message: &str);

    /// End-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullBatchLogger;

impl BatchLogger for NullBatchLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// `log`-backed logger with per-stage timing and a throughput summary.
///
/// Progress lines are throttled to one every `throttle_files` files.
pub struct LogBatchLogger {
    throttle_files: usize,
    last_reported: usize,
    timings: HashMap<String, Vec<f64>>,
    start_time: Instant,
    total_files: usize,
}

impl LogBatchLogger {
    pub fn new(throttle_files: usize) -> Self {
        Self {
            throttle_files: throttle_files.max(1),
            last_reported: 0,
            timings: HashMap::new(),
            start_time: Instant::now(),
            total_files: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let files = self.total_files;
        let mut lines = vec![format!(
            "Batch summary ({files} files, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len() as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:8.1}ms  total {total_ms:9.0}ms  ({} runs)",
                durations.len()
            ));
        }

        if files > 0 && elapsed_ms > 0.0 {
            let rate = files as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {rate:.1} files/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }
}

impl Default for LogBatchLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl BatchLogger for LogBatchLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.total_files = total;
        if total == 0 {
            return;
        }
        if current.saturating_sub(self.last_reported) >= self.throttle_files || current == total {
            self.last_reported = current;
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Embedded {current}/{total} files ({pct:.1}%)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
