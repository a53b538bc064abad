//! Statistics Tracker Module
//!
//! Counters and round-trip latency aggregates shared by every client task.
//! Running min/max/total/average cover the whole history since the last reset;
//! a bounded FIFO window of recent samples feeds the HdrHistogram percentile view.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Maximum number of latency samples retained for distribution views
pub const LATENCY_WINDOW_CAPACITY: usize = 10_000;

/// Histogram bounds in nanoseconds: 1 ns .. 1 hour
const HISTOGRAM_LOW: u64 = 1;
const HISTOGRAM_HIGH: u64 = 3_600_000_000_000;

/// Snapshot of client counters and latency aggregates
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_attempts: u64,
    pub reconnection_attempts: u64,
    pub errors: u64,
    /// Trailing bytes shorter than one frame dropped at a read boundary
    pub discarded_bytes: u64,
    /// `u64::MAX` until the first sample
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub total_latency_ns: u64,
    pub avg_latency_us: f64,
    pub start_time: Instant,
    pub last_message_time: Instant,
}

impl ClientStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            connection_attempts: 0,
            reconnection_attempts: 0,
            errors: 0,
            discarded_bytes: 0,
            min_latency_ns: u64::MAX,
            max_latency_ns: 0,
            total_latency_ns: 0,
            avg_latency_us: 0.0,
            start_time: now,
            last_message_time: now,
        }
    }

    /// Minimum latency, `None` before any sample was recorded
    pub fn min_latency(&self) -> Option<u64> {
        (self.min_latency_ns != u64::MAX).then_some(self.min_latency_ns)
    }

    fn add_latency(&mut self, latency_ns: u64) {
        self.total_latency_ns = self.total_latency_ns.saturating_add(latency_ns);
        if latency_ns < self.min_latency_ns {
            self.min_latency_ns = latency_ns;
        }
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
        self.recompute_average();
    }

    fn recompute_average(&mut self) {
        if self.messages_received > 0 {
            self.avg_latency_us = (self.total_latency_ns as f64 / 1000.0) / self.messages_received as f64;
        }
    }
}

/// Latency percentiles over the sample window (nanoseconds)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LatencyDistribution {
    pub count: u64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub p99_9: u64,
    pub p99_99: u64,
    pub max: u64,
}

/// Bounded FIFO of recent latency samples
#[derive(Debug, Default)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(LATENCY_WINDOW_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest once the capacity is exceeded
    pub fn push(&mut self, latency_ns: u64) {
        self.samples.push_back(latency_ns);
        if self.samples.len() > LATENCY_WINDOW_CAPACITY {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Samples oldest first
    pub fn to_vec(&self) -> Vec<u64> {
        self.samples.iter().copied().collect()
    }

    /// Percentile view of the window, `None` when empty
    pub fn distribution(&self, significant_figures: u8) -> Option<LatencyDistribution> {
        if self.samples.is_empty() {
            return None;
        }

        let mut histogram =
            match Histogram::<u64>::new_with_bounds(HISTOGRAM_LOW, HISTOGRAM_HIGH, significant_figures.clamp(1, 5)) {
                Ok(h) => h,
                Err(e) => {
                    log::warn!("Failed to create latency histogram: {}", e);
                    return None;
                }
            };

        for &sample in &self.samples {
            let clamped = sample.clamp(HISTOGRAM_LOW, HISTOGRAM_HIGH);
            if let Err(e) = histogram.record(clamped) {
                log::warn!("Failed to record latency {}: {}", sample, e);
            }
        }

        Some(LatencyDistribution {
            count: histogram.len(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p95: histogram.value_at_quantile(0.95),
            p99: histogram.value_at_quantile(0.99),
            p99_9: histogram.value_at_quantile(0.999),
            p99_99: histogram.value_at_quantile(0.9999),
            max: histogram.max(),
        })
    }
}

/// Thread-safe stats aggregator.
///
/// Counters and the sample window sit behind separate locks that are never held
/// together. Every counter update happens inside one `stats` lock scope, so a
/// snapshot never sees half of an update.
#[derive(Debug)]
pub struct StatsTracker {
    stats: Mutex<ClientStats>,
    window: Mutex<LatencyWindow>,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(ClientStats::new()),
            window: Mutex::new(LatencyWindow::new()),
        }
    }

    // A panicking handler must not take the counters down with it.
    fn stats(&self) -> MutexGuard<'_, ClientStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn window(&self) -> MutexGuard<'_, LatencyWindow> {
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count a frame accepted into the outbound queue
    pub fn record_sent(&self, bytes: usize) {
        let mut stats = self.stats();
        stats.messages_sent += 1;
        stats.bytes_sent += bytes as u64;
    }

    /// Count raw bytes returned by one socket read
    pub fn record_bytes_received(&self, bytes: usize) {
        let mut stats = self.stats();
        stats.bytes_received += bytes as u64;
        stats.last_message_time = Instant::now();
    }

    /// Count one dispatched frame and fold in its latency, if it carried a timestamp
    pub fn record_frame(&self, latency_ns: Option<u64>) {
        if let Some(latency) = latency_ns {
            self.window().push(latency);
        }

        let mut stats = self.stats();
        stats.messages_received += 1;
        match latency_ns {
            Some(latency) => stats.add_latency(latency),
            None => stats.recompute_average(),
        }
    }

    pub fn record_error(&self) {
        self.stats().errors += 1;
    }

    pub fn record_connection(&self) {
        self.stats().connection_attempts += 1;
    }

    pub fn record_reconnection_attempt(&self) {
        self.stats().reconnection_attempts += 1;
    }

    pub fn record_discarded(&self, bytes: usize) {
        self.stats().discarded_bytes += bytes as u64;
    }

    /// Consistent copy of all counters and aggregates
    pub fn snapshot(&self) -> ClientStats {
        self.stats().clone()
    }

    /// Replace every counter with its initial value and clear the sample window
    pub fn reset(&self) {
        *self.stats() = ClientStats::new();
        self.window().clear();
    }

    pub fn window_len(&self) -> usize {
        self.window().len()
    }

    /// Windowed samples, oldest first
    pub fn latency_samples(&self) -> Vec<u64> {
        self.window().to_vec()
    }

    pub fn distribution(&self, significant_figures: u8) -> Option<LatencyDistribution> {
        self.window().distribution(significant_figures)
    }
}

/// Serializable stats view for printing
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub uptime_secs: u64,
    pub connection_state: String,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_attempts: u64,
    pub reconnection_attempts: u64,
    pub errors: u64,
    pub discarded_bytes: u64,
    pub avg_latency_us: Option<f64>,
    pub min_latency_us: Option<f64>,
    pub max_latency_us: Option<f64>,
    pub distribution_ns: Option<LatencyDistribution>,
}

impl StatsReport {
    pub fn new(stats: &ClientStats, connection_state: String, distribution: Option<LatencyDistribution>) -> Self {
        let has_latency = stats.min_latency().is_some();
        Self {
            uptime_secs: stats.start_time.elapsed().as_secs(),
            connection_state,
            messages_sent: stats.messages_sent,
            messages_received: stats.messages_received,
            bytes_sent: stats.bytes_sent,
            bytes_received: stats.bytes_received,
            connection_attempts: stats.connection_attempts,
            reconnection_attempts: stats.reconnection_attempts,
            errors: stats.errors,
            discarded_bytes: stats.discarded_bytes,
            avg_latency_us: has_latency.then_some(stats.avg_latency_us),
            min_latency_us: stats.min_latency().map(|ns| ns as f64 / 1000.0),
            max_latency_us: has_latency.then_some(stats.max_latency_ns as f64 / 1000.0),
            distribution_ns: distribution,
        }
    }

    /// One-line summary through the log facade
    pub fn log_summary(&self) {
        log::info!(
            "Stats: state={} sent={} received={} bytes_sent={} bytes_received={} errors={} reconnects={} discarded_bytes={}",
            self.connection_state,
            self.messages_sent,
            self.messages_received,
            self.bytes_sent,
            self.bytes_received,
            self.errors,
            self.reconnection_attempts,
            self.discarded_bytes
        );
        if let Some(d) = &self.distribution_ns {
            log::info!(
                "Latency stats (ns): p50={}, p90={}, p95={}, p99={}, p99.9={}, p99.99={}, max={}",
                d.p50, d.p90, d.p95, d.p99, d.p99_9, d.p99_99, d.max
            );
        }
    }
}
