//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::GestureKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps periodic counters to get a consistent snapshot.
pub struct Metrics {
    /// Detection messages received from the bus (monotonic)
    messages_total: AtomicU64,
    /// Messages since last report (reset on report)
    messages_since_report: AtomicU64,
    /// Messages dropped because the node queue was full (monotonic)
    messages_dropped: AtomicU64,
    /// Queued messages skipped because a newer one was already waiting (monotonic)
    messages_superseded: AtomicU64,
    /// Payloads that failed to decode (monotonic)
    parse_errors: AtomicU64,
    /// Batches that contained a person (monotonic)
    person_batches: AtomicU64,
    /// Current presence flag (0/1)
    person_detected: AtomicU64,
    /// Gesture commands issued per kind (monotonic)
    gesture_commands: [AtomicU64; GestureKind::COUNT],
    /// SDK calls that returned non-zero or failed in transport (monotonic)
    sdk_failures: AtomicU64,
    /// SDK call latency histogram (reset on report)
    sdk_latency_buckets: [AtomicU64; NUM_BUCKETS],
    sdk_latency_sum_us: AtomicU64,
    sdk_latency_max_us: AtomicU64,
    /// Status lines queued for the publisher (monotonic)
    status_queued: AtomicU64,
    /// Status lines dropped because the egress queue was full (monotonic)
    status_dropped: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_total: AtomicU64::new(0),
            messages_since_report: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_superseded: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            person_batches: AtomicU64::new(0),
            person_detected: AtomicU64::new(0),
            gesture_commands: std::array::from_fn(|_| AtomicU64::new(0)),
            sdk_failures: AtomicU64::new(0),
            sdk_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sdk_latency_sum_us: AtomicU64::new(0),
            sdk_latency_max_us: AtomicU64::new(0),
            status_queued: AtomicU64::new(0),
            status_dropped: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
        self.messages_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_messages_superseded(&self, count: u64) {
        self.messages_superseded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a decoded batch
    #[inline]
    pub fn record_batch(&self, person_found: bool) {
        if person_found {
            self.person_batches.fetch_add(1, Ordering::Relaxed);
        }
        self.person_detected.store(person_found as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gesture(&self, kind: GestureKind) {
        self.gesture_commands[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sdk_failure(&self) {
        self.sdk_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record SDK round-trip latency (excludes the settle delay)
    #[inline]
    pub fn record_sdk_latency(&self, latency_us: u64) {
        self.sdk_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.sdk_latency_max_us, latency_us);
        self.sdk_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_status_queued(&self) {
        self.status_queued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_status_dropped(&self) {
        self.status_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_total(&self) -> u64 {
        self.messages_total.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn messages_superseded(&self) -> u64 {
        self.messages_superseded.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn gesture_commands(&self, kind: GestureKind) -> u64 {
        self.gesture_commands[kind.index()].load(Ordering::Relaxed)
    }

    pub fn sdk_failures(&self) -> u64 {
        self.sdk_failures.load(Ordering::Relaxed)
    }

    pub fn status_queued(&self) -> u64 {
        self.status_queued.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let messages_count = self.messages_since_report.swap(0, Ordering::Relaxed);
        let sdk_latency_buckets = swap_buckets(&self.sdk_latency_buckets);
        let sdk_latency_sum = self.sdk_latency_sum_us.swap(0, Ordering::Relaxed);
        let sdk_latency_max = self.sdk_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let messages_per_sec = if elapsed.as_secs_f64() > 0.0 {
            messages_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let sdk_calls: u64 = sdk_latency_buckets.iter().sum();
        let sdk_latency_avg_us = if sdk_calls > 0 { sdk_latency_sum / sdk_calls } else { 0 };

        let mut gesture_commands = [0u64; GestureKind::COUNT];
        for (i, counter) in self.gesture_commands.iter().enumerate() {
            gesture_commands[i] = counter.load(Ordering::Relaxed);
        }

        MetricsSummary {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            messages_per_sec,
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_superseded: self.messages_superseded.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            person_batches: self.person_batches.load(Ordering::Relaxed),
            person_detected: self.person_detected.load(Ordering::Relaxed) != 0,
            gesture_commands,
            sdk_failures: self.sdk_failures.load(Ordering::Relaxed),
            sdk_latency_buckets,
            sdk_latency_avg_us,
            sdk_latency_max_us: sdk_latency_max,
            sdk_latency_p99_us: percentile_from_buckets(&sdk_latency_buckets, 0.99),
            status_queued: self.status_queued.load(Ordering::Relaxed),
            status_dropped: self.status_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub messages_total: u64,
    pub messages_per_sec: f64,
    pub messages_dropped: u64,
    pub messages_superseded: u64,
    pub parse_errors: u64,
    pub person_batches: u64,
    pub person_detected: bool,
    /// Indexed by `GestureKind::index()`
    pub gesture_commands: [u64; GestureKind::COUNT],
    pub sdk_failures: u64,
    /// SDK latency histogram since the previous report
    pub sdk_latency_buckets: [u64; NUM_BUCKETS],
    pub sdk_latency_avg_us: u64,
    pub sdk_latency_max_us: u64,
    pub sdk_latency_p99_us: u64,
    pub status_queued: u64,
    pub status_dropped: u64,
}

impl MetricsSummary {
    pub fn gestures(&self, kind: GestureKind) -> u64 {
        self.gesture_commands[kind.index()]
    }

    pub fn log(&self) {
        info!(
            messages_total = %self.messages_total,
            messages_per_sec = format!("{:.1}", self.messages_per_sec),
            messages_dropped = %self.messages_dropped,
            messages_superseded = %self.messages_superseded,
            parse_errors = %self.parse_errors,
            person_detected = %self.person_detected,
            handshakes = %self.gestures(GestureKind::Handshake),
            cancels = %self.gestures(GestureKind::CancelHandshake),
            waves = %self.gestures(GestureKind::Wave),
            sdk_failures = %self.sdk_failures,
            sdk_avg_us = %self.sdk_latency_avg_us,
            sdk_p99_us = %self.sdk_latency_p99_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.messages_total(), 0);
        assert_eq!(metrics.gesture_commands(GestureKind::Handshake), 0);
    }

    #[test]
    fn test_record_gestures_by_kind() {
        let metrics = Metrics::new();

        metrics.record_gesture(GestureKind::Handshake);
        metrics.record_gesture(GestureKind::Handshake);
        metrics.record_gesture(GestureKind::CancelWave);

        assert_eq!(metrics.gesture_commands(GestureKind::Handshake), 2);
        assert_eq!(metrics.gesture_commands(GestureKind::CancelHandshake), 0);
        assert_eq!(metrics.gesture_commands(GestureKind::CancelWave), 1);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_message_received();
        metrics.record_message_received();
        metrics.record_parse_error();
        metrics.record_batch(true);
        metrics.record_sdk_latency(100);
        metrics.record_sdk_latency(300);
        metrics.record_sdk_failure();
        metrics.record_messages_superseded(3);

        let summary = metrics.report();

        assert_eq!(summary.messages_total, 2);
        assert_eq!(summary.parse_errors, 1);
        assert_eq!(summary.person_batches, 1);
        assert!(summary.person_detected);
        assert_eq!(summary.sdk_latency_avg_us, 200);
        assert_eq!(summary.sdk_latency_max_us, 300);
        assert_eq!(summary.sdk_failures, 1);
        assert_eq!(summary.messages_superseded, 3);

        // Periodic counters should be reset, monotonic ones kept
        assert_eq!(metrics.messages_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.sdk_latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.messages_total(), 2);
    }

    #[test]
    fn test_presence_flag_follows_last_batch() {
        let metrics = Metrics::new();
        metrics.record_batch(true);
        metrics.record_batch(false);

        let summary = metrics.report();
        assert!(!summary.person_detected);
        assert_eq!(summary.person_batches, 1);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_sdk_latency(150);
        }

        let summary = metrics.report();
        assert_eq!(summary.sdk_latency_p99_us, 200);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    m.record_message_received();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.messages_total(), 8_000);
    }
}
