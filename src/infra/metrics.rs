//! Lock-free scan metrics and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Reporting swaps the periodic counters to get a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical counters
//! only and must not drive scanner logic.

use crate::domain::OutcomeKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for cycle latency (microseconds)
/// Buckets: ≤1ms, ≤2ms, ≤4ms, ... ≤512ms, >512ms
const BUCKET_BOUNDS: [u64; 10] =
    [1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000];
pub const METRICS_NUM_BUCKETS: usize = 11;

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
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket containing the given percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] = [
        1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000, 1_024_000,
    ];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the scan pipeline
pub struct Metrics {
    /// Completed scan cycles (monotonic)
    scans_total: AtomicU64,
    success_total: AtomicU64,
    duplicate_total: AtomicU64,
    not_found_total: AtomicU64,
    error_total: AtomicU64,
    /// Decoded payloads that never reached the processor (paused, stopped, stale run)
    decodes_ignored: AtomicU64,
    /// Cycle results that arrived after the scanner was stopped
    results_discarded: AtomicU64,
    camera_errors: AtomicU64,
    /// Feedback messages dropped because the UI channel was full
    feedback_dropped: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Sum of cycle latencies (reset on report)
    latency_sum_us: AtomicU64,
    /// Max cycle latency (reset on report)
    latency_max_us: AtomicU64,
    /// Cycle latency histogram (reset on report)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            duplicate_total: AtomicU64::new(0),
            not_found_total: AtomicU64::new(0),
            error_total: AtomicU64::new(0),
            decodes_ignored: AtomicU64::new(0),
            results_discarded: AtomicU64::new(0),
            camera_errors: AtomicU64::new(0),
            feedback_dropped: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a finished scan cycle with its decode-to-outcome latency
    #[inline]
    pub fn record_outcome(&self, kind: OutcomeKind, latency_us: u64) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            OutcomeKind::Success => &self.success_total,
            OutcomeKind::Duplicate => &self.duplicate_total,
            OutcomeKind::NotFound => &self.not_found_total,
            OutcomeKind::Error => &self.error_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_decode_ignored(&self) {
        self.decodes_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_result_discarded(&self) {
        self.results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_camera_error(&self) {
        self.camera_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feedback_dropped(&self) {
        self.feedback_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scans_total(&self) -> u64 {
        self.scans_total.load(Ordering::Relaxed)
    }

    pub fn outcome_total(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Success => self.success_total.load(Ordering::Relaxed),
            OutcomeKind::Duplicate => self.duplicate_total.load(Ordering::Relaxed),
            OutcomeKind::NotFound => self.not_found_total.load(Ordering::Relaxed),
            OutcomeKind::Error => self.error_total.load(Ordering::Relaxed),
        }
    }

    pub fn decodes_ignored(&self) -> u64 {
        self.decodes_ignored.load(Ordering::Relaxed)
    }

    pub fn results_discarded(&self) -> u64 {
        self.results_discarded.load(Ordering::Relaxed)
    }

    pub fn camera_errors(&self) -> u64 {
        self.camera_errors.load(Ordering::Relaxed)
    }

    pub fn feedback_dropped(&self) -> u64 {
        self.feedback_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the periodic ones
    pub fn report(&self) -> MetricsSummary {
        let cycles = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let scans_per_min = if elapsed.as_secs_f64() > 0.0 {
            cycles as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            scans_total: self.scans_total(),
            success_total: self.outcome_total(OutcomeKind::Success),
            duplicate_total: self.outcome_total(OutcomeKind::Duplicate),
            not_found_total: self.outcome_total(OutcomeKind::NotFound),
            error_total: self.outcome_total(OutcomeKind::Error),
            decodes_ignored: self.decodes_ignored(),
            results_discarded: self.results_discarded(),
            camera_errors: self.camera_errors(),
            feedback_dropped: self.feedback_dropped(),
            scans_per_min,
            avg_cycle_latency_us: if cycles > 0 { latency_sum / cycles } else { 0 },
            max_cycle_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub scans_total: u64,
    pub success_total: u64,
    pub duplicate_total: u64,
    pub not_found_total: u64,
    pub error_total: u64,
    pub decodes_ignored: u64,
    pub results_discarded: u64,
    pub camera_errors: u64,
    pub feedback_dropped: u64,
    pub scans_per_min: f64,
    pub avg_cycle_latency_us: u64,
    pub max_cycle_latency_us: u64,
    /// Cycle latency histogram buckets
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total,
            success = %self.success_total,
            duplicate = %self.duplicate_total,
            not_found = %self.not_found_total,
            errors = %self.error_total,
            decodes_ignored = %self.decodes_ignored,
            results_discarded = %self.results_discarded,
            camera_errors = %self.camera_errors,
            feedback_dropped = %self.feedback_dropped,
            scans_per_min = %format!("{:.1}", self.scans_per_min),
            avg_latency_us = %self.avg_cycle_latency_us,
            max_latency_us = %self.max_cycle_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
