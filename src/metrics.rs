//! Call counters and construction timings for one factory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

const RECENT_SAMPLES: usize = 100;

/// Construction timing statistics.
#[derive(Debug, Clone)]
pub struct TimingStats {
    /// Number of constructions measured
    pub count: u64,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
    /// Most recent measurements, oldest first
    pub recent_times: Vec<Duration>,
}

impl TimingStats {
    fn new() -> Self {
        Self {
            count: 0,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            recent_times: Vec::with_capacity(RECENT_SAMPLES),
        }
    }

    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.total_duration += duration;

        if self.recent_times.len() >= RECENT_SAMPLES {
            self.recent_times.remove(0);
        }
        self.recent_times.push(duration);
    }

    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_duration.as_nanos() / u128::from(self.count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    /// 95th percentile over the recent measurements.
    pub fn p95_duration(&self) -> Duration {
        if self.recent_times.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted = self.recent_times.clone();
        sorted.sort();
        let index = (sorted.len() as f64 * 0.95) as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Live counters, updated by the factory.
#[derive(Debug, Default)]
pub(crate) struct FactoryMetrics {
    calls: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    failed_constructions: AtomicU64,
    failed_calls: AtomicU64,
    constructions: Mutex<TimingStats>,
}

impl FactoryMetrics {
    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_construction(&self, duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.constructions.lock().record(duration);
    }

    pub(crate) fn record_failed_construction(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.failed_constructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_call(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, instances: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failed_constructions: self.failed_constructions.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            instances,
            constructions: self.constructions.lock().clone(),
        }
    }
}

/// Point-in-time copy of a factory's metrics.
///
/// `hits + misses` counts the calls that reached the registry; calls that
/// failed earlier (argument processing, key derivation) only count in
/// `calls` and `failed_calls`.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub calls: u64,
    /// Calls served by an existing instance
    pub hits: u64,
    /// Calls that ran the constructor
    pub misses: u64,
    pub failed_constructions: u64,
    /// Calls that returned an error, at any stage
    pub failed_calls: u64,
    /// Registered instances
    pub instances: usize,
    pub constructions: TimingStats,
}

impl MetricsSnapshot {
    /// Share of registry lookups served from the cache.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_stats() {
        let mut stats = TimingStats::new();
        assert_eq!(stats.average_duration(), Duration::ZERO);
        assert_eq!(stats.p95_duration(), Duration::ZERO);

        for ms in 1..=200 {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.count, 200);
        assert_eq!(stats.min_duration, Duration::from_millis(1));
        assert_eq!(stats.max_duration, Duration::from_millis(200));
        assert_eq!(stats.recent_times.len(), RECENT_SAMPLES);
        assert_eq!(stats.recent_times[0], Duration::from_millis(101));
        assert!(stats.p95_duration() >= Duration::from_millis(190));
    }

    #[test]
    fn average_past_u32_samples() {
        let samples = u64::from(u32::MAX) + 1;
        let stats = TimingStats {
            count: samples,
            total_duration: Duration::from_secs(samples * 2),
            ..TimingStats::new()
        };
        assert_eq!(stats.average_duration(), Duration::from_secs(2));
    }

    #[test]
    fn snapshot_ratio() {
        let metrics = FactoryMetrics::default();
        assert_eq!(metrics.snapshot(0).hit_ratio(), 0.0);

        metrics.record_call();
        metrics.record_construction(Duration::from_micros(5));
        for _ in 0..3 {
            metrics.record_call();
            metrics.record_hit();
        }

        let snapshot = metrics.snapshot(1);
        assert_eq!(snapshot.calls, 4);
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.constructions.count, 1);
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
