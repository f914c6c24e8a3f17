//! Metrics — the read-only counters/timestamps the core exposes, tracked
//! both as in-process atomics (for the health collaborator) and exported
//! via the `metrics` facade (for Prometheus scraping).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use metrics::counter;

/// Process-wide counters and timestamps. Cheap to clone handles (it's
/// wrapped in an `Arc` by callers); all mutation is lock-free.
pub struct MetricsCollector {
    start_time: Instant,
    matches_found: AtomicU64,
    notifications_enqueued: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_suppressed: AtomicU64,
    notifications_dropped: AtomicU64,
    errors_by_category: DashMap<String, AtomicU64>,
    matches_by_pattern: DashMap<String, AtomicU64>,
    last_match_time_unix: AtomicI64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            matches_found: AtomicU64::new(0),
            notifications_enqueued: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_suppressed: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            errors_by_category: DashMap::new(),
            matches_by_pattern: DashMap::new(),
            last_match_time_unix: AtomicI64::new(0),
        }
    }

    pub fn record_match(&self, pattern_name: &str) {
        counter!("logwatcher_matches_found_total").increment(1);
        self.matches_found.fetch_add(1, Ordering::Relaxed);

        counter!("logwatcher_pattern_matches_total", "pattern" => pattern_name.to_string())
            .increment(1);
        self.matches_by_pattern
            .entry(pattern_name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.last_match_time_unix.store(now, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        counter!("logwatcher_notifications_enqueued_total").increment(1);
        self.notifications_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        counter!("logwatcher_notifications_sent_total").increment(1);
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        counter!("logwatcher_notifications_suppressed_total").increment(1);
        self.notifications_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        counter!("logwatcher_notifications_dropped_total").increment(1);
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, category: &str) {
        counter!("logwatcher_errors_total", "category" => category.to_string()).increment(1);
        self.errors_by_category
            .entry(category.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            matches_found: self.matches_found.load(Ordering::Relaxed),
            notifications_enqueued: self.notifications_enqueued.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_suppressed: self.notifications_suppressed.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            errors_by_category: self
                .errors_by_category
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            matches_by_pattern: self
                .matches_by_pattern
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            last_match_time_unix: self.last_match_time_unix.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub matches_found: u64,
    pub notifications_enqueued: u64,
    pub notifications_sent: u64,
    pub notifications_suppressed: u64,
    pub notifications_dropped: u64,
    pub errors_by_category: Vec<(String, u64)>,
    pub matches_by_pattern: Vec<(String, u64)>,
    pub last_match_time_unix: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_matches_and_patterns_independently() {
        let metrics = MetricsCollector::new();
        metrics.record_match("err");
        metrics.record_match("err");
        metrics.record_match("warn");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.matches_found, 3);
        let err_count = snapshot
            .matches_by_pattern
            .iter()
            .find(|(name, _)| name == "err")
            .map(|(_, c)| *c);
        assert_eq!(err_count, Some(2));
    }

    #[test]
    fn enqueued_and_sent_are_tracked_separately() {
        let metrics = MetricsCollector::new();
        metrics.record_enqueued();
        metrics.record_enqueued();
        metrics.record_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.notifications_enqueued, 2);
        assert_eq!(snapshot.notifications_sent, 1);
    }

    #[test]
    fn errors_bucketed_by_category() {
        let metrics = MetricsCollector::new();
        metrics.record_error("sink_delivery");
        metrics.record_error("sink_delivery");
        metrics.record_error("detector");

        let snapshot = metrics.snapshot();
        let sink_errors = snapshot
            .errors_by_category
            .iter()
            .find(|(c, _)| c == "sink_delivery")
            .map(|(_, n)| *n);
        assert_eq!(sink_errors, Some(2));
    }
}
