//! Rate Limiter — at-most-one-notification-per-window, keyed by
//! `"{file}:{pattern}"`.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Sliding-window admission control. One entry per `(file, pattern)` key,
/// tracking only the instant of the last admitted match — matches suppressed
/// within the window are dropped before reaching the notification queue.
#[derive(Debug, Default)]
pub struct RateLimiter {
    window: Duration,
    last_admitted: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: DashMap::new(),
        }
    }

    /// Returns `true` if a match for `key` at `now` should be admitted (and
    /// records `now` as the new last-admitted instant), `false` if it falls
    /// within the suppression window of a previously admitted match.
    pub fn admit(&self, key: &str, now: Instant) -> bool {
        match self.last_admitted.get(key) {
            Some(last) if now.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.last_admitted.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Format the canonical rate-limiter key for a file/pattern pair.
    pub fn key(file: &str, pattern: &str) -> String {
        format!("{file}:{pattern}")
    }

    pub fn len(&self) -> usize {
        self.last_admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_admitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_first_match_and_suppresses_within_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.admit("a.log:err", t0));
        assert!(!limiter.admit("a.log:err", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn admits_again_after_window_elapses() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.admit("a.log:err", t0));
        assert!(limiter.admit("a.log:err", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn keys_are_independent_per_file_and_pattern() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.admit("a.log:err", t0));
        assert!(limiter.admit("b.log:err", t0));
        assert!(limiter.admit("a.log:warn", t0));
    }

    #[test]
    fn key_format_matches_spec() {
        assert_eq!(RateLimiter::key("app.log", "oom"), "app.log:oom");
    }
}
