//! Notification Queue — a bounded, drop-oldest work queue with a fixed pool
//! of dispatcher workers, plus the shared retry-with-backoff helper used by
//! every sink.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use logwatcher_core::NotificationJob;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// Upper bound on how long a blocked `pop` waits before rechecking whether
/// the queue has been closed. `Notify::notify_waiters` only wakes tasks
/// already parked on `notified()`; this bounds the narrow race where `close`
/// runs between a popper's empty-check and its wait.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A bounded queue of [`NotificationJob`]s. `tokio::sync::mpsc` enforces
/// backpressure by blocking the producer; this queue instead drops the
/// oldest entry on overflow, which matches the "recency over completeness"
/// policy for informational alerts.
pub struct NotificationQueue {
    capacity: usize,
    jobs: Mutex<VecDeque<NotificationJob>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a job, dropping the oldest entry if the queue is already at
    /// capacity. Returns `true` if a job was dropped to make room.
    pub async fn push(&self, job: NotificationJob) -> bool {
        let mut jobs = self.jobs.lock().await;
        let mut dropped = false;
        if jobs.len() >= self.capacity {
            jobs.pop_front();
            dropped = true;
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("notification queue full, dropped oldest job");
        }
        jobs.push_back(job);
        drop(jobs);
        self.notify.notify_one();
        dropped
    }

    /// Pop the oldest job, waiting for one to arrive. Returns `None` once
    /// the queue has been [`close`](Self::close)d and drained — the signal
    /// for a dispatcher worker to stop.
    pub async fn pop(&self) -> Option<NotificationJob> {
        loop {
            {
                let mut jobs = self.jobs.lock().await;
                if let Some(job) = jobs.pop_front() {
                    return Some(job);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(CLOSE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Mark the queue closed: once drained, `pop` returns `None` instead of
    /// waiting forever. Called during shutdown after the drain deadline.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Number of jobs dropped due to the queue being full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drain remaining jobs, e.g. for shutdown bookkeeping.
    pub async fn drain(&self) -> Vec<NotificationJob> {
        let mut jobs = self.jobs.lock().await;
        jobs.drain(..).collect()
    }
}

/// Retry `attempt_fn` up to `max_retries` times with a backoff that grows
/// linearly in the attempt count (`base_delay * attempt`). Collapses the
/// per-sink retry decorator into one reusable helper.
pub async fn retry_with_backoff<F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut attempt_fn: F,
) -> anyhow::Result<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let max_retries = max_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn(attempt).await {
            Ok(()) => return Ok(attempt),
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err);
                }
                tokio::time::sleep(base_delay * attempt).await;
            }
        }
    }
}

pub type SharedQueue = Arc<NotificationQueue>;

#[cfg(test)]
mod tests {
    use super::*;
    use logwatcher_core::SinkSelector;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    fn job(message: &str) -> NotificationJob {
        NotificationJob::new(SinkSelector::Syslog, message.to_string(), "err".to_string())
    }

    #[tokio::test]
    async fn drops_oldest_when_full() {
        let queue = NotificationQueue::new(2);
        queue.push(job("a")).await;
        queue.push(job("b")).await;
        queue.push(job("c")).await;

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len().await, 2);
        let first = queue.pop().await.unwrap();
        assert_eq!(first.rendered_message, "b");
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(NotificationQueue::new(4));
        let reader = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(job("x")).await;
        let job = reader.await.unwrap().unwrap();
        assert_eq!(job.rendered_message, "x");
    }

    #[tokio::test]
    async fn pop_returns_none_after_close_when_empty() {
        let queue = Arc::new(NotificationQueue::new(4));
        let reader = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert!(reader.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pop_drains_before_returning_none() {
        let queue = NotificationQueue::new(4);
        queue.push(job("a")).await;
        queue.close();
        assert_eq!(queue.pop().await.unwrap().rendered_message, "a");
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&attempts);
        let result = retry_with_backoff(3, Duration::from_millis(1), move |_| {
            let a = Arc::clone(&a);
            async move {
                a.fetch_add(1, AtomicOrdering::Relaxed);
                Err(anyhow::anyhow!("boom"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(AtomicOrdering::Relaxed), 3);
    }

    #[tokio::test]
    async fn retry_succeeds_without_exhausting() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&attempts);
        let result = retry_with_backoff(3, Duration::from_millis(1), move |attempt| {
            let a = Arc::clone(&a);
            async move {
                a.fetch_add(1, AtomicOrdering::Relaxed);
                if attempt < 2 {
                    Err(anyhow::anyhow!("not yet"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
