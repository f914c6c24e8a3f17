//! Health collaborator — polls the metrics/file-state read-only views and
//! reports degraded when any of the three documented conditions holds.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use logwatcher_core::FileState;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::sinks::{FanoutSink, SyslogSink};

/// Files are considered stale if they haven't been read in this long.
const STALE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct FileHealth {
    pub path: PathBuf,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub seconds_since_last_read: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SinkHealth {
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub files: Vec<FileHealth>,
    pub sinks: Vec<SinkHealth>,
    pub metrics: MetricsSnapshot,
}

/// Compute a point-in-time health report.
pub async fn check_health(
    file_states: &DashMap<PathBuf, FileState>,
    fanout: &FanoutSink,
    syslog: &SyslogSink,
    metrics: &MetricsCollector,
) -> HealthReport {
    let now = Instant::now();
    let files: Vec<FileHealth> = file_states
        .iter()
        .map(|entry| {
            let state = entry.value();
            FileHealth {
                path: state.path.clone(),
                error_count: state.error_count,
                last_error: state.last_error.clone(),
                seconds_since_last_read: state.seconds_since_last_read(now),
            }
        })
        .collect();

    let sinks = vec![
        SinkHealth {
            name: "fanout".to_string(),
            healthy: fanout.self_check().await,
        },
        SinkHealth {
            name: "syslog".to_string(),
            healthy: syslog.self_check().await,
        },
    ];

    let any_file_errors = files.iter().any(|f| f.error_count > 0);
    let any_sink_unhealthy = sinks.iter().any(|s| !s.healthy);
    let any_file_stale = files
        .iter()
        .any(|f| f.seconds_since_last_read.is_some_and(|s| s > STALE_THRESHOLD.as_secs()));

    let status = if any_file_errors || any_sink_unhealthy || any_file_stale {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        files,
        sinks,
        metrics: metrics.snapshot(),
    }
}

/// Periodic health task. Read-only on file state and metrics; logs a
/// warning whenever the computed status is degraded.
pub async fn run(
    interval: Duration,
    file_states: std::sync::Arc<DashMap<PathBuf, FileState>>,
    fanout: std::sync::Arc<FanoutSink>,
    syslog: std::sync::Arc<SyslogSink>,
    metrics: std::sync::Arc<MetricsCollector>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = check_health(&file_states, &fanout, &syslog, &metrics).await;
                match report.status {
                    HealthStatus::Healthy => info!("health check: healthy"),
                    HealthStatus::Degraded => warn!(
                        files_with_errors = report.files.iter().filter(|f| f.error_count > 0).count(),
                        unhealthy_sinks = report.sinks.iter().filter(|s| !s.healthy).count(),
                        "health check: degraded"
                    ),
                }
            }
            _ = shutdown.recv() => return,
        }
    }
}
