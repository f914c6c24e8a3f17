//! LogWatcher daemon — configuration loading, notification sinks, the
//! notification queue, metrics/health hooks, and process orchestration.
//!
//! The event pipeline itself (patterns, context buffer, rate limiting,
//! match rendering) lives in `logwatcher-core`; platform-specific file
//! change detection and tailing live in `logwatcher-watch`. This crate
//! wires both into a running daemon and supplies the external
//! collaborators the core treats as pluggable: config, sinks, the queue,
//! and health reporting.

pub mod config;
pub mod daemon;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod sinks;

pub use config::{Config, ConfigManager};
pub use daemon::Daemon;
