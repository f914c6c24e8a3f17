//! LogWatcher Core - pure data model and algorithms for the event pipeline.
//!
//! Everything in this crate is free of I/O and OS dependencies: pattern
//! compilation, the per-file context buffer, rate limiting, and match
//! rendering. The Change Detector and Tailer (which own file handles and
//! platform-specific watching) live in `logwatcher-watch`; sinks, the
//! notification queue, and configuration live in the daemon binary.

pub mod context;
pub mod error;
pub mod file_state;
pub mod match_engine;
pub mod pattern;
pub mod rate_limit;

pub use context::ContextBuffer;
pub use error::CoreError;
pub use file_state::FileState;
pub use match_engine::{render_match, evaluate_line, MatchOutcome, NotificationJob, SinkSelector};
pub use pattern::{FilePatternBinding, Pattern, PatternSet};
pub use rate_limit::RateLimiter;
