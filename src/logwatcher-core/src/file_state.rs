//! File State Table — per-file offset, inode identity, error counters.

use std::path::PathBuf;
use std::time::Instant;

/// Per-file tailing state. Created at startup, mutated exclusively by the
/// Tailer, destroyed on shutdown.
///
/// Invariants: `0 <= offset <= size`; `(dev, inode)` matches the file
/// currently open at `path` after any rotation handling; `offset` is reset
/// to 0 on detected rotation.
#[derive(Debug, Clone)]
pub struct FileState {
    pub path: PathBuf,
    pub dev: u64,
    pub inode: u64,
    pub offset: u64,
    pub size: u64,
    pub last_read_time: Option<Instant>,
    pub last_error: Option<String>,
    pub error_count: u64,
    /// Bytes read past the last observed line terminator, held back until a
    /// terminator arrives (spec's partial-line deferral rule).
    pub partial: Vec<u8>,
}

impl FileState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            dev: 0,
            inode: 0,
            offset: 0,
            size: 0,
            last_read_time: None,
            last_error: None,
            error_count: 0,
            partial: Vec::new(),
        }
    }

    /// True if `(dev, inode)` differs from the currently tracked identity,
    /// or the file has shrunk below the current offset (truncation). Either
    /// condition is treated as rotation per spec.
    pub fn is_rotated(&self, dev: u64, inode: u64, size: u64) -> bool {
        (self.dev, self.inode) != (dev, inode) || size < self.offset
    }

    /// Reset tailing position and adopt a new file identity after rotation.
    pub fn rotate(&mut self, dev: u64, inode: u64) {
        self.dev = dev;
        self.inode = inode;
        self.offset = 0;
        self.partial.clear();
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.error_count += 1;
    }

    pub fn record_read(&mut self, size: u64, now: Instant) {
        self.size = size;
        self.last_read_time = Some(now);
    }

    pub fn seconds_since_last_read(&self, now: Instant) -> Option<u64> {
        self.last_read_time
            .map(|t| now.saturating_duration_since(t).as_secs())
    }
}
