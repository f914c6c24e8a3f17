//! Context Buffer — a fixed-size rolling window of recent lines per file.

use std::collections::VecDeque;

/// Ring of the most recent `capacity` lines observed on a file. Oldest is
/// evicted on overflow; insertion order is preserved.
#[derive(Debug, Clone)]
pub struct ContextBuffer {
    capacity: usize,
    lines: VecDeque<String>,
}

impl ContextBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a line, evicting the oldest entry if the buffer is full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `min(N, k)` lines observed, oldest first, where `k` is the
    /// total number of lines seen so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// `snapshot()` joined with newlines, as used in the rendered match message.
    pub fn joined(&self) -> String {
        self.snapshot().join("\n")
    }
}
