//! Process-wide bounded event log for cross-session diagnostics.

use std::collections::VecDeque;

use bridge_core::session::GlobalLogEntry;
use parking_lot::Mutex;

/// FIFO ring of the most recent events across all sessions.
#[derive(Debug)]
pub struct GlobalEventLog {
    entries: Mutex<VecDeque<GlobalLogEntry>>,
    capacity: usize,
}

impl GlobalEventLog {
    /// Create a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest at capacity.
    pub fn append(&self, entry: GlobalLogEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            let _ = entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first, plus the retained total.
    pub fn recent(&self, limit: usize) -> (Vec<GlobalLogEntry>, usize) {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        (entries.iter().skip(skip).cloned().collect(), entries.len())
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
